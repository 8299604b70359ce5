//! The dissimilarity engine (component **E**, §4.4): binds a sample table
//! and an optional tree, validates the requested calculator/flag
//! combination, and evaluates pairwise dissimilarities under a capped
//! memory budget.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use indicatif::ProgressBar;
use rand::Rng;

use crate::calculator::{Calculator, LeafPairContext, PairInputs};
use crate::clustering::{self, ClusteringMethod};
use crate::consensus;
use crate::correlator;
use crate::error::{BetaDivError, ConfigError};
use crate::matrix::DissimilarityMatrix;
use crate::mrca;
use crate::sample_table::SampleTable;
use crate::tree::Tree;
use crate::vectorizer::{BranchVector, Vectorizer};

/// A bound sample table + tree + calculator, ready to evaluate
/// dissimilarities. Built by [`Engine::open`], which is the only place the
/// §4.4 configuration checks run.
pub struct Engine<S: Read + Seek> {
    table: SampleTable<S>,
    tree: Tree,
    vectorizer: Vectorizer,
    weights: Vec<f64>,
    calculator: Calculator,
    weighted: bool,
    mrca: bool,
    strict_mrca: bool,
    max_vecs: usize,
    col_sum: Option<Vec<f64>>,
    col_min: Option<Vec<f64>>,
    col_max: Option<Vec<f64>>,
    total_branch_length: f64,
}

impl Engine<BufReader<File>> {
    /// Open an engine from file paths: a sample table, and an optional
    /// Newick tree (`None` means a star-tree, non-phylogenetic run).
    #[allow(clippy::too_many_arguments)]
    pub fn open_files(
        table_path: &Path,
        tree_path: Option<&Path>,
        calculator: Calculator,
        max_vecs: usize,
        weighted: bool,
        mrca: bool,
        strict_mrca: bool,
        use_counts: bool,
        verbose: bool,
    ) -> Result<Self, BetaDivError> {
        let table = SampleTable::open(table_path)?;
        let tree = tree_path
            .map(Tree::from_file)
            .transpose()?;
        Self::open(
            table,
            tree,
            calculator,
            max_vecs,
            weighted,
            mrca,
            strict_mrca,
            use_counts,
            verbose,
        )
    }
}

impl<S: Read + Seek> Engine<S> {
    /// Validate the configuration (§4.4's `Open` contract) and build the
    /// vectorizer, branch-weight vector and exactly the precomputed
    /// summaries `calculator` needs.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        mut table: SampleTable<S>,
        tree: Option<Tree>,
        calculator: Calculator,
        max_vecs: usize,
        weighted: bool,
        mrca: bool,
        strict_mrca: bool,
        use_counts: bool,
        verbose: bool,
    ) -> Result<Self, BetaDivError> {
        if !weighted && !calculator.supports_unweighted() {
            return Err(ConfigError::UnsupportedVariant(calculator, weighted).into());
        }
        if mrca && strict_mrca {
            return Err(ConfigError::MrcaAndStrictMrca.into());
        }
        if (mrca || strict_mrca) && tree.is_none() {
            return Err(ConfigError::MrcaRequiresTree.into());
        }
        if calculator == Calculator::NormalizedWeightedUnifrac && (mrca || strict_mrca) {
            return Err(ConfigError::NwuWithMrca.into());
        }
        if max_vecs == 0 || max_vecs % 2 != 0 {
            return Err(ConfigError::OddMaxVecs(max_vecs).into());
        }

        let phylogenetic = tree.is_some();
        let mut tree = tree.unwrap_or_else(|| Tree::star(table.taxa()));
        let normalize = !use_counts;
        let vectorizer = Vectorizer::new(&mut tree, table.taxa(), phylogenetic, weighted, normalize)?;

        let weights = vectorizer.branch_weights(&tree)?;
        let total_branch_length = weights.iter().sum();

        let required = calculator.required();
        let (col_sum, col_min, col_max) = if required.col_sum || required.col_extents {
            build_column_summaries(&mut table, &tree, &vectorizer)?
        } else {
            (None, None, None)
        };

        if verbose {
            log::info!(
                "opened engine: calculator={}, weighted={weighted}, n_samples={}, tree_size={}",
                calculator.canonical_name(),
                table.n_samples(),
                tree.size(),
            );
        }

        Ok(Self {
            table,
            tree,
            vectorizer,
            weights,
            calculator,
            weighted,
            mrca,
            strict_mrca,
            max_vecs,
            col_sum,
            col_min,
            col_max,
            total_branch_length,
        })
    }

    /// Evaluate the bound calculator over every sample pair and write one
    /// dissimilarity matrix plus its clustering tree. Under jackknife
    /// (`jackknife_reps > 0 && draw_size > 0`), writes one matrix/tree pair
    /// per replicate instead, named `<prefix>.r<n>.diss`/`.nwk`, plus a
    /// single `<prefix>.consensus.nwk` whose internal nodes are annotated
    /// with the fraction of replicate trees containing that clade
    /// ("jackknife support", §4.4).
    pub fn dissimilarity(
        &mut self,
        output_prefix: &str,
        clustering_method: ClusteringMethod,
        jackknife_reps: usize,
        draw_size: usize,
    ) -> Result<(), BetaDivError> {
        if (jackknife_reps > 0) != (draw_size > 0) {
            return Err(ConfigError::InvalidJackknife.into());
        }
        let mut rng = rand::thread_rng();
        if jackknife_reps > 0 && draw_size > 0 {
            let progress = ProgressBar::new(jackknife_reps as u64);
            let mut replicate_trees = Vec::with_capacity(jackknife_reps);
            for r in 0..jackknife_reps {
                let matrix = self.compute_matrix(Some(draw_size), &mut rng)?;
                matrix.write_to(&Path::new(output_prefix).with_extension(format!("r{r}.diss")))?;
                let tree = clustering::cluster(&matrix, clustering_method);
                tree.to_file(&Path::new(output_prefix).with_extension(format!("r{r}.nwk")))
                    .map_err(|e| BetaDivError::io(output_prefix, std::io::Error::other(e)))?;
                replicate_trees.push(tree);
                progress.inc(1);
            }
            progress.finish_and_clear();

            let consensus_tree = consensus::jackknife_consensus(&replicate_trees);
            consensus_tree
                .to_file(&Path::new(output_prefix).with_extension("consensus.nwk"))
                .map_err(|e| BetaDivError::io(output_prefix, std::io::Error::other(e)))?;
        } else {
            let matrix = self.compute_matrix(None, &mut rng)?;
            matrix.write_to(&Path::new(output_prefix).with_extension("diss"))?;
            let tree = clustering::cluster(&matrix, clustering_method);
            tree.to_file(&Path::new(output_prefix).with_extension("nwk"))
                .map_err(|e| BetaDivError::io(output_prefix, std::io::Error::other(e)))?;
        }
        Ok(())
    }

    /// Number of samples bound to this engine.
    pub fn n_samples(&self) -> usize {
        self.table.n_samples()
    }

    /// The currently bound calculator.
    pub fn calculator(&self) -> Calculator {
        self.calculator
    }

    fn load_block(
        &mut self,
        start: usize,
        end: usize,
        jackknife_draw_size: Option<usize>,
        rng: &mut impl Rng,
    ) -> Result<SampleBlock, BetaDivError> {
        let mut vectors = Vec::with_capacity(end - start);
        let mut row_leaf_sums = Vec::with_capacity(end - start);
        let mut weighted_row_sums = Vec::with_capacity(end - start);

        for i in start..end {
            let counts = match jackknife_draw_size {
                Some(draw_size) => self.table.read_row_jackknife(i, draw_size, rng)?,
                None => self.table.read_row(i)?,
            };
            let vector = self.vectorizer.calculate(&self.tree, &counts, false, counts.total);
            let weighted_sum: f64 = vector.iter().zip(&self.weights).map(|(v, w)| v * w).sum();
            row_leaf_sums.push(counts.total);
            weighted_row_sums.push(weighted_sum);
            vectors.push(vector);
        }

        Ok(SampleBlock {
            start,
            vectors,
            row_leaf_sums,
            weighted_row_sums,
        })
    }

    /// Blocked two-window evaluation (§4.4): row and column blocks of size
    /// `maxVecs/2` slide over the sample range, capping peak memory at
    /// `maxVecs` held branch vectors.
    fn compute_matrix(
        &mut self,
        jackknife_draw_size: Option<usize>,
        rng: &mut impl Rng,
    ) -> Result<DissimilarityMatrix, BetaDivError> {
        let n = self.table.n_samples();
        let half_block = (self.max_vecs / 2).max(1);
        let mut matrix = DissimilarityMatrix::zeros(self.table.sample_names().to_vec());

        let mut row_start = 0;
        while row_start < n {
            let row_end = (row_start + half_block).min(n);
            let row_block = self.load_block(row_start, row_end, jackknife_draw_size, rng)?;

            let mut col_start = 0;
            while col_start <= row_start {
                let col_end = (col_start + half_block).min(n);
                let reuse_row_block = col_start == row_start;
                let col_block = if reuse_row_block {
                    None
                } else {
                    Some(self.load_block(col_start, col_end, jackknife_draw_size, rng)?)
                };
                let col_block_ref = col_block.as_ref().unwrap_or(&row_block);

                for (ri, &r) in (row_start..row_end).enumerate() {
                    for (ci, &c) in (col_start..col_end).enumerate() {
                        if r <= c {
                            continue;
                        }
                        let value = self.evaluate_pair(
                            &row_block.vectors[ri],
                            &col_block_ref.vectors[ci],
                            row_block.row_leaf_sums[ri],
                            col_block_ref.row_leaf_sums[ci],
                            row_block.weighted_row_sums[ri],
                            col_block_ref.weighted_row_sums[ci],
                        );
                        matrix.set(r, c, value);
                    }
                }

                col_start += half_block;
            }

            row_start += half_block;
        }

        Ok(matrix)
    }

    fn evaluate_pair(
        &mut self,
        b_i: &BranchVector,
        b_j: &BranchVector,
        row_leaf_sum_i: f64,
        row_leaf_sum_j: f64,
        weighted_row_sum_i: f64,
        weighted_row_sum_j: f64,
    ) -> f64 {
        let required = self.calculator.required();

        let (a, b, w): (Vec<f64>, Vec<f64>, Vec<f64>) = if self.strict_mrca {
            let (ri, rj, rw) = mrca::restrict_to_mrca(
                &mut self.tree,
                self.vectorizer.postorder(),
                &self.weights,
                b_i,
                b_j,
            );
            if rw.iter().sum::<f64>() == 0.0 {
                return 0.0;
            }
            (ri.0, rj.0, rw)
        } else if self.mrca {
            let w_mrca = mrca::apply_weights_mrca(
                &mut self.tree,
                self.vectorizer.postorder(),
                self.vectorizer.bfs(),
                &self.weights,
                b_i,
                b_j,
            );
            if w_mrca.iter().sum::<f64>() == 0.0 {
                return 0.0;
            }
            (b_i.0.clone(), b_j.0.clone(), w_mrca)
        } else {
            (b_i.0.clone(), b_j.0.clone(), self.weights.clone())
        };

        let leaf_pair = required.needs_tree().then(|| LeafPairContext {
            tree: &self.tree,
            postorder: self.vectorizer.postorder(),
            raw_b_i: b_i,
            raw_b_j: b_j,
            weighted: self.weighted,
        });

        let ctx = PairInputs {
            a: &a,
            b: &b,
            weights: &w,
            col_sum: self.col_sum.as_deref(),
            col_min: self.col_min.as_deref(),
            col_max: self.col_max.as_deref(),
            row_leaf_sum_i,
            row_leaf_sum_j,
            weighted_row_sum_i,
            weighted_row_sum_j,
            total_branch_length: self.total_branch_length,
            leaf_pair,
        };
        self.calculator.evaluate(&ctx)
    }
}

struct SampleBlock {
    #[allow(dead_code)]
    start: usize,
    vectors: Vec<BranchVector>,
    row_leaf_sums: Vec<f64>,
    weighted_row_sums: Vec<f64>,
}

/// Per-position sum/min/max of the full (non-leaves-only) branch vector
/// across every sample in the table, required by Chi-squared (`colSum`)
/// and Complete tree/Gower/Tamas coefficient (`colExtents`).
fn build_column_summaries<S: Read + Seek>(
    table: &mut SampleTable<S>,
    tree: &Tree,
    vectorizer: &Vectorizer,
) -> Result<(Option<Vec<f64>>, Option<Vec<f64>>, Option<Vec<f64>>), BetaDivError> {
    let size = vectorizer.size();
    let mut sum = vec![0.0; size];
    let mut min = vec![f64::INFINITY; size];
    let mut max = vec![f64::NEG_INFINITY; size];

    for i in 0..table.n_samples() {
        let counts = table.read_row(i)?;
        let vector = vectorizer.calculate(tree, &counts, false, counts.total);
        for (pos, &v) in vector.iter().enumerate() {
            sum[pos] += v;
            min[pos] = min[pos].min(v);
            max[pos] = max[pos].max(v);
        }
    }

    Ok((Some(sum), Some(min), Some(max)))
}

/// Run every applicable (weighted and, where supported, unweighted)
/// calculator over the same table/tree, writing one dissimilarity matrix
/// per variant plus the calculator correlator's cluster tree and grouping
/// (§4.6, `All`).
#[allow(clippy::too_many_arguments)]
pub fn run_all(
    table_path: &Path,
    tree_path: Option<&Path>,
    output_prefix: &str,
    threshold: f64,
    clustering_method: ClusteringMethod,
    max_vecs: usize,
    mrca: bool,
    strict_mrca: bool,
    use_counts: bool,
) -> Result<(), BetaDivError> {
    let mut named_matrices = Vec::new();
    let variant_count: u64 = Calculator::ALL
        .iter()
        .map(|c| 1 + c.supports_unweighted() as u64)
        .sum();
    let progress = ProgressBar::new(variant_count);

    for &calculator in Calculator::ALL {
        for &weighted in &[true, false] {
            if !weighted && !calculator.supports_unweighted() {
                continue;
            }
            let table = SampleTable::open(table_path)?;
            let tree = tree_path.map(Tree::from_file).transpose()?;
            let mut engine = Engine::open(
                table,
                tree,
                calculator,
                max_vecs,
                weighted,
                mrca,
                strict_mrca,
                use_counts,
                false,
            )?;

            let mut rng = rand::thread_rng();
            let matrix = engine.compute_matrix(None, &mut rng)?;

            let variant_name = if weighted {
                calculator.canonical_name().to_string()
            } else {
                format!("{}-unweighted", calculator.canonical_name())
            };
            matrix.write_to(&Path::new(output_prefix).with_extension(format!("{variant_name}.diss")))?;
            named_matrices.push((variant_name, matrix));
            progress.inc(1);
        }
    }
    progress.finish_and_clear();

    let correlation = correlator::correlate(&named_matrices);
    let (cluster_tree, groups) = correlator::cluster_and_cut(&correlation, threshold);
    cluster_tree
        .to_file(&Path::new(output_prefix).with_extension("calculators.nwk"))
        .map_err(|e| BetaDivError::io(output_prefix, std::io::Error::other(e)))?;

    let mut group_lines = String::new();
    for group in &groups {
        group_lines.push_str(&format!("[{:.6}]\t{};\n", group.height, group.members.join(";")));
    }
    std::fs::write(
        Path::new(output_prefix).with_extension("groups.txt"),
        group_lines,
    )
    .map_err(|e| BetaDivError::io(output_prefix, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn table_with(rows: &str) -> SampleTable<Cursor<Vec<u8>>> {
        SampleTable::from_reader(Cursor::new(rows.as_bytes().to_vec())).unwrap()
    }

    #[test]
    fn dissimilarity_rejects_jackknife_reps_without_draw_size() {
        let table = table_with("\tA\tB\nS1\t1\t0\nS2\t0\t1\n");
        let mut engine = Engine::open(
            table,
            None,
            Calculator::BrayCurtis,
            4,
            true,
            false,
            false,
            true,
            false,
        )
        .unwrap();
        let err = engine
            .dissimilarity("/tmp/betadiv-test-unused", ClusteringMethod::Average, 3, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            BetaDivError::Config(ConfigError::InvalidJackknife)
        ));
    }

    #[test]
    fn open_rejects_odd_max_vecs() {
        let table = table_with("\tA\tB\nS1\t1\t0\nS2\t0\t1\n");
        let err = Engine::open(
            table,
            None,
            Calculator::BrayCurtis,
            3,
            true,
            false,
            false,
            true,
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BetaDivError::Config(ConfigError::OddMaxVecs(3))
        ));
    }

    #[test]
    fn open_rejects_unweighted_only_calculator_run_weighted_false() {
        let table = table_with("\tA\tB\nS1\t1\t0\nS2\t0\t1\n");
        let err = Engine::open(
            table,
            None,
            Calculator::ChiSquared,
            4,
            false,
            false,
            false,
            true,
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BetaDivError::Config(ConfigError::UnsupportedVariant(Calculator::ChiSquared, false))
        ));
    }

    #[test]
    fn open_rejects_mrca_without_tree() {
        let table = table_with("\tA\tB\nS1\t1\t0\nS2\t0\t1\n");
        let err = Engine::open(
            table,
            None,
            Calculator::BrayCurtis,
            4,
            true,
            true,
            false,
            true,
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BetaDivError::Config(ConfigError::MrcaRequiresTree)
        ));
    }

    #[test]
    fn scenario_a_unweighted_bray_curtis() {
        // S1={A:1}, S2={B:1}, S3={A:1,B:1}, taxa D unused (star tree).
        let table = table_with(
            "\tA\tB\tC\tD\nS1\t1\t0\t0\t0\nS2\t0\t1\t0\t0\nS3\t1\t1\t0\t0\n",
        );
        let mut engine = Engine::open(
            table,
            None,
            Calculator::BrayCurtis,
            4,
            false,
            false,
            false,
            true,
            false,
        )
        .unwrap();
        let mut rng = rand::thread_rng();
        let matrix = engine.compute_matrix(None, &mut rng).unwrap();
        assert!((matrix.get(1, 0) - 1.0).abs() < 1e-9);
        assert!((matrix.get(2, 0) - 0.5).abs() < 1e-9);
        assert!((matrix.get(2, 1) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn scenario_c_weighted_bray_curtis_on_star_tree() {
        let table = table_with("\ta\tb\tc\nS1\t2\t1\t0\nS2\t1\t2\t1\n");
        let mut engine = Engine::open(
            table,
            None,
            Calculator::BrayCurtis,
            4,
            true,
            false,
            false,
            false, // use_counts = false -> normalize to proportions
            false,
        )
        .unwrap();
        let mut rng = rand::thread_rng();
        let matrix = engine.compute_matrix(None, &mut rng).unwrap();
        assert!((matrix.get(1, 0) - 5.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn jackknife_writes_a_consensus_tree_alongside_replicates() {
        let table = table_with(
            "\tA\tB\tC\tD\nS1\t4\t3\t0\t0\nS2\t0\t0\t3\t4\nS3\t3\t4\t1\t0\n",
        );
        let mut engine = Engine::open(
            table,
            None,
            Calculator::BrayCurtis,
            4,
            true,
            false,
            false,
            true,
            false,
        )
        .unwrap();
        let prefix = format!(
            "/tmp/betadiv-test-jk-{}",
            std::process::id()
        );
        engine
            .dissimilarity(&prefix, ClusteringMethod::Average, 5, 6)
            .unwrap();

        for r in 0..5 {
            let matrix_path = Path::new(&prefix).with_extension(format!("r{r}.diss"));
            let tree_path = Path::new(&prefix).with_extension(format!("r{r}.nwk"));
            assert!(matrix_path.exists());
            assert!(tree_path.exists());
            std::fs::remove_file(matrix_path).unwrap();
            std::fs::remove_file(tree_path).unwrap();
        }

        let consensus_path = Path::new(&prefix).with_extension("consensus.nwk");
        assert!(consensus_path.exists());
        let consensus = Tree::from_file(&consensus_path).unwrap();
        assert_eq!(consensus.n_leaves(), 3);
        std::fs::remove_file(consensus_path).unwrap();
    }

    #[test]
    fn scenario_e_strict_mrca_soergel_short_circuits_to_zero() {
        // Both samples contain only leaf A; the tree also has B, C, D.
        // RestrictToMRCA narrows the subtree to the single leaf A itself,
        // leaving no non-root retained positions, so the restricted
        // weights sum to zero and the dissimilarity short-circuits to 0.
        let newick = "((A:1,B:1):1,(C:1,D:1):1);";
        let table = table_with("\tA\tB\tC\tD\nS1\t3\t0\t0\t0\nS2\t7\t0\t0\t0\n");
        let tree = Tree::from_newick(newick).unwrap();
        let mut engine = Engine::open(
            table,
            Some(tree),
            Calculator::Soergel,
            4,
            true,
            false,
            true, // strict_mrca
            true,
            false,
        )
        .unwrap();
        let mut rng = rand::thread_rng();
        let matrix = engine.compute_matrix(None, &mut rng).unwrap();
        assert_eq!(matrix.get(1, 0), 0.0);
    }

    #[test]
    fn scenario_d_nwu_matches_bray_curtis() {
        let newick = "((A:1,B:1):1,(C:1,D:1):1);";
        let table = table_with("\tA\tB\tC\tD\nS1\t1\t0\t0\t0\nS2\t0\t0\t0\t1\n");
        let tree = Tree::from_newick(newick).unwrap();
        let mut engine = Engine::open(
            table,
            Some(tree),
            Calculator::NormalizedWeightedUnifrac,
            4,
            true,
            false,
            false,
            true,
            false,
        )
        .unwrap();
        let mut rng = rand::thread_rng();
        let matrix = engine.compute_matrix(None, &mut rng).unwrap();
        assert!((matrix.get(1, 0) - 1.0).abs() < 1e-9);
    }
}
