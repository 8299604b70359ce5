use std::io::Cursor;

use criterion::{criterion_group, criterion_main, PlotConfiguration};
use criterion::{BenchmarkId, Criterion};

use betadiv::calculator::Calculator;
use betadiv::distr::Distr::Uniform;
use betadiv::engine::Engine;
use betadiv::sample_table::SampleTable;
use betadiv::tree::Tree;
use betadiv::tree_generation::generate_tree;
use betadiv::vectorizer::Vectorizer;

/// Benchmark newick parsing.
fn newick_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("newick_parsing");
    for size in [10, 20, 40, 100, 500, 1000, 2000, 5000, 10000, 20000].iter() {
        let newick = generate_tree(*size, true, Uniform)
            .unwrap()
            .to_newick()
            .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(*size), size, |bencher, _| {
            bencher.iter(|| {
                let _ = Tree::from_newick(&newick);
            })
        });
    }
    group.finish();
}

/// Compare the cost of a full postorder traversal as the tree grows.
fn postorder_traversal(c: &mut Criterion) {
    let plot_config = PlotConfiguration::default().summary_scale(criterion::AxisScale::Logarithmic);

    let mut group = c.benchmark_group("postorder_traversal");
    group.plot_config(plot_config);

    for size in [10, 20, 40, 100, 500, 1000, 2000, 5000, 10000].iter() {
        let tree = generate_tree(*size, true, Uniform).unwrap();
        let root = tree.get_root().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(*size), size, |bencher, _| {
            bencher.iter(|| {
                for nid in tree.postorder_subtree(&root) {
                    let _ = nid;
                }
            })
        });
    }

    group.finish();
}

/// Measure how turning one sample's counts into a branch vector scales with
/// tree size, the per-sample cost paid once per row in the dissimilarity
/// engine's blocked evaluation.
fn branch_vector(c: &mut Criterion) {
    let plot_config = PlotConfiguration::default().summary_scale(criterion::AxisScale::Logarithmic);

    let mut group = c.benchmark_group("branch_vector");
    group.plot_config(plot_config);

    for size in [10, 20, 40, 100, 500, 1000, 2000, 5000].iter() {
        let mut tree = generate_tree(*size, true, Uniform).unwrap();
        let taxa: Vec<String> = tree
            .get_leaves()
            .iter()
            .map(|id| tree.get(id).name.clone().unwrap_or_default())
            .collect();
        let vectorizer = Vectorizer::new(&mut tree, &taxa, true, true, true).unwrap();
        let counts = vec![1.0; taxa.len()];
        let total: f64 = counts.iter().sum();

        group.bench_with_input(BenchmarkId::from_parameter(*size), size, |bencher, _| {
            bencher.iter(|| vectorizer.calculate(&tree, &counts_ref(&counts, total), false, total))
        });
    }

    group.finish();
}

fn counts_ref(counts: &[f64], total: f64) -> betadiv::sample_table::SampleCounts {
    betadiv::sample_table::SampleCounts {
        counts: counts.to_vec(),
        total,
    }
}

/// End-to-end: compute a full Bray-Curtis dissimilarity matrix over a
/// synthetic sample table as the sample count grows, on a star tree (no
/// phylogenetic overhead) so the benchmark isolates the blocked pairwise
/// evaluation loop itself.
fn dissimilarity_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("dissimilarity_matrix");

    for n_samples in [4, 8, 16, 32, 64].iter() {
        let taxa = ["A", "B", "C", "D"];
        let mut table_text = String::from("\t");
        table_text.push_str(&taxa.join("\t"));
        table_text.push('\n');
        for i in 0..*n_samples {
            table_text.push_str(&format!("S{i}\t{}\t{}\t{}\t{}\n", i % 3, i % 2, 1, i % 4));
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(*n_samples),
            n_samples,
            |bencher, _| {
                bencher.iter(|| {
                    let table =
                        SampleTable::from_reader(Cursor::new(table_text.as_bytes().to_vec()))
                            .unwrap();
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
                    let out = std::env::temp_dir().join("betadiv_bench");
                    engine
                        .dissimilarity(out.to_str().unwrap(), betadiv::clustering::ClusteringMethod::Average, 0, 0)
                        .unwrap();
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    newick_parsing,
    postorder_traversal,
    branch_vector,
    dissimilarity_matrix
);
criterion_main!(benches);
