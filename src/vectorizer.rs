//! The data vectorizer (component **V**, §4.3): turns one sample's raw
//! counts into a branch vector over a bound tree.

use std::ops::{Deref, DerefMut};

use crate::error::{BetaDivError, DataConsistencyError};
use crate::sample_table::SampleCounts;
use crate::tree::{NodeId, Tree};

/// One entry per non-root node of the bound tree, in post-order. Produced
/// by [`Vectorizer::calculate`].
#[derive(Debug, Clone, PartialEq)]
pub struct BranchVector(pub Vec<f64>);

impl Deref for BranchVector {
    type Target = [f64];
    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl DerefMut for BranchVector {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.0
    }
}

/// Binds a tree (real, or a synthesized star tree for non-phylogenetic
/// runs) to a sample table's taxon columns and converts per-sample counts
/// into [`BranchVector`]s.
#[derive(Debug, Clone)]
pub struct Vectorizer {
    /// Non-root nodes in post-order; position `i` in every `BranchVector`
    /// is the node `postorder[i]`.
    postorder: Vec<NodeId>,
    /// All nodes in breadth-first order, root first. Used by the MRCA
    /// reducer's `ApplyWeightsMRCA`.
    bfs: Vec<NodeId>,
    phylogenetic: bool,
    weighted: bool,
    normalize: bool,
}

impl Vectorizer {
    /// Bind a vectorizer to `tree`: assign every non-root node its
    /// post-order index and every node its breadth-first index, and map
    /// `taxa` (column order from the sample table) onto tree leaves by
    /// name. A column with no matching leaf is a fatal
    /// [`DataConsistencyError::TaxonNotInTree`] (§4.3); a leaf not named in
    /// `taxa` simply keeps no taxon index and contributes zero.
    pub fn new(
        tree: &mut Tree,
        taxa: &[String],
        phylogenetic: bool,
        weighted: bool,
        normalize: bool,
    ) -> Result<Self, BetaDivError> {
        let root = tree.get_root().map_err(DataConsistencyError::InvalidTree)?;

        let bfs = tree.bfs_subtree(&root);
        let mut postorder = tree.postorder_subtree(&root);
        postorder.pop(); // drop the root itself; it is never a vector position

        for (index, node_id) in postorder.iter().enumerate() {
            tree.get_mut(node_id).post_order_index = Some(index);
        }
        for (index, node_id) in bfs.iter().enumerate() {
            tree.get_mut(node_id).bfs_index = Some(index);
        }

        for (col, name) in taxa.iter().enumerate() {
            let leaf = tree
                .get_by_name(name)
                .filter(|node| node.is_tip())
                .map(|node| node.id)
                .ok_or_else(|| DataConsistencyError::TaxonNotInTree(name.clone()))?;
            tree.get_mut(&leaf).taxon_index = Some(col);
        }

        Ok(Self {
            postorder,
            bfs,
            phylogenetic,
            weighted,
            normalize,
        })
    }

    /// Number of non-root positions (the engine's "size").
    pub fn size(&self) -> usize {
        self.postorder.len()
    }

    /// Non-root nodes, in post-order.
    pub fn postorder(&self) -> &[NodeId] {
        &self.postorder
    }

    /// All nodes, breadth-first from the root.
    pub fn bfs(&self) -> &[NodeId] {
        &self.bfs
    }

    /// Per-position branch weight: the node's branch length in
    /// phylogenetic mode, or a uniform `1.0` otherwise (§4.1).
    pub fn branch_weights(&self, tree: &Tree) -> Result<Vec<f64>, BetaDivError> {
        if !self.phylogenetic {
            return Ok(vec![1.0; self.postorder.len()]);
        }
        self.postorder
            .iter()
            .map(|id| {
                tree.get(id)
                    .parent_edge
                    .ok_or_else(|| DataConsistencyError::MissingBranchLength(*id).into())
            })
            .collect()
    }

    /// CalculateDataVector (§4.3): walk the post-order excluding the root.
    /// Leaves emit their (optionally normalized) count; internal nodes emit
    /// the sum of their children's already-written values, unless
    /// `leaves_only` is set, in which case internal positions are left at
    /// zero. If this vectorizer is unweighted, every positive value is
    /// finally collapsed to `1.0`.
    pub fn calculate(
        &self,
        tree: &Tree,
        counts: &SampleCounts,
        leaves_only: bool,
        total_count: f64,
    ) -> BranchVector {
        let mut vector = vec![0.0; self.postorder.len()];

        for &node_id in &self.postorder {
            let node = tree.get(&node_id);
            let pos = node
                .post_order_index
                .expect("post-order index assigned by Vectorizer::new");

            if node.is_tip() {
                let raw = node
                    .taxon_index
                    .map(|taxon| counts.counts[taxon])
                    .unwrap_or(0.0);
                vector[pos] = if self.normalize {
                    if total_count > 0.0 {
                        raw / total_count
                    } else {
                        0.0
                    }
                } else {
                    raw
                };
            } else if leaves_only {
                // internal node's position stays zero
            } else {
                vector[pos] = node
                    .children
                    .iter()
                    .map(|child| {
                        let child_pos = tree
                            .get(child)
                            .post_order_index
                            .expect("children are visited before their parent in post-order");
                        vector[child_pos]
                    })
                    .sum();
            }
        }

        if !self.weighted {
            for value in vector.iter_mut() {
                if *value > 0.0 {
                    *value = 1.0;
                }
            }
        }

        BranchVector(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;

    fn taxa(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn star_tree_vector_is_just_leaf_values() {
        let mut tree = Tree::star(&taxa(&["a", "b", "c"]));
        let vectorizer = Vectorizer::new(&mut tree, &taxa(&["a", "b", "c"]), false, true, false).unwrap();
        let counts = SampleCounts {
            counts: vec![2.0, 1.0, 0.0],
            total: 3.0,
        };
        let vector = vectorizer.calculate(&tree, &counts, false, counts.total);
        assert_eq!(vector.0, vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn normalized_vector_divides_by_total() {
        let mut tree = Tree::star(&taxa(&["a", "b", "c"]));
        let vectorizer = Vectorizer::new(&mut tree, &taxa(&["a", "b", "c"]), false, true, true).unwrap();
        let counts = SampleCounts {
            counts: vec![2.0, 1.0, 0.0],
            total: 3.0,
        };
        let vector = vectorizer.calculate(&tree, &counts, false, counts.total);
        assert!((vector.0[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((vector.0[1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn unweighted_collapses_to_indicators() {
        let mut tree = Tree::star(&taxa(&["a", "b", "c"]));
        let vectorizer = Vectorizer::new(&mut tree, &taxa(&["a", "b", "c"]), false, false, false).unwrap();
        let counts = SampleCounts {
            counts: vec![2.0, 0.0, 5.0],
            total: 7.0,
        };
        let vector = vectorizer.calculate(&tree, &counts, false, counts.total);
        assert_eq!(vector.0, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn internal_nodes_sum_children_in_phylogenetic_mode() {
        let mut tree = Tree::from_newick("((A:1,B:1)AB:1,C:1)R;").unwrap();
        let names = taxa(&["A", "B", "C"]);
        let vectorizer = Vectorizer::new(&mut tree, &names, true, true, false).unwrap();
        let counts = SampleCounts {
            counts: vec![1.0, 1.0, 1.0],
            total: 3.0,
        };
        let vector = vectorizer.calculate(&tree, &counts, false, counts.total);
        let ab = tree.get_by_name("AB").unwrap();
        let pos = ab.post_order_index.unwrap();
        assert_eq!(vector.0[pos], 2.0);
    }

    #[test]
    fn leaves_only_skips_internal_sums() {
        let mut tree = Tree::from_newick("((A:1,B:1)AB:1,C:1)R;").unwrap();
        let names = taxa(&["A", "B", "C"]);
        let vectorizer = Vectorizer::new(&mut tree, &names, true, true, false).unwrap();
        let counts = SampleCounts {
            counts: vec![1.0, 1.0, 1.0],
            total: 3.0,
        };
        let vector = vectorizer.calculate(&tree, &counts, true, counts.total);
        let ab = tree.get_by_name("AB").unwrap();
        let pos = ab.post_order_index.unwrap();
        assert_eq!(vector.0[pos], 0.0);
    }

    #[test]
    fn missing_taxon_is_fatal() {
        let mut tree = Tree::star(&taxa(&["a", "b"]));
        let err = Vectorizer::new(&mut tree, &taxa(&["a", "z"]), false, true, false).unwrap_err();
        assert!(matches!(
            err,
            BetaDivError::DataConsistency(DataConsistencyError::TaxonNotInTree(_))
        ));
    }

    #[test]
    fn branch_weights_uniform_for_non_phylogenetic() {
        let mut tree = Tree::star(&taxa(&["a", "b", "c"]));
        let vectorizer = Vectorizer::new(&mut tree, &taxa(&["a", "b", "c"]), false, true, false).unwrap();
        assert_eq!(vectorizer.branch_weights(&tree).unwrap(), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn branch_weights_are_branch_lengths_in_phylogenetic_mode() {
        let mut tree = Tree::from_newick("(A:2,B:3)R;").unwrap();
        let names = taxa(&["A", "B"]);
        let vectorizer = Vectorizer::new(&mut tree, &names, true, true, false).unwrap();
        let mut weights = vectorizer.branch_weights(&tree).unwrap();
        weights.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(weights, vec![2.0, 3.0]);
    }
}
