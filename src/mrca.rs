//! The MRCA (most recent common ancestor) reducer (component **M**, §4.3).
//!
//! Operates on a pair of [`BranchVector`]s already produced by the
//! [`Vectorizer`](crate::vectorizer::Vectorizer) for the same tree.

use fixedbitset::FixedBitSet;

use crate::tree::{NodeId, Tree};
use crate::vectorizer::BranchVector;

/// Deepest node whose subtree's leaves cover every leaf present (nonzero)
/// in either `b_i` or `b_j`, found by propagating a presence counter
/// bottom-up and walking back down from the root while the counter stays
/// saturated.
fn find_mrca(
    tree: &mut Tree,
    postorder: &[NodeId],
    b_i: &BranchVector,
    b_j: &BranchVector,
) -> NodeId {
    let root = tree.get_root().expect("tree has a root");

    for &id in postorder {
        let present = {
            let node = tree.get(&id);
            if node.is_tip() {
                let pos = node.post_order_index.unwrap();
                usize::from(b_i[pos] > 0.0 || b_j[pos] > 0.0)
            } else {
                node.children
                    .iter()
                    .map(|c| tree.get(c).scratch_counter)
                    .sum()
            }
        };
        tree.get_mut(&id).scratch_counter = present;
    }
    // The root itself is excluded from `postorder`; its counter is the sum
    // over its direct children.
    let root_count: usize = tree
        .get(&root)
        .children
        .iter()
        .map(|c| tree.get(c).scratch_counter)
        .sum();
    tree.get_mut(&root).scratch_counter = root_count;

    // Descend while exactly one child's subtree carries every present leaf;
    // stop at the first node where that no longer holds (or at a leaf).
    let mut current = root;
    loop {
        let children = tree.get(&current).children.clone();
        let mut full_children = children
            .iter()
            .filter(|c| tree.get(c).scratch_counter == root_count);
        match (full_children.next(), full_children.next()) {
            (Some(&only), None) => current = only,
            _ => break,
        }
    }
    current
}

/// RestrictToMRCA: produce `(b_i', b_j', w')` covering only the subtree
/// rooted at the deepest node whose subtree spans every leaf present in
/// either sample. If the pooled leaf set is empty, the restricted weights
/// are all zero and the caller should short-circuit the dissimilarity to 0.
pub fn restrict_to_mrca(
    tree: &mut Tree,
    postorder: &[NodeId],
    weights: &[f64],
    b_i: &BranchVector,
    b_j: &BranchVector,
) -> (BranchVector, BranchVector, Vec<f64>) {
    let mrca = find_mrca(tree, postorder, b_i, b_j);
    let mut subtree_nodes = FixedBitSet::with_capacity(tree.size());
    for id in tree.postorder_subtree(&mrca) {
        subtree_nodes.insert(id);
    }

    let mut ri = Vec::new();
    let mut rj = Vec::new();
    let mut rw = Vec::new();
    for (pos, &id) in postorder.iter().enumerate() {
        if id != mrca && subtree_nodes.contains(id) {
            ri.push(b_i[pos]);
            rj.push(b_j[pos]);
            rw.push(weights[pos]);
        }
    }
    (BranchVector(ri), BranchVector(rj), rw)
}

/// ApplyWeightsMRCA: replace each branch weight `w[n]` with
/// `w[n] * S(parent(n))`, where `S(v) = Σ_c ½(b_i[c]+b_j[c]) -
/// max_c ½(b_i[c]+b_j[c]) + S(parent(v))`, computed breadth-first from the
/// root (the root's `S` is the leaf sum minus the leaf max over its
/// children). This is an experimental reweighting, not a pruning; the
/// resulting weight vector may legitimately sum to zero, in which case the
/// caller should resolve the dissimilarity to 0.
pub fn apply_weights_mrca(
    tree: &mut Tree,
    postorder: &[NodeId],
    bfs: &[NodeId],
    weights: &[f64],
    b_i: &BranchVector,
    b_j: &BranchVector,
) -> Vec<f64> {
    let position_of: std::collections::HashMap<NodeId, usize> = postorder
        .iter()
        .enumerate()
        .map(|(pos, &id)| (id, pos))
        .collect();

    let half_sum = |id: &NodeId| -> f64 {
        position_of
            .get(id)
            .map(|&pos| 0.5 * (b_i[pos] + b_j[pos]))
            .unwrap_or(0.0)
    };

    for &id in bfs {
        let children = tree.get(&id).children.clone();
        let s = if children.is_empty() {
            tree.get(&id)
                .parent
                .map(|p| tree.get(&p).scratch_value)
                .unwrap_or(0.0)
        } else {
            let values: Vec<f64> = children.iter().map(half_sum).collect();
            let sum: f64 = values.iter().sum();
            let max = values.iter().cloned().fold(0.0_f64, f64::max);
            let parent_s = tree
                .get(&id)
                .parent
                .map(|p| tree.get(&p).scratch_value)
                .unwrap_or(0.0);
            sum - max + parent_s
        };
        tree.get_mut(&id).scratch_value = s;
    }

    postorder
        .iter()
        .enumerate()
        .map(|(pos, &id)| {
            let parent = tree.get(&id).parent.expect("non-root node has a parent");
            weights[pos] * tree.get(&parent).scratch_value
        })
        .collect()
}

/// For leaves present in each sample (nonzero branch-vector value), the
/// minimum phylogenetic distance from each leaf present in `b_i` to the
/// nearest leaf present in `b_j` (and vice versa), proportion-weighted when
/// `weighted` and simply averaged otherwise. Used by MNND: callers average
/// the two directional results.
pub fn leaf_set_min_distance(
    tree: &Tree,
    postorder: &[NodeId],
    source: &BranchVector,
    target: &BranchVector,
    weighted: bool,
) -> f64 {
    let source_leaves = present_leaves(tree, postorder, source);
    let target_leaves = present_leaves(tree, postorder, target);
    if source_leaves.is_empty() || target_leaves.is_empty() {
        return 0.0;
    }

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (leaf, proportion) in &source_leaves {
        let min_dist = target_leaves
            .iter()
            .map(|(other, _)| tree.get_distance(leaf, other).unwrap_or(0.0))
            .fold(f64::INFINITY, f64::min);
        let w = if weighted { *proportion } else { 1.0 };
        weighted_sum += w * min_dist;
        weight_total += w;
    }
    if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    }
}

/// LeafSetMeanDistance: proportion-weighted mean phylogenetic distance
/// between leaves present in each sample (used when a mean rather than a
/// nearest-neighbour summary is required).
pub fn leaf_set_mean_distance(
    tree: &Tree,
    source_leaves: &[(NodeId, f64)],
    target_leaves: &[(NodeId, f64)],
) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (a, pa) in source_leaves {
        for (b, pb) in target_leaves {
            let d = tree.get_distance(a, b).unwrap_or(0.0);
            numerator += pa * pb * d;
            denominator += pa * pb;
        }
    }
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// LeafSetRootDistance: for every leaf present in either sample, the
/// root-to-leaf distance multiplied by that leaf's proportion in each
/// sample, returned as `(root_dist_i, root_dist_j)` sums over the pooled
/// leaf set. Used by normalized weighted UniFrac.
pub fn leaf_set_root_distance(
    tree: &Tree,
    postorder: &[NodeId],
    b_i: &BranchVector,
    b_j: &BranchVector,
) -> (f64, f64) {
    let mut root_i = 0.0;
    let mut root_j = 0.0;
    for &id in postorder {
        let node = tree.get(&id);
        if !node.is_tip() {
            continue;
        }
        let pos = node.post_order_index.unwrap();
        if b_i[pos] > 0.0 || b_j[pos] > 0.0 {
            let root_dist = tree.get_root_distance(&id).unwrap_or(0.0);
            root_i += root_dist * b_i[pos];
            root_j += root_dist * b_j[pos];
        }
    }
    (root_i, root_j)
}

/// PairedLeafSetDistance: leaf-to-leaf phylogenetic distance matrix between
/// leaves present in `b_i` paired against leaves present in `b_j`, used by
/// Fst and Rao's Hp via `dA`/`dB`/`dT` sums over the pooled set.
pub fn paired_leaf_set_distance(tree: &Tree, leaves: &[(NodeId, f64)]) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (a, pa) in leaves {
        for (b, pb) in leaves {
            if a == b {
                continue;
            }
            let d = tree.get_distance(a, b).unwrap_or(0.0);
            numerator += pa * pb * d;
            denominator += pa * pb;
        }
    }
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// LeafSetDistance / FullLeafSetDistance: the full leaf-to-leaf
/// phylogenetic distance matrix over the leaves present in the pooled
/// pair, as `(leaf_id, proportion_in_i, proportion_in_j)` triples paired
/// with their pairwise distances. Used by MPD.
pub fn full_leaf_set_distance(tree: &Tree, pooled: &[(NodeId, f64, f64)]) -> Vec<Vec<f64>> {
    pooled
        .iter()
        .map(|(a, _, _)| {
            pooled
                .iter()
                .map(|(b, _, _)| tree.get_distance(a, b).unwrap_or(0.0))
                .collect()
        })
        .collect()
}

/// Leaves with a nonzero branch-vector value, as `(node id, value)` pairs.
pub fn present_leaves(
    tree: &Tree,
    postorder: &[NodeId],
    vector: &BranchVector,
) -> Vec<(NodeId, f64)> {
    postorder
        .iter()
        .filter_map(|&id| {
            let node = tree.get(&id);
            if !node.is_tip() {
                return None;
            }
            let pos = node.post_order_index.unwrap();
            (vector[pos] > 0.0).then_some((id, vector[pos]))
        })
        .collect()
}

/// Pool the leaves present in either of two branch vectors into
/// `(leaf, proportion_in_i, proportion_in_j)` triples, used to build the
/// inputs to [`full_leaf_set_distance`] and [`paired_leaf_set_distance`].
pub fn pool_present_leaves(
    tree: &Tree,
    postorder: &[NodeId],
    b_i: &BranchVector,
    b_j: &BranchVector,
) -> Vec<(NodeId, f64, f64)> {
    postorder
        .iter()
        .filter_map(|&id| {
            let node = tree.get(&id);
            if !node.is_tip() {
                return None;
            }
            let pos = node.post_order_index.unwrap();
            if b_i[pos] > 0.0 || b_j[pos] > 0.0 {
                Some((id, b_i[pos], b_j[pos]))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorizer::Vectorizer;

    fn bound(newick: &str, taxa: &[&str]) -> (Tree, Vectorizer) {
        let mut tree = Tree::from_newick(newick).unwrap();
        let names: Vec<String> = taxa.iter().map(|s| s.to_string()).collect();
        let vectorizer = Vectorizer::new(&mut tree, &names, true, true, false).unwrap();
        (tree, vectorizer)
    }

    #[test]
    fn restrict_to_mrca_is_noop_when_all_taxa_shared() {
        let (mut tree, vectorizer) =
            bound("((A:1,B:1):1,(C:1,D:1):1);", &["A", "B", "C", "D"]);
        let weights = vectorizer.branch_weights(&tree).unwrap();
        let b_i = BranchVector(vec![1.0, 1.0, 1.0, 1.0]);
        let b_j = b_i.clone();
        let (ri, rj, rw) = restrict_to_mrca(&mut tree, vectorizer.postorder(), &weights, &b_i, &b_j);
        assert_eq!(ri.0.len(), weights.len());
        assert_eq!(rj.0.len(), weights.len());
        assert_eq!(rw.len(), weights.len());
    }

    #[test]
    fn restrict_to_mrca_shrinks_to_shared_subtree() {
        let (mut tree, vectorizer) =
            bound("((A:1,B:1)AB:1,(C:1,D:1)CD:1)R;", &["A", "B", "C", "D"]);
        // Both samples only ever see leaf A.
        let pos_a = tree.get_by_name("A").unwrap().post_order_index.unwrap();
        let mut values = vec![0.0; vectorizer.postorder().len()];
        values[pos_a] = 1.0;
        let b_i = BranchVector(values.clone());
        let b_j = BranchVector(values);
        let weights = vectorizer.branch_weights(&tree).unwrap();
        let (_, _, rw) = restrict_to_mrca(&mut tree, vectorizer.postorder(), &weights, &b_i, &b_j);
        // Restricted to just {A}, the weight vector should be much smaller
        // than the full tree (size 7 non-root nodes).
        assert!(rw.len() < weights.len());
    }
}
