//! The calculator correlator (component **X**, §4.6): given a set of
//! completed dissimilarity matrices sharing the same sample order, finds
//! how similar the *measures themselves* are to each other, by correlating
//! their lower-triangle entries across every sample pair.

use accurate::sum::Sum2;
use accurate::traits::*;

use crate::clustering::{self, ClusteringMethod};
use crate::matrix::DissimilarityMatrix;
use crate::tree::{NodeId, Tree};

/// One group of calculators cut from the correlator's cluster tree at a
/// given threshold, as printed by `All` (§6's cluster-group file).
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatorGroup {
    /// Height of the cluster node this group was cut at.
    pub height: f64,
    /// Calculator names in this group, in the cluster tree's leaf order.
    pub members: Vec<String>,
}

/// Pearson correlation between two equal-length slices using the
/// one-pass sum-of-squares/sum-of-cross-products form
/// (`SSxy / sqrt(SSxx * SSyy)`).
fn pearson_r(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let deltas: Vec<(f64, f64, f64)> = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let dx = xi - mean_x;
            let dy = yi - mean_y;
            (dx * dy, dx * dx, dy * dy)
        })
        .collect();
    let ss_xy: f64 = deltas.iter().map(|t| t.0).sum_with_accumulator::<Sum2<f64>>();
    let ss_xx: f64 = deltas.iter().map(|t| t.1).sum_with_accumulator::<Sum2<f64>>();
    let ss_yy: f64 = deltas.iter().map(|t| t.2).sum_with_accumulator::<Sum2<f64>>();
    let denom = (ss_xx * ss_yy).sqrt();
    if denom > 0.0 {
        ss_xy / denom
    } else {
        0.0
    }
}

/// Build the `|calculators| x |calculators|` dissimilarity matrix
/// `1 - pearson_r(lower_triangle(A), lower_triangle(B))` over every pair of
/// named dissimilarity matrices, which must all share the same sample
/// order.
pub fn correlate(named_matrices: &[(String, DissimilarityMatrix)]) -> DissimilarityMatrix {
    let names: Vec<String> = named_matrices.iter().map(|(name, _)| name.clone()).collect();
    let lower_triangles: Vec<Vec<f64>> = named_matrices
        .iter()
        .map(|(_, matrix)| matrix.lower_triangle())
        .collect();

    let mut result = DissimilarityMatrix::zeros(names);
    for i in 1..named_matrices.len() {
        for j in 0..i {
            let r = pearson_r(&lower_triangles[i], &lower_triangles[j]);
            result.set(i, j, 1.0 - r);
        }
    }
    result
}

/// Cluster the calculator-correlation matrix by complete linkage and cut
/// the tree at `1 - threshold`: depth-first from the root, the first node
/// whose height is at least the cut reports its leaf set as one group and
/// is not descended into further.
pub fn cluster_and_cut(
    correlation: &DissimilarityMatrix,
    threshold: f64,
) -> (Tree, Vec<CalculatorGroup>) {
    let tree = clustering::cluster(correlation, ClusteringMethod::Complete);
    let cut = 1.0 - threshold;
    let mut groups = Vec::new();

    if let Ok(root) = tree.get_root() {
        collect_groups(&tree, root, cut, &mut groups);
    }
    (tree, groups)
}

/// Height of `node` above its own leaves: the sum of branch lengths is not
/// meaningful here since clustering heights are stored as the node's
/// distance *to* its children, not from the leaves; re-derive it by
/// looking at any descendant leaf's accumulated branch length from `node`.
fn height_of(tree: &Tree, node: NodeId) -> f64 {
    let mut current = node;
    let mut height = 0.0;
    loop {
        let children = &tree.get(&current).children;
        if children.is_empty() {
            break;
        }
        let child = children[0];
        height += tree.get(&child).parent_edge.unwrap_or(0.0);
        current = child;
    }
    height
}

fn collect_groups(tree: &Tree, node: NodeId, cut: f64, groups: &mut Vec<CalculatorGroup>) {
    let height = height_of(tree, node);
    if height >= cut || tree.get(&node).is_tip() {
        let members: Vec<String> = tree
            .get_subtree_leaves(&node)
            .into_iter()
            .map(|leaf| tree.get(&leaf).name.clone().unwrap_or_default())
            .collect();
        groups.push(CalculatorGroup { height, members });
        return;
    }
    for child in tree.get(&node).children.clone() {
        collect_groups(tree, child, cut, groups);
    }
}
