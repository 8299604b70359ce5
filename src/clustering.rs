//! Agglomerative and neighbour-joining clustering of a dissimilarity
//! matrix into a [`Tree`] (§4.5).

use clap::ValueEnum;
use itertools::Itertools;
use ndarray::Array2;

use crate::matrix::DissimilarityMatrix;
use crate::tree::{Node, NodeId, Tree};

/// Which clustering algorithm to run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ClusteringMethod {
    /// Single linkage (nearest neighbour).
    Single,
    /// Complete linkage (furthest neighbour).
    Complete,
    /// Average linkage (UPGMA).
    Average,
    /// Neighbour joining.
    NeighborJoining,
}

/// Cluster `matrix` into a tree using `method`. Leaves are named after
/// `matrix`'s sample order; internal node branch lengths follow the
/// Lance-Williams update (agglomerative methods) or the standard NJ branch
/// length formulas (neighbour joining).
pub fn cluster(matrix: &DissimilarityMatrix, method: ClusteringMethod) -> Tree {
    match method {
        ClusteringMethod::NeighborJoining => neighbor_joining(matrix),
        _ => agglomerative(matrix, method),
    }
}

fn lex_pair(i: usize, j: usize) -> (usize, usize) {
    if i < j {
        (i, j)
    } else {
        (j, i)
    }
}

/// Single/complete/average linkage: O(N^3) Lance-Williams, merging the
/// closest active pair at each step (lexicographic tie-break), setting
/// each child's branch length so its root-to-leaf distance equals the
/// merge height (half the pair's distance).
fn agglomerative(matrix: &DissimilarityMatrix, method: ClusteringMethod) -> Tree {
    let n = matrix.n();
    let mut tree = Tree::new();
    let leaf_ids: Vec<NodeId> = matrix
        .sample_names()
        .iter()
        .map(|name| tree.add(Node::new_named(name)))
        .collect();

    if n <= 1 {
        return tree;
    }

    let capacity = 2 * n;
    let mut cluster_node = vec![0usize; capacity];
    let mut height = vec![0.0f64; capacity];
    let mut size = vec![1usize; capacity];
    for (i, &id) in leaf_ids.iter().enumerate() {
        cluster_node[i] = id;
    }

    let mut dist = Array2::<f64>::zeros((capacity, capacity));
    for i in 0..n {
        for j in 0..n {
            dist[[i, j]] = matrix.get(i, j);
        }
    }

    let mut active: Vec<usize> = (0..n).collect();
    let mut next_id = n;

    while active.len() > 1 {
        let (i, j) = active
            .iter()
            .tuple_combinations()
            .map(|(&a, &b)| lex_pair(a, b))
            .min_by(|&(ai, aj), &(bi, bj)| {
                dist[[ai, aj]]
                    .partial_cmp(&dist[[bi, bj]])
                    .unwrap()
                    .then((ai, aj).cmp(&(bi, bj)))
            })
            .expect("active has at least two clusters");
        let best_dist = dist[[i, j]];
        let merge_height = best_dist / 2.0;

        let parent = tree.add(Node::new());
        tree.attach(cluster_node[i], parent, Some((merge_height - height[i]).max(0.0)));
        tree.attach(cluster_node[j], parent, Some((merge_height - height[j]).max(0.0)));

        let new_id = next_id;
        next_id += 1;
        for &k in &active {
            if k == i || k == j {
                continue;
            }
            let d_ik = dist[[lex_pair(i, k).0, lex_pair(i, k).1]];
            let d_jk = dist[[lex_pair(j, k).0, lex_pair(j, k).1]];
            let d_new = match method {
                ClusteringMethod::Single => d_ik.min(d_jk),
                ClusteringMethod::Complete => d_ik.max(d_jk),
                ClusteringMethod::Average => {
                    let si = size[i] as f64;
                    let sj = size[j] as f64;
                    (si * d_ik + sj * d_jk) / (si + sj)
                }
                ClusteringMethod::NeighborJoining => unreachable!("handled by cluster()"),
            };
            dist[[new_id, k]] = d_new;
            dist[[k, new_id]] = d_new;
        }

        cluster_node[new_id] = parent;
        height[new_id] = merge_height;
        size[new_id] = size[i] + size[j];

        active.retain(|&x| x != i && x != j);
        active.push(new_id);
    }

    tree
}

/// Neighbour joining: maintain per-cluster separation sums and merge the
/// pair minimising `D[i][j] - s_i - s_j` until two clusters remain, then
/// join those under an arbitrary root.
fn neighbor_joining(matrix: &DissimilarityMatrix) -> Tree {
    let n = matrix.n();
    let mut tree = Tree::new();
    let leaf_ids: Vec<NodeId> = matrix
        .sample_names()
        .iter()
        .map(|name| tree.add(Node::new_named(name)))
        .collect();

    if n <= 1 {
        return tree;
    }
    if n == 2 {
        let parent = tree.add(Node::new());
        let d = matrix.get(0, 1);
        tree.attach(leaf_ids[0], parent, Some(d / 2.0));
        tree.attach(leaf_ids[1], parent, Some(d / 2.0));
        return tree;
    }

    let capacity = 2 * n;
    let mut cluster_node = vec![0usize; capacity];
    for (i, &id) in leaf_ids.iter().enumerate() {
        cluster_node[i] = id;
    }

    let mut dist = Array2::<f64>::zeros((capacity, capacity));
    for i in 0..n {
        for j in 0..n {
            dist[[i, j]] = matrix.get(i, j);
        }
    }

    let mut active: Vec<usize> = (0..n).collect();
    let mut next_id = n;

    while active.len() > 2 {
        let m = active.len() as f64;
        let mut separation = vec![0.0f64; capacity];
        for &i in &active {
            separation[i] = active.iter().map(|&j| dist[[i, j]]).sum::<f64>() / (m - 2.0);
        }

        let (i, j) = active
            .iter()
            .tuple_combinations()
            .map(|(&a, &b)| lex_pair(a, b))
            .min_by(|&(ai, aj), &(bi, bj)| {
                let score_a = dist[[ai, aj]] - separation[ai] - separation[aj];
                let score_b = dist[[bi, bj]] - separation[bi] - separation[bj];
                score_a.partial_cmp(&score_b).unwrap().then((ai, aj).cmp(&(bi, bj)))
            })
            .expect("active has at least two clusters");
        let dij = dist[[i, j]];
        let d1 = 0.5 * dij + 0.5 * (separation[i] - separation[j]);
        let d2 = dij - d1;

        let parent = tree.add(Node::new());
        tree.attach(cluster_node[i], parent, Some(d1));
        tree.attach(cluster_node[j], parent, Some(d2));

        let new_id = next_id;
        next_id += 1;
        for &k in &active {
            if k == i || k == j {
                continue;
            }
            let new_d = 0.5 * (dist[[i, k]] + dist[[j, k]] - dij);
            dist[[new_id, k]] = new_d;
            dist[[k, new_id]] = new_d;
        }

        cluster_node[new_id] = parent;
        active.retain(|&x| x != i && x != j);
        active.push(new_id);
    }

    let i = active[0];
    let j = active[1];
    let dij = dist[[i, j]];
    let root = tree.add(Node::new());
    tree.attach(cluster_node[i], root, Some(dij / 2.0));
    tree.attach(cluster_node[j], root, Some(dij / 2.0));
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_point() -> DissimilarityMatrix {
        // Classic textbook quartet: ((A,B),(C,D)) with A-B and C-D close.
        let mut m = DissimilarityMatrix::zeros(vec!["A".into(), "B".into(), "C".into(), "D".into()]);
        m.set(1, 0, 2.0); // A-B
        m.set(2, 0, 8.0);
        m.set(2, 1, 8.0);
        m.set(3, 0, 8.0);
        m.set(3, 1, 8.0);
        m.set(3, 2, 2.0); // C-D
        m
    }

    #[test]
    fn average_linkage_groups_close_pairs_first() {
        let tree = cluster(&four_point(), ClusteringMethod::Average);
        let a = tree.get_by_name("A").unwrap().id;
        let b = tree.get_by_name("B").unwrap().id;
        let c = tree.get_by_name("C").unwrap().id;
        assert_eq!(tree.get_common_ancestor(&a, &b), tree.get(&a).parent.unwrap());
        assert_ne!(tree.get_common_ancestor(&a, &b), tree.get_common_ancestor(&a, &c));
    }

    #[test]
    fn single_linkage_produces_a_fully_resolved_tree() {
        let tree = cluster(&four_point(), ClusteringMethod::Single);
        assert_eq!(tree.n_leaves(), 4);
        assert_eq!(tree.size(), 7); // 4 leaves + 3 internal merges
    }

    #[test]
    fn neighbor_joining_groups_close_pairs_first() {
        let tree = cluster(&four_point(), ClusteringMethod::NeighborJoining);
        let a = tree.get_by_name("A").unwrap().id;
        let b = tree.get_by_name("B").unwrap().id;
        assert_eq!(tree.get_common_ancestor(&a, &b), tree.get(&a).parent.unwrap());
    }

    #[test]
    fn two_sample_neighbor_joining_splits_distance_in_half() {
        let mut m = DissimilarityMatrix::zeros(vec!["A".into(), "B".into()]);
        m.set(1, 0, 4.0);
        let tree = neighbor_joining(&m);
        let a = tree.get_by_name("A").unwrap();
        assert!((a.parent_edge.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_f_upgma_merge_heights() {
        // D = [[0,2,3],[2,0,3],[3,3,0]]: samples "1","2" merge first
        // (height 1), then that cluster joins "3" (height 1.5).
        let mut m = DissimilarityMatrix::zeros(vec!["1".into(), "2".into(), "3".into()]);
        m.set(1, 0, 2.0);
        m.set(2, 0, 3.0);
        m.set(2, 1, 3.0);
        let tree = cluster(&m, ClusteringMethod::Average);

        let n1 = tree.get_by_name("1").unwrap().id;
        let n2 = tree.get_by_name("2").unwrap().id;
        let n3 = tree.get_by_name("3").unwrap().id;

        // First merge: "1" and "2" share a parent, each at branch length
        // (height) 1 below it.
        let first_merge = tree.get(&n1).parent.unwrap();
        assert_eq!(tree.get(&n2).parent.unwrap(), first_merge);
        assert!((tree.get(&n1).parent_edge.unwrap() - 1.0).abs() < 1e-9);
        assert!((tree.get(&n2).parent_edge.unwrap() - 1.0).abs() < 1e-9);

        // Second merge: {1,2} joins "3" at height 1.5, the root. "3" sits
        // 1.5 below the root directly; {1,2}'s merge node sits 1 below the
        // root already, so it needs only another 0.5 to reach height 1.5 —
        // giving n1/n2 a 1.5 root-to-leaf distance overall.
        let root = tree.get_root().unwrap();
        assert_eq!(tree.get(&first_merge).parent.unwrap(), root);
        assert_eq!(tree.get(&n3).parent.unwrap(), root);
        assert!((tree.get(&first_merge).parent_edge.unwrap() - 0.5).abs() < 1e-9);
        assert!((tree.get(&n3).parent_edge.unwrap() - 1.5).abs() < 1e-9);
        assert!((tree.get_root_distance(&n3).unwrap() - 1.5).abs() < 1e-9);
        assert!((tree.get_root_distance(&n1).unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn single_sample_is_just_a_root_leaf() {
        let m = DissimilarityMatrix::zeros(vec!["A".into()]);
        let tree = cluster(&m, ClusteringMethod::Average);
        assert_eq!(tree.n_leaves(), 1);
    }
}
