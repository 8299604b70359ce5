//! Jackknife consensus tree (§4.4): across a set of per-replicate clustering
//! trees over the same leaf set, builds a single topology annotated with
//! the fraction of replicate trees that contain each clade ("jackknife
//! support").

use std::collections::{BTreeSet, HashMap};

use crate::tree::{Node, NodeId, Tree};

type Clade = BTreeSet<String>;

/// Every non-trivial clade (more than one leaf, not the whole leaf set)
/// appearing in `tree`'s topology, as a sorted leaf-name set.
fn clades(tree: &Tree, leaf_universe: &Clade) -> Vec<Clade> {
    let mut out = Vec::new();
    for node in tree.iter_nodes() {
        if node.is_tip() || node.parent.is_none() {
            continue;
        }
        let leaves: Clade = tree
            .get_subtree_leaves(&node.id)
            .into_iter()
            .filter_map(|id| tree.get(&id).name.clone())
            .collect();
        if leaves.len() > 1 && &leaves != leaf_universe {
            out.push(leaves);
        }
    }
    out
}

/// Build the consensus topology across `trees` (which must all share the
/// same leaf label set, e.g. the per-replicate clustering trees produced by
/// [`crate::engine::Engine::dissimilarity`] under jackknifing). Each
/// internal node's name is set to the fraction of replicate trees whose
/// topology contains that exact clade, formatted to three decimal places;
/// clades that conflict with a higher-frequency clade already placed are
/// dropped rather than forcing an inconsistent topology.
///
/// Returns an empty tree if `trees` is empty.
pub fn jackknife_consensus(trees: &[Tree]) -> Tree {
    let mut consensus = Tree::new();
    if trees.is_empty() {
        return consensus;
    }
    let n = trees.len() as f64;

    let leaf_universe: Clade = trees[0]
        .get_leaves()
        .into_iter()
        .filter_map(|id| trees[0].get(&id).name.clone())
        .collect();

    let mut counts: HashMap<Clade, usize> = HashMap::new();
    for tree in trees {
        for clade in clades(tree, &leaf_universe) {
            *counts.entry(clade).or_insert(0) += 1;
        }
    }

    let mut candidates: Vec<(Clade, usize)> = counts.into_iter().collect();
    candidates.sort_by(|(a_clade, a_count), (b_clade, b_count)| {
        b_count
            .cmp(a_count)
            .then(b_clade.len().cmp(&a_clade.len()))
            .then(a_clade.iter().cmp(b_clade.iter()))
    });

    let root = consensus.add(Node::new());
    let mut current_groups: Vec<(Clade, NodeId)> = leaf_universe
        .iter()
        .map(|name| {
            let id = consensus.add(Node::new_named(name));
            (Clade::from([name.clone()]), id)
        })
        .collect();

    for (clade, count) in candidates {
        let (inside, mut outside): (Vec<_>, Vec<_>) = current_groups
            .into_iter()
            .partition(|(leaves, _)| leaves.is_subset(&clade));
        let covered: Clade = inside.iter().flat_map(|(l, _)| l.iter().cloned()).collect();
        if covered != clade || inside.len() < 2 {
            // Conflicts with the current partition (or is already formed
            // at a finer granularity); skip rather than force it in.
            outside.extend(inside);
            current_groups = outside;
            continue;
        }

        let support = count as f64 / n;
        let parent = consensus.add(Node::new_named(&format!("{support:.3}")));
        for (_, id) in &inside {
            consensus.attach(*id, parent, None);
        }
        outside.push((clade, parent));
        current_groups = outside;
    }

    for (_, id) in current_groups {
        consensus.attach(id, root, None);
    }
    consensus
}
