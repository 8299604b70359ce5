//! Synthetic random trees, used by property-style tests and the `generate`
//! CLI subcommand to produce fixtures without a real phylogeny on hand.

use std::collections::VecDeque;

use clap::ValueEnum;
use rand::prelude::*;

use crate::distr::{Distr, Sampler};
use crate::tree::{Node, Tree, TreeError};

/// Shape of random trees to generate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum TreeShape {
    /// Random binary shape: at each step, grow from either end of the
    /// frontier queue with equal probability.
    Random,
    /// Yule (pure-birth) model shape.
    Yule,
    /// Caterpillar (maximally unbalanced) shape.
    Caterpillar,
}

/// Generate a random binary tree of `n_leaves` tips, optionally with branch
/// lengths drawn from `sampler_type`.
pub fn generate_tree(n_leaves: usize, brlens: bool, sampler_type: Distr) -> Result<Tree, TreeError> {
    let mut tree = Tree::new();
    tree.add(Node::default());

    let mut rng = thread_rng();
    let sampler = Sampler::new(sampler_type);

    let mut frontier = VecDeque::new();
    frontier.push_back(0);

    for _ in 0..n_leaves.saturating_sub(1) {
        let parent_id = if rng.gen_bool(0.5) {
            frontier.pop_front()
        } else {
            frontier.pop_back()
        }
        .unwrap();
        let l1 = brlens.then(|| sampler.sample(&mut rng));
        let l2 = brlens.then(|| sampler.sample(&mut rng));
        frontier.push_back(tree.add_child(Node::new(), parent_id, l1)?);
        frontier.push_back(tree.add_child(Node::new(), parent_id, l2)?);
    }

    for (i, id) in frontier.iter().enumerate() {
        tree.get_mut(id).set_name(format!("Tip_{i}"));
    }

    Ok(tree)
}

/// Generate a random binary tree under the Yule (pure-birth) model: at each
/// step a uniformly random current tip is split into two children.
pub fn generate_yule(n_leaves: usize, brlens: bool, sampler_type: Distr) -> Result<Tree, TreeError> {
    let mut tree = Tree::new();
    let root = tree.add(Node::default());

    let mut rng = thread_rng();
    let sampler = Sampler::new(sampler_type);

    let mut parent_candidates = vec![root];

    while tree.n_leaves() < n_leaves {
        let index = rng.gen_range(0..parent_candidates.len());
        let parent = parent_candidates.swap_remove(index);

        let edge1 = brlens.then(|| sampler.sample(&mut rng));
        let edge2 = brlens.then(|| sampler.sample(&mut rng));
        let child1 = tree.add_child(Node::default(), parent, edge1)?;
        let child2 = tree.add_child(Node::default(), parent, edge2)?;
        parent_candidates.push(child1);
        parent_candidates.push(child2);
    }

    for (i, tip_idx) in tree.get_leaves().into_iter().enumerate() {
        tree.get_mut(&tip_idx).set_name(format!("Tip_{i}"));
    }

    Ok(tree)
}

/// Generate a caterpillar tree: each new internal node hangs a single fresh
/// tip off the previous one, down a single spine.
pub fn generate_caterpillar(
    n_leaves: usize,
    brlens: bool,
    sampler_type: Distr,
) -> Result<Tree, TreeError> {
    let mut tree = Tree::new();
    tree.add(Node::default());

    let mut rng = thread_rng();
    let sampler = Sampler::new(sampler_type);

    let mut parent = 0;
    for i in 1..n_leaves {
        let parent_bkp = parent;

        let l1 = brlens.then(|| sampler.sample(&mut rng));
        let l2 = brlens.then(|| sampler.sample(&mut rng));

        if i == n_leaves - 1 {
            tree.add_child(Node::new_named(&format!("Tip_{i}")), parent, l1)?;
            tree.add_child(Node::new_named(&format!("Tip_{}", i + 1)), parent, l2)?;
        } else {
            parent = tree.add_child(Node::new(), parent, l1)?;
            tree.add_child(Node::new_named(&format!("Tip_{i}")), parent_bkp, l2)?;
        }
    }

    Ok(tree)
}

/// Dispatch on [`TreeShape`] to one of the three generators above.
pub fn generate(
    shape: TreeShape,
    n_leaves: usize,
    brlens: bool,
    sampler_type: Distr,
) -> Result<Tree, TreeError> {
    match shape {
        TreeShape::Random => generate_tree(n_leaves, brlens, sampler_type),
        TreeShape::Yule => generate_yule(n_leaves, brlens, sampler_type),
        TreeShape::Caterpillar => generate_caterpillar(n_leaves, brlens, sampler_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_tree_has_requested_tip_count() {
        let tree = generate_tree(12, true, Distr::Uniform).unwrap();
        assert_eq!(tree.n_leaves(), 12);
        assert!(tree.is_binary());
    }

    #[test]
    fn generate_yule_has_requested_tip_count() {
        let tree = generate_yule(9, false, Distr::Exponential).unwrap();
        assert_eq!(tree.n_leaves(), 9);
    }

    #[test]
    fn generate_caterpillar_has_requested_tip_count() {
        let tree = generate_caterpillar(6, true, Distr::Gamma).unwrap();
        assert_eq!(tree.n_leaves(), 6);
    }

    #[test]
    fn single_leaf_tree_is_just_the_root() {
        let tree = generate_tree(1, false, Distr::Uniform).unwrap();
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.size(), 1);
    }
}
