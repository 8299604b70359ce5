//! The rooted tree model (component **T** of the β-diversity engine).
//!
//! As in the teacher crate, trees are stored as a vector-backed arena of
//! [`Node`] values rather than a pointer graph: a [`NodeId`] is just an
//! index into [`Tree`]'s arena, so recursive tree algorithms (traversal,
//! projection, distance) are implemented without recursive ownership.

mod node;
mod newick;
mod tree;

pub use node::Node;
pub use tree::{Tree, TreeError};
pub use newick::ParseError;

/// Identifier of a node within a [`Tree`]; an index into its arena.
pub type NodeId = usize;

/// Length of a branch between a node and its parent.
pub type Edge = f64;
