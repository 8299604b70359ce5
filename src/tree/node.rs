//! A single node in a [`Tree`](super::Tree).
//!
//! The tree is stored as a flat arena of [`Node`] values (see the crate's
//! top level docs); a node refers to its relatives by [`NodeId`], which is
//! simply its index into the arena. Every scratch field used by the
//! vectorizer and the MRCA reducer lives directly on the node so that a
//! single node shape serves every algorithm in this crate.

use super::{Edge, NodeId};

/// A node in a [`Tree`](super::Tree).
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Index of this node in its tree's arena. Set by [`Tree::add`](super::Tree::add).
    pub id: NodeId,
    /// Optional name (leaves are typically named after a taxon; internal
    /// nodes may carry a support value or clade label).
    pub name: Option<String>,
    /// Newick bracket comment attached to this node, if any.
    pub comment: Option<String>,
    /// Parent node, `None` only for the root.
    pub parent: Option<NodeId>,
    /// Branch length to the parent. `None` means "absent", distinct from
    /// zero; see `TreeError`/`DataConsistencyError::MissingBranchLength`.
    pub parent_edge: Option<Edge>,
    /// Children, in the order they were added / parsed.
    pub children: Vec<NodeId>,
    /// Number of edges from the root to this node.
    pub depth: usize,

    /// Position of this node in a post-order traversal that excludes the
    /// root. `None` until [`Tree`](super::Tree) assigns it.
    pub post_order_index: Option<usize>,
    /// Position of this node in a breadth-first traversal from the root.
    pub bfs_index: Option<usize>,
    /// Index into the sample table's taxon columns. Only ever set on
    /// leaves.
    pub taxon_index: Option<usize>,
    /// Scratch counter used by the MRCA reducer: number of present-in-either
    /// leaves in the subtree rooted here, for the current pair of samples.
    pub scratch_counter: usize,
    /// Scratch value used by the MRCA reducer's `ApplyWeightsMRCA` pass.
    pub scratch_value: f64,

    /// Arena bookkeeping: `false` once a node has been detached by
    /// [`Tree::project`](super::Tree::project)'s pruning pass. Such nodes
    /// are never visited by traversals and their arena slot is not reused.
    pub(crate) alive: bool,
}

impl Node {
    /// Create a new, unnamed, unattached node.
    pub fn new() -> Self {
        Self {
            id: 0,
            name: None,
            comment: None,
            parent: None,
            parent_edge: None,
            children: Vec::new(),
            depth: 0,
            post_order_index: None,
            bfs_index: None,
            taxon_index: None,
            scratch_counter: 0,
            scratch_value: 0.0,
            alive: true,
        }
    }

    /// Create a new, unattached node with a name.
    pub fn new_named(name: &str) -> Self {
        let mut node = Self::new();
        node.name = Some(name.to_owned());
        node
    }

    /// Is this node a leaf (tip) of the tree?
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }

    /// Set this node's id (called by the arena on insertion).
    pub fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    /// Set this node's name.
    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    /// Bind this node to a parent, optionally setting the branch length.
    pub fn set_parent(&mut self, parent: NodeId, edge: Option<Edge>) {
        self.parent = Some(parent);
        self.parent_edge = edge;
    }

    /// Set this node's depth (distance from root, in edges).
    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    /// Record a child of this node. The branch length lives on the child's
    /// own `parent_edge`, not here.
    pub fn add_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    /// Detach this node: clear its parent and children links and mark it
    /// dead. Used when pruning a subtree; the arena slot is left in place
    /// but orphaned and excluded from every traversal.
    pub fn delete(&mut self) {
        self.parent = None;
        self.children.clear();
        self.alive = false;
    }

    /// Multiply this node's branch length to its parent by `factor`, if set.
    pub fn rescale_edges(&mut self, factor: f64) {
        if let Some(edge) = self.parent_edge.as_mut() {
            *edge *= factor;
        }
    }

    /// Render this node's own newick fragment: name, bracket comment and
    /// `:length` suffix. Does not include children or surrounding
    /// parentheses; see [`Tree::to_newick`](super::Tree::to_newick).
    pub fn to_newick(&self) -> String {
        let mut out = String::new();
        if let Some(name) = &self.name {
            out.push_str(name);
        }
        if let Some(comment) = &self.comment {
            out.push('[');
            out.push_str(comment);
            out.push(']');
        }
        if let Some(edge) = self.parent_edge {
            out.push(':');
            out.push_str(&format_branch_length(edge));
        }
        out
    }
}

/// Format a branch length the way the teacher's doctests expect: integral
/// values print without a trailing `.0`.
pub(crate) fn format_branch_length(value: f64) -> String {
    if value == value.trunc() && value.is_finite() {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}
