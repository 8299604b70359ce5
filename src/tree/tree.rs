//! The [`Tree`] arena itself: construction, traversal, distances and
//! projection (§4.1).

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use thiserror::Error;

use super::newick::{self, ParseError};
use super::node::Node;
use super::{Edge, NodeId};

/// Failures operating on an already-built [`Tree`].
#[derive(Error, Debug)]
pub enum TreeError {
    /// The tree has no nodes.
    #[error("this tree is empty")]
    IsEmpty,
    /// `get_root` found no node with an absent parent.
    #[error("no root node found")]
    RootNotFound,
    /// A requested node id does not exist (or was deleted) in this tree.
    #[error("there is no node with index: {0}")]
    NodeNotFound(NodeId),
    /// A branch length required for a distance computation is absent.
    #[error("missing branch length on node {0}, required for a distance computation")]
    MissingBranchLength(NodeId),
    /// Writing the tree to a file failed.
    #[error("error writing tree to file: {0}")]
    IoError(#[from] std::io::Error),
}

/// A rooted, vector-backed tree: a flat arena of [`Node`]s addressed by
/// [`NodeId`]. Exactly one node has no parent (the root); dropping the tree
/// drops every node. Mutated only during construction and [`Tree::project`].
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Create a new, empty tree.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    // ############################
    // # adding and getting nodes #
    // ############################

    /// Add a new (unattached) node to the tree, returning its id. The first
    /// node added to an empty tree becomes the root.
    pub fn add(&mut self, mut node: Node) -> NodeId {
        let idx = self.nodes.len();
        node.id = idx;
        self.nodes.push(node);
        idx
    }

    /// Add a child of `parent`, with an optional branch length.
    pub fn add_child(
        &mut self,
        mut node: Node,
        parent: NodeId,
        edge: Option<Edge>,
    ) -> Result<NodeId, TreeError> {
        if parent >= self.nodes.len() || !self.nodes[parent].alive {
            return Err(TreeError::NodeNotFound(parent));
        }
        node.set_parent(parent, edge);
        node.set_depth(self.nodes[parent].depth + 1);
        let id = self.add(node);
        self.nodes[parent].add_child(id);
        Ok(id)
    }

    /// Reference to a node by id.
    pub fn get(&self, id: &NodeId) -> &Node {
        &self.nodes[*id]
    }

    /// Mutable reference to a node by id.
    pub fn get_mut(&mut self, id: &NodeId) -> &mut Node {
        &mut self.nodes[*id]
    }

    /// Look up a node by name (first match, live nodes only).
    pub fn get_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|node| node.alive && node.name.as_deref() == Some(name))
    }

    /// Iterate over every live node.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.alive)
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut().filter(|n| n.alive)
    }

    /// The root node's id: the unique live node with no parent.
    pub fn get_root(&self) -> Result<NodeId, TreeError> {
        self.nodes
            .iter()
            .filter(|node| node.alive && node.parent.is_none())
            .map(|node| node.id)
            .next()
            .ok_or(TreeError::RootNotFound)
    }

    /// Ids of every leaf (tip) in the tree, in arena order.
    pub fn get_leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.alive && node.is_tip())
            .map(|node| node.id)
            .collect()
    }

    /// Leaves of the subtree rooted at `root`, left-to-right.
    pub fn get_subtree_leaves(&self, root: &NodeId) -> Vec<NodeId> {
        let node = self.get(root);
        if node.is_tip() {
            return vec![*root];
        }
        let mut leaves = Vec::new();
        for child in &node.children {
            leaves.extend(self.get_subtree_leaves(child));
        }
        leaves
    }

    /// Nodes of the subtree rooted at `root`, in post-order (children
    /// before their parent), `root` included last.
    pub fn postorder_subtree(&self, root: &NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        self.postorder_visit(root, &mut order);
        order
    }

    fn postorder_visit(&self, node: &NodeId, order: &mut Vec<NodeId>) {
        for child in &self.get(node).children {
            self.postorder_visit(child, order);
        }
        order.push(*node);
    }

    /// Nodes of the subtree rooted at `root`, breadth-first, `root` first.
    pub fn bfs_subtree(&self, root: &NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([*root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.get(&id).children.iter().copied());
        }
        order
    }

    // #######################################
    // # getting characteristics of the tree #
    // #######################################

    /// Is the tree binary (every node has at most 2 children, the root at
    /// most 3 if unrooted)?
    pub fn is_binary(&self) -> bool {
        self.iter_nodes().all(|node| {
            if node.parent.is_none() {
                node.children.len() <= 3
            } else {
                node.children.len() <= 2
            }
        })
    }

    /// Is the tree rooted (root has exactly two children)?
    pub fn is_rooted(&self) -> Result<bool, TreeError> {
        let root = self.get_root()?;
        Ok(self.get(&root).children.len() == 2)
    }

    /// Number of live nodes.
    pub fn size(&self) -> usize {
        self.nodes.iter().filter(|n| n.alive).count()
    }

    /// Number of live leaves.
    pub fn n_leaves(&self) -> usize {
        self.iter_nodes().filter(|n| n.is_tip()).count()
    }

    // ##########################
    // # Find paths in the tree #
    // ##########################

    /// Path from the root to `node`, root first.
    pub fn get_path_from_root(&self, node: &NodeId) -> Vec<NodeId> {
        let mut path = vec![*node];
        let mut current = *node;
        while let Some(parent) = self.get(&current).parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Most recent common ancestor of two nodes.
    pub fn get_common_ancestor(&self, source: &NodeId, target: &NodeId) -> NodeId {
        if source == target {
            return *source;
        }
        let root_to_source = self.get_path_from_root(source);
        let root_to_target = self.get_path_from_root(target);

        let cursor = root_to_source
            .iter()
            .zip(root_to_target.iter())
            .position(|(s, t)| s != t)
            .unwrap_or_else(|| root_to_source.len().min(root_to_target.len()));

        root_to_source[cursor - 1]
    }

    /// Sum of branch lengths on the unique path between two nodes. Fatal
    /// (`TreeError::MissingBranchLength`) if any branch on the path has no
    /// length (§4.1 failure semantics).
    pub fn get_distance(&self, source: &NodeId, target: &NodeId) -> Result<f64, TreeError> {
        if source == target {
            return Ok(0.0);
        }
        let root_to_source = self.get_path_from_root(source);
        let root_to_target = self.get_path_from_root(target);

        let cursor = root_to_source
            .iter()
            .zip(root_to_target.iter())
            .position(|(s, t)| s != t)
            .unwrap_or_else(|| root_to_source.len().min(root_to_target.len()));

        let mut dist = 0.0;
        for path in [&root_to_source, &root_to_target] {
            for node in path.iter().skip(cursor) {
                dist += self
                    .get(node)
                    .parent_edge
                    .ok_or(TreeError::MissingBranchLength(*node))?;
            }
        }
        Ok(dist)
    }

    /// Sum of branch lengths from the root to `node`.
    pub fn get_root_distance(&self, node: &NodeId) -> Result<f64, TreeError> {
        let mut dist = 0.0;
        for id in self.get_path_from_root(node).into_iter().skip(1) {
            dist += self
                .get(&id)
                .parent_edge
                .ok_or(TreeError::MissingBranchLength(id))?;
        }
        Ok(dist)
    }

    // ##################
    // # alter the tree #
    // ##################

    /// Rescale every branch length by `factor`.
    pub fn rescale(&mut self, factor: f64) {
        for node in self.nodes_mut() {
            node.rescale_edges(factor);
        }
    }

    /// Attach an already-existing node as a child of `parent`, setting its
    /// branch length. Unlike [`Tree::add_child`], `child` is not created
    /// here: used by clustering algorithms that join existing leaf/subtree
    /// roots together bottom-up.
    pub fn attach(&mut self, child: NodeId, parent: NodeId, edge: Option<Edge>) {
        let parent_depth = self.get(&parent).depth;
        self.get_mut(&child).parent = Some(parent);
        self.get_mut(&child).parent_edge = edge;
        self.get_mut(&child).depth = parent_depth + 1;
        self.get_mut(&parent).children.push(child);
    }

    /// Detach `id` from its parent and mark it dead. Works whether `id`
    /// was originally a leaf or an internal node that lost every child.
    fn detach_node(&mut self, leaf: &NodeId) {
        if let Some(parent) = self.get(leaf).parent {
            self.get_mut(&parent).children.retain(|id| id != leaf);
        }
        self.get_mut(leaf).delete();
    }

    /// Project the tree onto the leaf set `keep`: delete every leaf whose
    /// name is not in `keep`, then collapse degenerate (fewer than two
    /// children) internal nodes bottom-up, summing collapsed branch
    /// lengths into the surviving child, and finally collapse a
    /// single-child root. Preserves pairwise distances between retained
    /// leaves (§4.1).
    pub fn project(&mut self, keep: &HashSet<String>) {
        let root = match self.get_root() {
            Ok(root) => root,
            Err(_) => return,
        };

        // Decide retention from the *original* leaf set, before any
        // detaching: an internal node can end up with 0 children once its
        // descendants are pruned, which looks exactly like a tip to
        // `get_leaves()` and must not be confused with one here.
        let mut retained_tips: HashSet<NodeId> = HashSet::new();
        for leaf in self.get_leaves() {
            let retained = self
                .get(&leaf)
                .name
                .as_deref()
                .map(|name| keep.contains(name))
                .unwrap_or(false);
            if retained {
                retained_tips.insert(leaf);
            } else {
                self.detach_node(&leaf);
            }
        }

        self.collapse_degenerate(root, &retained_tips);
        self.collapse_single_child_root(root);
        self.recompute_depths();
    }

    /// Repeatedly collapse nodes with 0 or 1 remaining children, deepest
    /// first, until the tree is stable. A childless internal node (one not
    /// in `retained_tips`) is detached like a pruned leaf; a single-child
    /// node is spliced out, its branch length folded into the surviving
    /// child. Nodes in `retained_tips` are genuine tips and are never
    /// auto-detached here, even though they also have 0 children.
    fn collapse_degenerate(&mut self, root: NodeId, retained_tips: &HashSet<NodeId>) {
        loop {
            let mut order: Vec<NodeId> = self.iter_nodes().map(|n| n.id).collect();
            order.sort_by_key(|id| std::cmp::Reverse(self.get(id).depth));

            let mut changed = false;
            for id in order {
                if id == root || !self.get(&id).alive {
                    continue;
                }
                let n_children = self.get(&id).children.len();
                if n_children == 0 {
                    if retained_tips.contains(&id) {
                        continue;
                    }
                    // was internal, lost every leaf beneath it
                    self.detach_node(&id);
                    changed = true;
                } else if n_children == 1 {
                    self.splice_out(&id);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Remove `id` from the tree, reparenting its single child directly
    /// under `id`'s parent and summing the two branch lengths.
    fn splice_out(&mut self, id: &NodeId) {
        let parent = self.get(id).parent;
        let child = self.get(id).children[0];
        let folded_edge = match (self.get(id).parent_edge, self.get(&child).parent_edge) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        };

        self.get_mut(&child).parent = parent;
        self.get_mut(&child).parent_edge = folded_edge;

        if let Some(parent) = parent {
            let parent_children = &mut self.get_mut(&parent).children;
            if let Some(pos) = parent_children.iter().position(|c| c == id) {
                parent_children[pos] = child;
            }
        }
        self.get_mut(id).delete();
    }

    /// If the root has exactly one remaining child, that child becomes the
    /// new root.
    fn collapse_single_child_root(&mut self, root: NodeId) {
        if !self.get(&root).alive {
            return;
        }
        if self.get(&root).children.len() == 1 {
            let child = self.get(&root).children[0];
            self.get_mut(&child).parent = None;
            self.get_mut(&child).parent_edge = None;
            self.get_mut(&root).delete();
        }
    }

    /// Recompute every live node's `depth` field by a breadth-first walk
    /// from the root. Used after [`Tree::project`] reshapes the tree.
    fn recompute_depths(&mut self) {
        let root = match self.get_root() {
            Ok(root) => root,
            Err(_) => return,
        };
        let mut queue = VecDeque::from([(root, 0usize)]);
        while let Some((id, depth)) = queue.pop_front() {
            self.get_mut(&id).set_depth(depth);
            let children = self.get(&id).children.clone();
            for child in children {
                queue.push_back((child, depth + 1));
            }
        }
    }

    // ########################
    // # read and write trees #
    // ########################

    /// Render this tree as a Newick string (no trailing newline).
    pub fn to_newick(&self) -> Result<String, TreeError> {
        let root = self.get_root()?;
        Ok(newick::to_newick_impl(self, &root) + ";")
    }

    /// Parse a Newick string into a tree.
    pub fn from_newick(newick: &str) -> Result<Self, ParseError> {
        newick::parse(newick)
    }

    /// Parse a Newick file into a tree.
    pub fn from_file(path: &Path) -> Result<Self, ParseError> {
        newick::parse_file(path)
    }

    /// Write this tree to a Newick file.
    pub fn to_file(&self, path: &Path) -> Result<(), TreeError> {
        std::fs::write(path, self.to_newick()?)?;
        Ok(())
    }

    /// Build a "star tree": a single root with one child leaf per name in
    /// `taxa`, no branch lengths (non-phylogenetic mode uses a uniform
    /// branch weight of 1.0 regardless of the tree's own edges; see
    /// `vectorizer`).
    pub fn star(taxa: &[String]) -> Self {
        let mut tree = Tree::new();
        let root = tree.add(Node::new());
        for name in taxa {
            tree.add_child(Node::new_named(name), root, None)
                .expect("root always exists immediately after creation");
        }
        tree
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_simple_tree() -> Tree {
        // Tree traversal wikipedia example, adapted so every node has at
        // most two children.
        let mut tree = Tree::new();
        tree.add(Node::new_named("F")); // 0
        tree.add_child(Node::new_named("B"), 0, None).unwrap(); // 1
        tree.add_child(Node::new_named("G"), 0, None).unwrap(); // 2
        tree.add_child(Node::new_named("A"), 1, None).unwrap(); // 3
        tree.add_child(Node::new_named("D"), 1, None).unwrap(); // 4
        tree.add_child(Node::new_named("I"), 2, None).unwrap(); // 5
        tree.add_child(Node::new_named("C"), 4, None).unwrap(); // 6
        tree.add_child(Node::new_named("E"), 4, None).unwrap(); // 7
        tree.add_child(Node::new_named("H"), 5, None).unwrap(); // 8
        tree
    }

    fn build_tree_with_lengths() -> Tree {
        let mut tree = Tree::new();
        tree.add(Node::new_named("F")); // 0
        tree.add_child(Node::new_named("A"), 0, Some(0.1)).unwrap(); // 1
        tree.add_child(Node::new_named("B"), 0, Some(0.2)).unwrap(); // 2
        tree.add_child(Node::new_named("E"), 0, Some(0.5)).unwrap(); // 3
        tree.add_child(Node::new_named("C"), 3, Some(0.3)).unwrap(); // 4
        tree.add_child(Node::new_named("D"), 3, Some(0.4)).unwrap(); // 5
        tree
    }

    #[test]
    fn test_tips() {
        let mut tree = Tree::new();
        tree.add(Node::new_named("root"));
        assert_eq!(tree.get_leaves(), vec![0]);

        tree.add_child(Node::new_named("A"), 0, Some(0.1)).unwrap();
        tree.add_child(Node::new_named("B"), 0, Some(0.2)).unwrap();
        tree.add_child(Node::new_named("E"), 0, Some(0.5)).unwrap();
        assert_eq!(tree.get_leaves(), vec![1, 2, 3]);

        tree.add_child(Node::new_named("C"), 3, Some(0.3)).unwrap();
        tree.add_child(Node::new_named("D"), 3, Some(0.4)).unwrap();
        assert_eq!(tree.get_leaves(), vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_binary() {
        let mut tree = Tree::new();
        tree.add(Node::new_named("root"));
        tree.add_child(Node::new_named("0L"), 0, None).unwrap();
        tree.add_child(Node::new_named("0R"), 0, None).unwrap();
        assert!(tree.is_binary());

        tree.add_child(Node::new_named("1L"), 1, None).unwrap();
        tree.add_child(Node::new_named("1R"), 1, None).unwrap();
        assert!(tree.is_binary());

        tree.add_child(Node::new_named("3?"), 3, None).unwrap();
        tree.add_child(Node::new_named("3?"), 3, None).unwrap();
        assert!(tree.is_binary());
        tree.add_child(Node::new_named("3??"), 3, None).unwrap();
        assert!(!tree.is_binary());
    }

    #[test]
    fn binary_from_newick() {
        let cases = vec![("(A,B,(C,D)E)F;", false), ("((D,E)B,(F,G)C)A;", true)];
        for (newick, expected) in cases {
            assert_eq!(Tree::from_newick(newick).unwrap().is_binary(), expected);
        }
    }

    #[test]
    fn path_from_root() {
        let tree = build_simple_tree();
        let values: Vec<_> = tree
            .get_path_from_root(&7)
            .into_iter()
            .map(|id| tree.get(&id).name.clone().unwrap())
            .collect();
        assert_eq!(values, vec!["F", "B", "D", "E"]);
    }

    #[test]
    fn last_common_ancestor() {
        let cases = vec![(3, 7, 1), (6, 8, 0), (3, 3, 3), (8, 5, 5), (4, 7, 4)];
        let tree = build_simple_tree();
        for (source, target, ancestor) in cases {
            assert_eq!(ancestor, tree.get_common_ancestor(&source, &target));
        }
    }

    #[test]
    fn get_distances_lengths() {
        let cases = vec![
            (1, 3, 0.6),
            (1, 4, 0.9),
            (4, 5, 0.7),
            (5, 2, 1.1),
            (2, 5, 1.1),
            (0, 2, 0.2),
            (1, 1, 0.0),
        ];
        let tree = build_tree_with_lengths();
        for (source, target, expected) in cases {
            let dist = tree.get_distance(&source, &target).unwrap();
            assert!((dist - expected).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn missing_branch_length_is_fatal() {
        let tree = Tree::from_newick("(A,B);").unwrap();
        let a = tree.get_by_name("A").unwrap().id;
        let b = tree.get_by_name("B").unwrap().id;
        // Newick parsing defaults missing lengths to 0.0 (§6), so this
        // should *not* error; exercise the fatal path directly instead.
        assert!(tree.get_distance(&a, &b).is_ok());

        let mut bare = Tree::new();
        let root = bare.add(Node::new());
        let leaf = bare.add_child(Node::new_named("x"), root, None).unwrap();
        assert!(bare.get_distance(&root, &leaf).is_err());
    }

    #[test]
    fn to_newick_roundtrip() {
        let tree = build_tree_with_lengths();
        assert_eq!("(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;", tree.to_newick().unwrap());
    }

    #[test]
    fn read_newick_roundtrip() {
        let newick_strings = vec![
            "((D,E)B,(F,G)C)A;",
            "(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;",
            "(A,B,(C,D));",
            "(A,B,(C,D)E)F;",
            "(\"hungarian dog\":20,(\"indian elephant\":30,\"swedish horse\":60):20):50;",
        ];
        for newick in newick_strings {
            let tree = Tree::from_newick(newick).unwrap();
            assert_eq!(newick, tree.to_newick().unwrap());
        }
    }

    #[test]
    fn project_preserves_distances() {
        let tree = Tree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let a = tree.get_by_name("A").unwrap().id;
        let d = tree.get_by_name("D").unwrap().id;
        let orig_ad = tree.get_distance(&a, &d).unwrap();

        let mut projected = tree.clone();
        let keep: HashSet<String> = ["A", "B", "D"].iter().map(|s| s.to_string()).collect();
        projected.project(&keep);

        assert_eq!(projected.n_leaves(), 3);
        let a2 = projected.get_by_name("A").unwrap().id;
        let d2 = projected.get_by_name("D").unwrap().id;
        let new_ad = projected.get_distance(&a2, &d2).unwrap();
        assert!((orig_ad - new_ad).abs() < 1e-9);
    }

    #[test]
    fn project_collapses_single_child_root() {
        let tree = Tree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let mut projected = tree.clone();
        let keep: HashSet<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
        projected.project(&keep);
        assert_eq!(projected.n_leaves(), 2);
        let root = projected.get_root().unwrap();
        assert_eq!(projected.get(&root).children.len(), 2);
    }

    #[test]
    fn postorder_children_before_parent() {
        let tree = Tree::from_newick("((A,B)C,(D,E)F)G;").unwrap();
        let root = tree.get_root().unwrap();
        let order = tree.postorder_subtree(&root);
        let names: Vec<_> = order
            .iter()
            .map(|id| tree.get(id).name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["A", "B", "C", "D", "E", "F", "G"]);
    }

    #[test]
    fn bfs_root_first() {
        let tree = Tree::from_newick("((A,B)C,(D,E)F)G;").unwrap();
        let root = tree.get_root().unwrap();
        let order = tree.bfs_subtree(&root);
        let names: Vec<_> = order
            .iter()
            .map(|id| tree.get(id).name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["G", "C", "F", "A", "B", "D", "E"]);
    }

    #[test]
    fn star_tree_has_one_level() {
        let taxa = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let tree = Tree::star(&taxa);
        assert_eq!(tree.n_leaves(), 3);
        assert_eq!(tree.size(), 4);
    }
}
