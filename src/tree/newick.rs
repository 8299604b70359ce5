//! Newick reader (and the writer half of [`Tree::to_newick`](super::Tree::to_newick)).
//!
//! Grounded on the teacher's own `Tree::from_newick`/`to_newick`: a small
//! character-at-a-time state machine tracking which field (name, branch
//! length, bracket comment) is currently being accumulated, plus a stack of
//! "parent" node ids for the currently open subtrees. `[ ]` comments are
//! stripped from names and attached to the node they follow; branch lengths
//! missing on a non-root node are a warning (§6) rather than a parse
//! failure, and default to zero.

use std::fs;
use std::path::Path;

use thiserror::Error;

use super::node::Node;
use super::tree::{Tree, TreeError};
use super::NodeId;

/// Failures while parsing or loading a Newick string/file.
#[derive(Error, Debug)]
pub enum ParseError {
    /// A branch-length field contained whitespace.
    #[error("cannot have whitespace in a branch length field")]
    WhiteSpaceInNumber,
    /// A `(` was never matched by a `)`.
    #[error("missing a closing bracket")]
    UnclosedBracket,
    /// The string did not end with `;`.
    #[error("the tree is missing a semicolon at the end")]
    NoClosingSemicolon,
    /// Building the tree arena failed.
    #[error("problem building the tree: {0}")]
    TreeError(#[from] TreeError),
    /// A branch length did not parse as a float.
    #[error("could not parse a branch length: {0}")]
    FloatError(#[from] std::num::ParseFloatError),
    /// A `)` was encountered without an open subtree to close.
    #[error("parent node of subtree not found")]
    NoSubtreeParent,
    /// Reading the newick file failed.
    #[error("problem reading file: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, PartialEq)]
enum Field {
    Name,
    Length,
    Comment,
}

/// Parse a Newick string into a [`Tree`].
pub fn parse(newick: &str) -> Result<Tree, ParseError> {
    let mut tree = Tree::new();

    let mut parsing = Field::Name;
    let mut current_name: Option<String> = None;
    let mut current_length: Option<String> = None;
    let mut current_comment: Option<String> = None;
    let mut current_index: Option<NodeId> = None;
    let mut parent_stack: Vec<NodeId> = Vec::new();

    let mut open_delimiters = Vec::new();
    let mut within_quotes = false;

    for c in newick.chars() {
        if within_quotes && parsing == Field::Name && c != '"' {
            current_name.get_or_insert_with(String::new).push(c);
            continue;
        }

        if parsing == Field::Comment && c != ']' {
            current_comment.get_or_insert_with(String::new).push(c);
            continue;
        }

        match c {
            '"' => {
                within_quotes = !within_quotes;
                if parsing == Field::Name {
                    current_name.get_or_insert_with(String::new).push(c);
                }
            }
            '[' => {
                parsing = Field::Comment;
            }
            ']' => {
                parsing = Field::Name;
            }
            '(' => {
                match parent_stack.last() {
                    None => parent_stack.push(tree.add(Node::new())),
                    Some(parent) => parent_stack.push(tree.add_child(Node::new(), *parent, None)?),
                };
                open_delimiters.push(0);
            }
            ':' => {
                parsing = Field::Length;
            }
            ',' => {
                finish_node(
                    &mut tree,
                    &parent_stack,
                    &mut current_index,
                    &mut current_name,
                    &mut current_length,
                    &mut current_comment,
                )?;
                parsing = Field::Name;
            }
            ')' => {
                open_delimiters.pop();
                finish_node(
                    &mut tree,
                    &parent_stack,
                    &mut current_index,
                    &mut current_name,
                    &mut current_length,
                    &mut current_comment,
                )?;
                parsing = Field::Name;

                match parent_stack.pop() {
                    Some(parent) => current_index = Some(parent),
                    None => return Err(ParseError::NoSubtreeParent),
                }
            }
            ';' => {
                if !open_delimiters.is_empty() {
                    return Err(ParseError::UnclosedBracket);
                }
                let idx = current_index.ok_or(ParseError::NoSubtreeParent)?;
                {
                    let node = tree.get_mut(&idx);
                    node.name = current_name.take();
                    node.comment = current_comment.take();
                    if let Some(length) = current_length.take() {
                        node.parent_edge = Some(length.parse()?);
                    }
                }
                default_missing_branch_lengths(&mut tree);
                return Ok(tree);
            }
            _ => match parsing {
                Field::Name => current_name.get_or_insert_with(String::new).push(c),
                Field::Length => {
                    if c.is_whitespace() {
                        return Err(ParseError::WhiteSpaceInNumber);
                    }
                    current_length.get_or_insert_with(String::new).push(c);
                }
                Field::Comment => unreachable!("comment characters are consumed above"),
            },
        }
    }

    Err(ParseError::NoClosingSemicolon)
}

/// Close out the node at `current_index` (creating it as a child of the
/// current open subtree if it has no explicit name/length of its own yet),
/// assigning the accumulated name/length/comment fields and clearing them.
#[allow(clippy::too_many_arguments)]
fn finish_node(
    tree: &mut Tree,
    parent_stack: &[NodeId],
    current_index: &mut Option<NodeId>,
    current_name: &mut Option<String>,
    current_length: &mut Option<String>,
    current_comment: &mut Option<String>,
) -> Result<(), ParseError> {
    let idx = match current_index.take() {
        Some(idx) => idx,
        None => {
            let parent = *parent_stack.last().ok_or(ParseError::NoSubtreeParent)?;
            tree.add_child(Node::new(), parent, None)?
        }
    };

    let edge = match current_length.take() {
        Some(length) => Some(length.parse::<f64>()?),
        None => None,
    };

    let node = tree.get_mut(&idx);
    if let Some(name) = current_name.take() {
        node.set_name(name);
    }
    node.comment = current_comment.take();
    if let Some(parent) = node.parent {
        node.set_parent(parent, edge);
    }

    Ok(())
}

/// §6: a missing branch length on a non-root node is a warning, defaulted
/// to zero rather than left as `None`.
fn default_missing_branch_lengths(tree: &mut Tree) {
    let root = tree.get_root().ok();
    for node in tree.nodes_mut() {
        if Some(node.id) == root {
            continue;
        }
        if node.parent.is_some() && node.parent_edge.is_none() {
            log::warn!(
                "node {} ({:?}) has no branch length, defaulting to 0.0",
                node.id,
                node.name
            );
            node.parent_edge = Some(0.0);
        }
    }
}

/// Read a Newick file into a [`Tree`].
pub fn parse_file(path: &Path) -> Result<Tree, ParseError> {
    let newick_string = fs::read_to_string(path)?;
    parse(&newick_string)
}

/// Render `root`'s subtree (inclusive) as a Newick fragment, without the
/// trailing semicolon.
pub fn to_newick_impl(tree: &Tree, root: &NodeId) -> String {
    let node = tree.get(root);
    if node.children.is_empty() {
        node.to_newick()
    } else {
        let children = node
            .children
            .iter()
            .map(|child| to_newick_impl(tree, child))
            .collect::<Vec<_>>()
            .join(",");
        format!("({children}){node_repr}", node_repr = node.to_newick())
    }
}
