#![warn(missing_docs)]

//! `betadiv` computes pairwise β-diversity (between-sample ecological
//! dissimilarity) over a collection of microbial community samples,
//! optionally incorporating a phylogenetic tree relating the observed taxa.
//!
//! Given a sample-by-taxon count table and, optionally, a rooted Newick tree
//! whose leaves are labeled with taxon names, this crate produces an N×N
//! symmetric dissimilarity matrix using any one of two dozen taxon-based and
//! phylogenetic measures, and can cluster the resulting matrix into a
//! hierarchical tree (UPGMA / single / complete linkage / neighbour
//! joining).
//!
//! # A note on implementation
//!
//! Recursive data structures can be a pain in Rust, so the tree here is
//! stored as a vector of nodes addressed by index rather than as a pointer
//! graph: a [`tree::NodeId`] is just an index into a [`tree::Tree`]'s arena.
//! This lets the tree model, the data vectorizer and the MRCA reducer stay
//! non-recursive structures while still implementing recursive-shaped
//! algorithms (traversal, projection, distance) on top of them.
//!
//! # Layout
//!
//! - [`tree`]: the rooted tree model — construction, Newick I/O, traversals,
//!   distances, and leaf-set projection.
//! - [`sample_table`]: streams one sample row at a time from a wide
//!   tab-separated count table, with jackknife resampling.
//! - [`vectorizer`]: turns one sample's counts into a *branch vector* over a
//!   bound tree.
//! - [`mrca`]: the most-recent-common-ancestor reducer used to restrict or
//!   reweight a pair of branch vectors.
//! - [`calculator`]: the catalogue of dissimilarity measures themselves.
//! - [`engine`]: binds a sample table, an optional tree, and a calculator,
//!   and drives the blocked pairwise evaluation.
//! - [`clustering`]: agglomerative linkage and neighbour joining over an
//!   arbitrary distance matrix.
//! - [`consensus`]: majority-rule consensus topology and jackknife support
//!   across a set of replicate clustering trees.
//! - [`correlator`]: compares calculators to each other by correlating their
//!   output matrices.
//! - [`matrix`]: the lower-triangular dissimilarity matrix type and its text
//!   format.
//! - [`error`]: the four-kind error taxonomy shared by every fallible
//!   operation in this crate.
//! - [`tree_generation`] / [`distr`]: synthetic random trees used by tests
//!   and benchmarks.
//!
//! # Computing a dissimilarity matrix
//!
//! ```
//! use std::io::Cursor;
//! use betadiv::calculator::Calculator;
//! use betadiv::engine::Engine;
//! use betadiv::sample_table::SampleTable;
//!
//! let data = "\tA\tB\tC\nS1\t1\t0\t0\nS2\t0\t1\t0\nS3\t1\t1\t0\n";
//! let table = SampleTable::from_reader(Cursor::new(data.as_bytes().to_vec())).unwrap();
//!
//! // No tree: taxa are compared over a star tree, unweighted Bray-Curtis
//! // (Sorensen dissimilarity in presence/absence space).
//! let engine = Engine::open(
//!     table,
//!     None,
//!     Calculator::BrayCurtis,
//!     4,     // max_vecs
//!     false, // weighted
//!     false, // mrca
//!     false, // strict_mrca
//!     true,  // use_counts
//!     false, // verbose
//! )
//! .unwrap();
//!
//! assert_eq!(engine.n_samples(), 3);
//! assert_eq!(engine.calculator(), Calculator::BrayCurtis);
//! ```
//!
//! # Reading and writing trees
//!
//! This library reads and writes trees encoded in the
//! [Newick](https://en.wikipedia.org/wiki/Newick_format) format:
//!
//! ```
//! use betadiv::tree::Tree;
//!
//! let newick_str = "((A:0.1,B:0.2)F:0.6,(C:0.3,D:0.4)E:0.5)G;";
//! let tree = Tree::from_newick(newick_str).unwrap();
//!
//! assert_eq!(tree.to_newick().unwrap(), newick_str);
//! assert_eq!(tree.n_leaves(), 4);
//! ```

pub mod calculator;
pub mod clustering;
pub mod consensus;
pub mod correlator;
pub mod distr;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod mrca;
pub mod sample_table;
pub mod tree;
pub mod tree_generation;
pub mod vectorizer;
