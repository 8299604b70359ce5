//! Error taxonomy for the β-diversity engine.
//!
//! Every fallible operation in this crate returns a [`BetaDivError`] drawn
//! from one of four kinds, mirroring the policy that configuration and
//! input-format problems must be reported before any output is produced,
//! data-consistency problems abort at `Open` time, and numeric fallbacks
//! (division by zero) are resolved locally per-calculator rather than
//! surfaced as errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::calculator::Calculator;
use crate::tree::NodeId;

/// Top level error type returned by the public API.
#[derive(Error, Debug)]
pub enum BetaDivError {
    /// Incompatible flag combination, unknown calculator, or a calculator
    /// invoked in a variant (weighted/unweighted) it does not support.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed Newick, unparseable numeric field, row/header mismatch or
    /// duplicate header taxon in an input file.
    #[error("input format error: {0}")]
    InputFormat(#[from] InputFormatError),

    /// A value referenced by one input does not exist in another (sample
    /// table taxon missing from the tree, leaf without a bound taxon index,
    /// a required branch length that is absent).
    #[error("data consistency error: {0}")]
    DataConsistency(#[from] DataConsistencyError),

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path of the file that could not be read or written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Configuration-kind failures (§7, `Config`).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The requested calculator has no variant matching the weighted flag.
    #[error("calculator {0:?} has no variant with weighted={1}")]
    UnsupportedVariant(Calculator, bool),

    /// `mrca` and `strict_mrca` were both requested; they are mutually
    /// exclusive.
    #[error("mrca and strict-mrca are mutually exclusive")]
    MrcaAndStrictMrca,

    /// An MRCA mode was requested without a phylogenetic tree.
    #[error("mrca restriction requires a phylogenetic tree")]
    MrcaRequiresTree,

    /// Normalized weighted UniFrac was requested together with an MRCA mode.
    #[error("normalized weighted unifrac cannot be combined with mrca or strict-mrca")]
    NwuWithMrca,

    /// `max_vecs` was not even, or did not allow for two non-empty
    /// half-blocks.
    #[error("max-data-vecs must be even and at least 2, got {0}")]
    OddMaxVecs(usize),

    /// No calculator matches the given name (canonical or alias).
    #[error("unknown calculator: {0}")]
    UnknownCalculator(String),

    /// Jackknife was requested with a zero replicate count or draw size.
    #[error("jackknife requires both a positive replicate count and draw size")]
    InvalidJackknife,
}

/// Input-format-kind failures (§7, `InputFormat`).
#[derive(Error, Debug)]
pub enum InputFormatError {
    /// A numeric field (branch length, taxon count) failed to parse.
    #[error("could not parse numeric value {value:?}: {source}")]
    Numeric {
        /// The offending text.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: std::num::ParseFloatError,
    },

    /// A branch-length field contained whitespace.
    #[error("whitespace is not allowed within a numeric field")]
    WhiteSpaceInNumber,

    /// A Newick string was missing a closing parenthesis.
    #[error("unclosed bracket in newick string")]
    UnclosedBracket,

    /// A Newick string did not end in `;`.
    #[error("newick string is missing a terminating semicolon")]
    NoClosingSemicolon,

    /// A `)` was encountered with no matching open subtree.
    #[error("parent node of subtree not found")]
    NoSubtreeParent,

    /// The sample table header listed the same taxon name twice.
    #[error("duplicate taxon name in sample table header: {0}")]
    DuplicateTaxon(String),

    /// A data row had a different number of fields than the header.
    #[error("row {row} has {found} columns, expected {expected}")]
    RowColumnMismatch {
        /// Zero-based row ordinal.
        row: usize,
        /// Number of columns found.
        found: usize,
        /// Number of columns the header declared.
        expected: usize,
    },

    /// The sample table had no header row.
    #[error("sample table is empty")]
    EmptyTable,
}

/// Data-consistency-kind failures (§7, `DataConsistency`).
#[derive(Error, Debug)]
pub enum DataConsistencyError {
    /// A taxon named in the sample table does not appear as a tree leaf.
    #[error("taxon {0:?} from the sample table is not a leaf of the tree")]
    TaxonNotInTree(String),

    /// A leaf node was never bound to a taxon index.
    #[error("leaf node {0} has no bound taxon index")]
    LeafWithoutTaxonIndex(NodeId),

    /// A branch length was required (e.g. to compute a phylogenetic
    /// distance) but is absent on a non-root node.
    #[error("node {0} has no branch length where one is required")]
    MissingBranchLength(NodeId),

    /// A distance matrix passed to clustering was not square, or was not
    /// symmetric to within tolerance.
    #[error("distance matrix is not a valid square symmetric matrix: {0}")]
    InvalidMatrix(String),

    /// The tree has no usable root (it is empty, or was corrupted by a
    /// prior operation).
    #[error("tree has no root: {0}")]
    InvalidTree(#[from] crate::tree::TreeError),
}

impl BetaDivError {
    /// Wrap an I/O error with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BetaDivError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<crate::tree::ParseError> for BetaDivError {
    fn from(error: crate::tree::ParseError) -> Self {
        use crate::tree::ParseError;
        match error {
            ParseError::WhiteSpaceInNumber => InputFormatError::WhiteSpaceInNumber.into(),
            ParseError::UnclosedBracket => InputFormatError::UnclosedBracket.into(),
            ParseError::NoClosingSemicolon => InputFormatError::NoClosingSemicolon.into(),
            ParseError::NoSubtreeParent => InputFormatError::NoSubtreeParent.into(),
            ParseError::FloatError(source) => InputFormatError::Numeric {
                value: String::new(),
                source,
            }
            .into(),
            ParseError::TreeError(source) => DataConsistencyError::InvalidTree(source).into(),
            ParseError::IoError(source) => BetaDivError::Io {
                path: PathBuf::new(),
                source,
            },
        }
    }
}
