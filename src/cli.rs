//! Argument parsing for the `betadiv` binary.
//!
//! This is the external CLI collaborator of §6: it exists so the crate is
//! runnable end-to-end, plumbing flags into [`betadiv::engine`] and friends.
//! Its own internals are not part of the core's public contract.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use betadiv::clustering::ClusteringMethod;
use betadiv::distr::Distr;
use betadiv::tree_generation::TreeShape;

/// Pairwise phylogenetic and taxon-based beta-diversity for microbial
/// community samples.
#[derive(Debug, Parser)]
#[command(name = "betadiv", version, about)]
pub struct Args {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Log `info`/`debug` diagnostics to stderr as the run progresses.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute one dissimilarity matrix (and its clustering tree) for a
    /// single calculator.
    Dissimilarity {
        /// Tab-separated sample-by-taxon count table.
        #[arg(short, long)]
        table: PathBuf,
        /// Newick tree relating the taxa; omit for a non-phylogenetic
        /// (star-tree) run.
        #[arg(long)]
        tree: Option<PathBuf>,
        /// Calculator name or alias (see `betadiv list`).
        #[arg(short, long)]
        calculator: String,
        /// Prefix for the output `.diss`/`.nwk` files.
        #[arg(short, long)]
        output: String,
        /// Run the unweighted (presence/absence) variant instead of the
        /// weighted one.
        #[arg(long)]
        unweighted: bool,
        /// Restrict each pair to the minimal MRCA subtree before applying
        /// the calculator.
        #[arg(long, conflicts_with = "strict_mrca")]
        mrca: bool,
        /// Reweight branches by the MRCA depth without pruning (mutually
        /// exclusive with `--mrca`).
        #[arg(long = "strict-mrca", conflicts_with = "mrca")]
        strict_mrca: bool,
        /// Use raw counts instead of normalizing to per-sample proportions.
        #[arg(long = "use-counts")]
        use_counts: bool,
        /// Maximum number of sample vectors held in memory at once; must be
        /// even.
        #[arg(long = "max-data-vecs", default_value_t = 200)]
        max_vecs: usize,
        /// Clustering method applied to the resulting matrix.
        #[arg(long, value_enum, default_value = "average")]
        clustering: ClusteringMethod,
        /// Number of jackknife replicates (0 disables jackknifing). Each
        /// replicate writes its own `.r<n>.diss`/`.r<n>.nwk` pair, plus one
        /// `.consensus.nwk` annotated with per-clade jackknife support.
        #[arg(long = "jackknife-reps", default_value_t = 0)]
        jackknife_reps: usize,
        /// Draw size for each jackknife replicate.
        #[arg(long = "draws", default_value_t = 0)]
        draw_size: usize,
    },

    /// Run every applicable calculator over the same inputs and report how
    /// similar the measures are to each other.
    All {
        /// Tab-separated sample-by-taxon count table.
        #[arg(short, long)]
        table: PathBuf,
        /// Newick tree relating the taxa; omit for a non-phylogenetic run.
        #[arg(long)]
        tree: Option<PathBuf>,
        /// Prefix for the per-calculator `.diss` files and the
        /// `.groups.txt`/`.calculators.nwk` summary.
        #[arg(short, long)]
        output: String,
        /// Cut the calculator cluster tree at `1 - threshold`.
        #[arg(long, default_value_t = 0.8)]
        threshold: f64,
        /// Clustering method applied to each calculator's own matrix.
        #[arg(long, value_enum, default_value = "average")]
        clustering: ClusteringMethod,
        /// Maximum number of sample vectors held in memory at once.
        #[arg(long = "max-data-vecs", default_value_t = 200)]
        max_vecs: usize,
        /// Restrict each pair to the minimal MRCA subtree.
        #[arg(long, conflicts_with = "strict_mrca")]
        mrca: bool,
        /// Reweight branches by the MRCA depth without pruning.
        #[arg(long = "strict-mrca", conflicts_with = "mrca")]
        strict_mrca: bool,
        /// Use raw counts instead of per-sample proportions.
        #[arg(long = "use-counts")]
        use_counts: bool,
    },

    /// List every recognized calculator name, with its aliases.
    List,

    /// Cluster an existing dissimilarity matrix file (the small
    /// hierarchical-clustering stand-alone driver of §1).
    Cluster {
        /// A §6-formatted dissimilarity matrix file.
        #[arg(short, long)]
        matrix: PathBuf,
        /// Clustering method to apply.
        #[arg(long, value_enum, default_value = "average")]
        method: ClusteringMethod,
        /// Output Newick path.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Prune a Newick tree down to a given leaf set (the tree-projection
    /// tool of §1).
    Project {
        /// Input Newick tree.
        #[arg(short, long)]
        tree: PathBuf,
        /// File listing leaf names to keep, one per line.
        #[arg(short, long)]
        keep: PathBuf,
        /// Output Newick path.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Generate one or more random trees, for building fixtures without a
    /// real phylogeny on hand.
    Generate {
        /// Number of leaves (tips).
        #[arg(long, default_value_t = 10)]
        tips: usize,
        /// Topology to sample.
        #[arg(long, value_enum, default_value = "yule")]
        shape: TreeShape,
        /// Draw branch lengths (otherwise every edge is unlabeled).
        #[arg(long = "branch-lengths")]
        branch_lengths: bool,
        /// Branch-length distribution, when `--branch-lengths` is set.
        #[arg(long, value_enum, default_value = "uniform")]
        distribution: Distr,
        /// Output path (a file for a single tree, a directory when
        /// `--trees` is given).
        #[arg(short, long)]
        output: PathBuf,
        /// Generate this many independent trees into `output` as a
        /// directory instead of a single file.
        #[arg(long)]
        trees: Option<usize>,
    },

    /// Print a shell completion script for this binary to stdout.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}
