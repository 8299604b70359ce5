//! The calculator catalogue (§4.4): the ~24 named dissimilarity measures a
//! [`crate::engine::Engine`] can evaluate over a pair of branch vectors.
//!
//! A [`Calculator`] is a plain tagged variant, not a trait object: every
//! measure is interpreted by the single [`Calculator::evaluate`] function
//! from a [`PairInputs`] bundle the engine assembles once per sample pair.
//! This keeps the set of measures closed and enumerable (see
//! [`Calculator::ALL`], which backs the `-l`/`list` CLI output) instead of
//! open to ad hoc trait implementations.

use accurate::sum::Sum2;
use accurate::traits::*;

use crate::error::ConfigError;
use crate::mrca;
use crate::tree::{NodeId, Tree};
use crate::vectorizer::BranchVector;

/// One of the catalogue's dissimilarity measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Calculator {
    /// Bray-Curtis dissimilarity.
    BrayCurtis,
    /// Canberra distance.
    Canberra,
    /// Chi-squared distance.
    ChiSquared,
    /// Coefficient of similarity (a.k.a. Marczewski-Steinhaus).
    CoefficientOfSimilarity,
    /// Complete tree distance (Lozupone & Knight's presence/absence UniFrac
    /// analogue over the whole tree).
    CompleteTree,
    /// Euclidean distance.
    Euclidean,
    /// Fst, from paired leaf-distance matrices.
    Fst,
    /// Gower distance.
    Gower,
    /// Hellinger distance.
    Hellinger,
    /// Kulczynski dissimilarity.
    Kulczynski,
    /// Lennon's CD measure.
    LennonCd,
    /// Lennon's LRG measure.
    LennonLrg,
    /// Manhattan (city-block) distance.
    Manhattan,
    /// Mean nearest neighbour distance.
    Mnnd,
    /// Mean pairwise distance.
    Mpd,
    /// Morisita-Horn dissimilarity.
    MorisitaHorn,
    /// Normalized weighted UniFrac.
    NormalizedWeightedUnifrac,
    /// Pearson correlation dissimilarity.
    Pearson,
    /// Rao's Hp diversity measure.
    RaosHp,
    /// Soergel distance.
    Soergel,
    /// Species profile distance.
    SpeciesProfile,
    /// Tamas coefficient.
    TamasCoefficient,
    /// Weighted correlation dissimilarity.
    WeightedCorrelation,
    /// Whittaker index of association.
    Whittaker,
    /// Yue-Clayton theta.
    YueClayton,
}

impl Calculator {
    /// Every calculator in the catalogue, in the order `-l` prints them.
    pub const ALL: &'static [Calculator] = &[
        Calculator::BrayCurtis,
        Calculator::Canberra,
        Calculator::ChiSquared,
        Calculator::CoefficientOfSimilarity,
        Calculator::CompleteTree,
        Calculator::Euclidean,
        Calculator::Fst,
        Calculator::Gower,
        Calculator::Hellinger,
        Calculator::Kulczynski,
        Calculator::LennonCd,
        Calculator::LennonLrg,
        Calculator::Manhattan,
        Calculator::Mnnd,
        Calculator::Mpd,
        Calculator::MorisitaHorn,
        Calculator::NormalizedWeightedUnifrac,
        Calculator::Pearson,
        Calculator::RaosHp,
        Calculator::Soergel,
        Calculator::SpeciesProfile,
        Calculator::TamasCoefficient,
        Calculator::WeightedCorrelation,
        Calculator::Whittaker,
        Calculator::YueClayton,
    ];

    /// This calculator's canonical (hyphenated, lowercase) name.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Calculator::BrayCurtis => "bray-curtis",
            Calculator::Canberra => "canberra",
            Calculator::ChiSquared => "chi-squared",
            Calculator::CoefficientOfSimilarity => "coefficient-of-similarity",
            Calculator::CompleteTree => "complete-tree",
            Calculator::Euclidean => "euclidean",
            Calculator::Fst => "fst",
            Calculator::Gower => "gower",
            Calculator::Hellinger => "hellinger",
            Calculator::Kulczynski => "kulczynski",
            Calculator::LennonCd => "lennon-cd",
            Calculator::LennonLrg => "lennon-lrg",
            Calculator::Manhattan => "manhattan",
            Calculator::Mnnd => "mnnd",
            Calculator::Mpd => "mpd",
            Calculator::MorisitaHorn => "morisita-horn",
            Calculator::NormalizedWeightedUnifrac => "normalized-weighted-unifrac",
            Calculator::Pearson => "pearson",
            Calculator::RaosHp => "raos-hp",
            Calculator::Soergel => "soergel",
            Calculator::SpeciesProfile => "species-profile",
            Calculator::TamasCoefficient => "tamas-coefficient",
            Calculator::WeightedCorrelation => "weighted-correlation",
            Calculator::Whittaker => "whittaker",
            Calculator::YueClayton => "yue-clayton",
        }
    }

    /// Alternate names this calculator is also recognized under.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Calculator::CoefficientOfSimilarity => &["marczewski-steinhaus", "cs"],
            Calculator::CompleteTree => &["unweighted-unifrac", "presence-absence-unifrac"],
            Calculator::NormalizedWeightedUnifrac => &["nwu", "weighted-unifrac-normalized"],
            Calculator::RaosHp => &["rao", "raos-hp-prime"],
            Calculator::Mnnd => &["mean-nearest-neighbour-distance"],
            Calculator::Mpd => &["mean-pairwise-distance"],
            _ => &[],
        }
    }

    /// Can this calculator be run in unweighted mode (binary presence/
    /// absence vectors)? If not, `Open` rejects `weighted: false` for it.
    pub fn supports_unweighted(&self) -> bool {
        !matches!(
            self,
            Calculator::ChiSquared
                | Calculator::CompleteTree
                | Calculator::Hellinger
                | Calculator::LennonLrg
                | Calculator::MorisitaHorn
                | Calculator::NormalizedWeightedUnifrac
                | Calculator::RaosHp
                | Calculator::SpeciesProfile
                | Calculator::Whittaker
        )
    }

    /// Precomputed summaries this calculator reads out of [`PairInputs`].
    pub fn required(&self) -> RequiredSummaries {
        match self {
            Calculator::ChiSquared => RequiredSummaries {
                col_sum: true,
                row_leaf_sum: true,
                ..Default::default()
            },
            Calculator::CompleteTree | Calculator::Gower | Calculator::TamasCoefficient => {
                RequiredSummaries {
                    col_extents: true,
                    ..Default::default()
                }
            }
            Calculator::Hellinger | Calculator::SpeciesProfile | Calculator::Whittaker => {
                RequiredSummaries {
                    row_leaf_sum: true,
                    ..Default::default()
                }
            }
            Calculator::Kulczynski | Calculator::MorisitaHorn | Calculator::Pearson => {
                RequiredSummaries {
                    weighted_row_sum: true,
                    ..Default::default()
                }
            }
            Calculator::WeightedCorrelation => RequiredSummaries {
                weighted_row_sum: true,
                total_branch_length: true,
                ..Default::default()
            },
            Calculator::Fst | Calculator::RaosHp => RequiredSummaries {
                paired_leaf_distances: true,
                ..Default::default()
            },
            Calculator::Mnnd => RequiredSummaries {
                leaf_set_min_distance: true,
                ..Default::default()
            },
            Calculator::Mpd => RequiredSummaries {
                leaf_set_distance: true,
                ..Default::default()
            },
            Calculator::NormalizedWeightedUnifrac => RequiredSummaries {
                leaf_set_root_distance: true,
                ..Default::default()
            },
            _ => RequiredSummaries::default(),
        }
    }

    /// Look a calculator up by canonical name or alias, case-insensitively.
    pub fn parse(name: &str) -> Result<Calculator, ConfigError> {
        let lower = name.to_lowercase();
        Calculator::ALL
            .iter()
            .find(|c| c.canonical_name() == lower || c.aliases().contains(&lower.as_str()))
            .copied()
            .ok_or_else(|| ConfigError::UnknownCalculator(name.to_string()))
    }

    /// Evaluate this calculator over one sample pair.
    pub fn evaluate(&self, ctx: &PairInputs) -> f64 {
        match self {
            Calculator::BrayCurtis => bray_curtis(ctx),
            Calculator::Canberra => canberra(ctx),
            Calculator::ChiSquared => chi_squared(ctx),
            Calculator::CoefficientOfSimilarity => coefficient_of_similarity(ctx),
            Calculator::CompleteTree => complete_tree(ctx),
            Calculator::Euclidean => euclidean(ctx),
            Calculator::Fst => fst(ctx),
            Calculator::Gower => gower(ctx),
            Calculator::Hellinger => hellinger(ctx),
            Calculator::Kulczynski => kulczynski(ctx),
            Calculator::LennonCd => lennon_cd(ctx),
            Calculator::LennonLrg => lennon_lrg(ctx),
            Calculator::Manhattan => manhattan(ctx),
            Calculator::Mnnd => mnnd(ctx),
            Calculator::Mpd => mpd(ctx),
            Calculator::MorisitaHorn => morisita_horn(ctx),
            Calculator::NormalizedWeightedUnifrac => normalized_weighted_unifrac(ctx),
            Calculator::Pearson => pearson(ctx),
            Calculator::RaosHp => raos_hp(ctx),
            Calculator::Soergel => soergel(ctx),
            Calculator::SpeciesProfile => species_profile(ctx),
            Calculator::TamasCoefficient => tamas_coefficient(ctx),
            Calculator::WeightedCorrelation => weighted_correlation(ctx),
            Calculator::Whittaker => whittaker(ctx),
            Calculator::YueClayton => yue_clayton(ctx),
        }
    }
}

/// Which precomputed summaries a calculator needs from the engine, so
/// `Open` can build exactly those and no others (§4.3's "calculator
/// context").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequiredSummaries {
    /// Σₙ over all samples, per branch position (Chi-squared).
    pub col_sum: bool,
    /// Per-position min/max over all samples (Complete tree, Gower, Tamas).
    pub col_extents: bool,
    /// Rᵢ, each sample's raw total count (Chi-squared, Hellinger, Species
    /// profile, Whittaker).
    pub row_leaf_sum: bool,
    /// Wᵢ, each sample's weighted branch-vector sum (Kulczynski,
    /// Morisita-Horn, Pearson, Weighted correlation).
    pub weighted_row_sum: bool,
    /// L, the total branch length (Weighted correlation).
    pub total_branch_length: bool,
    /// dA/dB/dT paired leaf-distance sums (Fst, Rao's Hp).
    pub paired_leaf_distances: bool,
    /// Per-leaf nearest-neighbour distances (MNND).
    pub leaf_set_min_distance: bool,
    /// Full leaf-to-leaf distance matrix (MPD).
    pub leaf_set_distance: bool,
    /// Root-to-leaf distance sums (Normalized weighted UniFrac).
    pub leaf_set_root_distance: bool,
}

impl RequiredSummaries {
    /// Does this calculator need direct access to the tree and the raw
    /// (pre-MRCA) branch vectors, rather than just `a`/`b`/`weights`?
    pub fn needs_tree(&self) -> bool {
        self.paired_leaf_distances
            || self.leaf_set_min_distance
            || self.leaf_set_distance
            || self.leaf_set_root_distance
    }
}

/// Tree-level context for the five calculators that need leaf-to-leaf
/// phylogenetic distances rather than branch-position sums.
pub struct LeafPairContext<'a> {
    /// The bound tree.
    pub tree: &'a Tree,
    /// Non-root nodes in post-order (see [`crate::vectorizer::Vectorizer`]).
    pub postorder: &'a [NodeId],
    /// Sample i's branch vector, before any MRCA restriction.
    pub raw_b_i: &'a BranchVector,
    /// Sample j's branch vector, before any MRCA restriction.
    pub raw_b_j: &'a BranchVector,
    /// Is this calculator's unweighted variant in effect?
    pub weighted: bool,
}

/// Everything a [`Calculator::evaluate`] call needs for one sample pair.
/// `a`, `b` and `weights` have already had MRCA restriction / reweighting
/// applied by the engine, per §4.4's MRCA hooks.
pub struct PairInputs<'a> {
    /// Branch vector for sample i (post-MRCA).
    pub a: &'a [f64],
    /// Branch vector for sample j (post-MRCA).
    pub b: &'a [f64],
    /// Per-position branch weight (post-MRCA).
    pub weights: &'a [f64],
    /// Per-position sum over every sample in the table.
    pub col_sum: Option<&'a [f64]>,
    /// Per-position minimum over every sample in the table.
    pub col_min: Option<&'a [f64]>,
    /// Per-position maximum over every sample in the table.
    pub col_max: Option<&'a [f64]>,
    /// Rᵢ: sample i's raw total count.
    pub row_leaf_sum_i: f64,
    /// Rⱼ: sample j's raw total count.
    pub row_leaf_sum_j: f64,
    /// Wᵢ: sample i's weighted branch-vector sum.
    pub weighted_row_sum_i: f64,
    /// Wⱼ: sample j's weighted branch-vector sum.
    pub weighted_row_sum_j: f64,
    /// L: total branch length (sum of `weights` before any MRCA hook ran).
    pub total_branch_length: f64,
    /// Present only when [`RequiredSummaries::needs_tree`] is set for the
    /// calculator being evaluated.
    pub leaf_pair: Option<LeafPairContext<'a>>,
}

fn safe_div(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator != 0.0 {
        numerator / denominator
    } else {
        fallback
    }
}

fn bray_curtis(ctx: &PairInputs) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for ((&a, &b), &w) in ctx.a.iter().zip(ctx.b).zip(ctx.weights) {
        num += w * (a - b).abs();
        den += w * (a + b);
    }
    safe_div(num, den, 0.0)
}

fn canberra(ctx: &PairInputs) -> f64 {
    let mut sum = 0.0;
    for ((&a, &b), &w) in ctx.a.iter().zip(ctx.b).zip(ctx.weights) {
        if a + b > 0.0 {
            sum += w * (a - b).abs() / (a + b);
        }
    }
    sum
}

fn chi_squared(ctx: &PairInputs) -> f64 {
    let col_sum = ctx.col_sum.expect("chi-squared requires colSum");
    let mut sum = 0.0;
    let mut n = 0usize;
    for (((&a, &b), &w), &colsum_n) in ctx.a.iter().zip(ctx.b).zip(ctx.weights).zip(col_sum) {
        if colsum_n > 0.0 {
            let ra = a / ctx.row_leaf_sum_i;
            let rb = b / ctx.row_leaf_sum_j;
            sum += w * (ra - rb).powi(2);
            n += 1;
        }
    }
    safe_div(sum, n as f64, 0.0).sqrt()
}

fn coefficient_of_similarity(ctx: &PairInputs) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for ((&a, &b), &w) in ctx.a.iter().zip(ctx.b).zip(ctx.weights) {
        let max = a.max(b);
        if max > 0.0 {
            num += w * (a - b).abs();
            den += max;
        }
    }
    safe_div(num, den, 0.0)
}

fn complete_tree(ctx: &PairInputs) -> f64 {
    let col_min = ctx.col_min.expect("complete-tree requires colExtents");
    let col_max = ctx.col_max.expect("complete-tree requires colExtents");
    let mut num = 0.0;
    let mut den = 0.0;
    for (((&a, &b), &w), (&lo, &hi)) in ctx
        .a
        .iter()
        .zip(ctx.b)
        .zip(ctx.weights)
        .zip(col_min.iter().zip(col_max))
    {
        num += w * (a - b).abs();
        den += w * (hi - lo);
    }
    safe_div(num, den, 1.0)
}

fn euclidean(ctx: &PairInputs) -> f64 {
    ctx.a
        .iter()
        .zip(ctx.b)
        .zip(ctx.weights)
        .map(|((&a, &b), &w)| w * (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn fst_components(leaf_pair: &LeafPairContext) -> (f64, f64, f64) {
    let leaves_i = mrca::present_leaves(leaf_pair.tree, leaf_pair.postorder, leaf_pair.raw_b_i);
    let leaves_j = mrca::present_leaves(leaf_pair.tree, leaf_pair.postorder, leaf_pair.raw_b_j);
    let pooled: Vec<(NodeId, f64)> = mrca::pool_present_leaves(
        leaf_pair.tree,
        leaf_pair.postorder,
        leaf_pair.raw_b_i,
        leaf_pair.raw_b_j,
    )
    .into_iter()
    .map(|(id, pi, pj)| (id, pi + pj))
    .collect();

    let d_a = mrca::paired_leaf_set_distance(leaf_pair.tree, &leaves_i);
    let d_b = mrca::paired_leaf_set_distance(leaf_pair.tree, &leaves_j);
    let d_t = mrca::paired_leaf_set_distance(leaf_pair.tree, &pooled);
    (d_a, d_b, d_t)
}

fn fst(ctx: &PairInputs) -> f64 {
    let leaf_pair = ctx.leaf_pair.as_ref().expect("fst requires leaf distances");
    let (d_a, d_b, d_t) = fst_components(leaf_pair);
    safe_div(d_t - 0.5 * (d_a + d_b), d_t, 0.0)
}

fn raos_hp(ctx: &PairInputs) -> f64 {
    let leaf_pair = ctx
        .leaf_pair
        .as_ref()
        .expect("rao's hp requires leaf distances");
    let (d_a, d_b, d_t) = fst_components(leaf_pair);
    d_t - 0.5 * (d_a + d_b)
}

fn gower(ctx: &PairInputs) -> f64 {
    let col_min = ctx.col_min.expect("gower requires colExtents");
    let col_max = ctx.col_max.expect("gower requires colExtents");
    let mut sum = 0.0;
    for (((&a, &b), &w), (&lo, &hi)) in ctx
        .a
        .iter()
        .zip(ctx.b)
        .zip(ctx.weights)
        .zip(col_min.iter().zip(col_max))
    {
        let denom = hi - lo;
        if denom > 0.0 {
            sum += w * (a - b).abs() / denom;
        }
    }
    sum
}

fn hellinger(ctx: &PairInputs) -> f64 {
    ctx.a
        .iter()
        .zip(ctx.b)
        .zip(ctx.weights)
        .map(|((&a, &b), &w)| {
            let ra = (a / ctx.row_leaf_sum_i).sqrt();
            let rb = (b / ctx.row_leaf_sum_j).sqrt();
            w * (ra - rb).powi(2)
        })
        .sum::<f64>()
        .sqrt()
}

fn kulczynski(ctx: &PairInputs) -> f64 {
    let mut min_sum = 0.0;
    for ((&a, &b), &w) in ctx.a.iter().zip(ctx.b).zip(ctx.weights) {
        min_sum += w * a.min(b);
    }
    1.0 - 0.5
        * (safe_div(min_sum, ctx.weighted_row_sum_i, 0.0)
            + safe_div(min_sum, ctx.weighted_row_sum_j, 0.0))
}

fn lennon_components(ctx: &PairInputs) -> (f64, f64, f64) {
    let mut a_sum = 0.0;
    let mut b_sum = 0.0;
    let mut c_sum = 0.0;
    for ((&a, &b), &w) in ctx.a.iter().zip(ctx.b).zip(ctx.weights) {
        let max = a.max(b);
        a_sum += w * a.min(b);
        b_sum += w * (max - b);
        c_sum += w * (max - a);
    }
    (a_sum, b_sum, c_sum)
}

fn lennon_cd(ctx: &PairInputs) -> f64 {
    let (a_sum, b_sum, c_sum) = lennon_components(ctx);
    safe_div(b_sum.min(c_sum), b_sum.min(c_sum) + a_sum, 0.0)
}

fn lennon_lrg(ctx: &PairInputs) -> f64 {
    let (a_sum, b_sum, c_sum) = lennon_components(ctx);
    safe_div(2.0 * (b_sum - c_sum).abs(), 2.0 * a_sum + b_sum + c_sum, 0.0)
}

fn manhattan(ctx: &PairInputs) -> f64 {
    ctx.a
        .iter()
        .zip(ctx.b)
        .zip(ctx.weights)
        .map(|((&a, &b), &w)| w * (a - b).abs())
        .sum()
}

fn mnnd(ctx: &PairInputs) -> f64 {
    let leaf_pair = ctx.leaf_pair.as_ref().expect("mnnd requires leaf distances");
    let forward = mrca::leaf_set_min_distance(
        leaf_pair.tree,
        leaf_pair.postorder,
        leaf_pair.raw_b_i,
        leaf_pair.raw_b_j,
        leaf_pair.weighted,
    );
    let backward = mrca::leaf_set_min_distance(
        leaf_pair.tree,
        leaf_pair.postorder,
        leaf_pair.raw_b_j,
        leaf_pair.raw_b_i,
        leaf_pair.weighted,
    );
    0.5 * (forward + backward)
}

fn mpd(ctx: &PairInputs) -> f64 {
    let leaf_pair = ctx.leaf_pair.as_ref().expect("mpd requires leaf distances");
    let leaves_i = mrca::present_leaves(leaf_pair.tree, leaf_pair.postorder, leaf_pair.raw_b_i);
    let leaves_j = mrca::present_leaves(leaf_pair.tree, leaf_pair.postorder, leaf_pair.raw_b_j);
    mrca::leaf_set_mean_distance(leaf_pair.tree, &leaves_i, &leaves_j)
}

fn morisita_horn(ctx: &PairInputs) -> f64 {
    let mut wab = 0.0;
    let mut wa2 = 0.0;
    let mut wb2 = 0.0;
    for ((&a, &b), &w) in ctx.a.iter().zip(ctx.b).zip(ctx.weights) {
        wab += w * a * b;
        wa2 += w * a * a;
        wb2 += w * b * b;
    }
    let wi = ctx.weighted_row_sum_i;
    let wj = ctx.weighted_row_sum_j;
    let denom = (safe_div(wa2, wi * wi, 0.0) + safe_div(wb2, wj * wj, 0.0)) * wi * wj;
    1.0 - safe_div(2.0 * wab, denom, 0.0)
}

fn normalized_weighted_unifrac(ctx: &PairInputs) -> f64 {
    let leaf_pair = ctx
        .leaf_pair
        .as_ref()
        .expect("normalized weighted unifrac requires leaf distances");
    let (root_i, root_j) = mrca::leaf_set_root_distance(
        leaf_pair.tree,
        leaf_pair.postorder,
        leaf_pair.raw_b_i,
        leaf_pair.raw_b_j,
    );
    let num: f64 = ctx
        .a
        .iter()
        .zip(ctx.b)
        .zip(ctx.weights)
        .map(|((&a, &b), &w)| w * (a - b).abs())
        .sum();
    safe_div(num, root_i + root_j, 0.0)
}

fn pearson(ctx: &PairInputs) -> f64 {
    let n = ctx.a.len() as f64;
    let mean_a = ctx.weighted_row_sum_i / n;
    let mean_b = ctx.weighted_row_sum_j / n;

    let terms: Vec<(f64, f64, f64)> = ctx
        .a
        .iter()
        .zip(ctx.b)
        .zip(ctx.weights)
        .map(|((&a, &b), &w)| {
            let x = a * w - mean_a;
            let y = b * w - mean_b;
            (x * y, x * x, y * y)
        })
        .collect();

    // Compensated summation: the number of terms tracks tree size and can
    // run into the thousands, where naive accumulation starts losing bits.
    let sum_xy: f64 = terms.iter().map(|t| t.0).sum_with_accumulator::<Sum2<f64>>();
    let sum_xx: f64 = terms.iter().map(|t| t.1).sum_with_accumulator::<Sum2<f64>>();
    let sum_yy: f64 = terms.iter().map(|t| t.2).sum_with_accumulator::<Sum2<f64>>();

    let denom = (sum_xx * sum_yy).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    1.0 - sum_xy / denom
}

fn soergel(ctx: &PairInputs) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for ((&a, &b), &w) in ctx.a.iter().zip(ctx.b).zip(ctx.weights) {
        num += w * (a - b).abs();
        den += w * a.max(b);
    }
    safe_div(num, den, 0.0)
}

fn species_profile(ctx: &PairInputs) -> f64 {
    ctx.a
        .iter()
        .zip(ctx.b)
        .zip(ctx.weights)
        .map(|((&a, &b), &w)| {
            let ra = a / ctx.row_leaf_sum_i;
            let rb = b / ctx.row_leaf_sum_j;
            w * (ra - rb).powi(2)
        })
        .sum::<f64>()
        .sqrt()
}

fn tamas_coefficient(ctx: &PairInputs) -> f64 {
    let col_max = ctx.col_max.expect("tamas coefficient requires colExtents");
    let mut num = 0.0;
    let mut den = 0.0;
    for (((&a, &b), &w), &max_n) in ctx.a.iter().zip(ctx.b).zip(ctx.weights).zip(col_max) {
        num += w * (a - b).abs();
        den += w * max_n;
    }
    safe_div(num, den, 0.0)
}

fn weighted_correlation(ctx: &PairInputs) -> f64 {
    let l = ctx.total_branch_length;
    let mean_a = ctx.weighted_row_sum_i / l;
    let mean_b = ctx.weighted_row_sum_j / l;

    let terms: Vec<(f64, f64, f64)> = ctx
        .a
        .iter()
        .zip(ctx.b)
        .zip(ctx.weights)
        .map(|((&a, &b), &w)| {
            let wl = w / l;
            (
                wl * (a - mean_a) * (b - mean_b),
                wl * (a - mean_a).powi(2),
                wl * (b - mean_b).powi(2),
            )
        })
        .collect();

    let cov_xy: f64 = terms.iter().map(|t| t.0).sum_with_accumulator::<Sum2<f64>>();
    let cov_x: f64 = terms.iter().map(|t| t.1).sum_with_accumulator::<Sum2<f64>>();
    let cov_y: f64 = terms.iter().map(|t| t.2).sum_with_accumulator::<Sum2<f64>>();

    let denom = (cov_x * cov_y).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    1.0 - cov_xy / denom
}

fn whittaker(ctx: &PairInputs) -> f64 {
    0.5 * ctx
        .a
        .iter()
        .zip(ctx.b)
        .zip(ctx.weights)
        .map(|((&a, &b), &w)| {
            w * (a / ctx.row_leaf_sum_i - b / ctx.row_leaf_sum_j).abs()
        })
        .sum::<f64>()
}

fn yue_clayton(ctx: &PairInputs) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for ((&a, &b), &w) in ctx.a.iter().zip(ctx.b).zip(ctx.weights) {
        num += w * a * b;
        den += w * ((a - b).powi(2) + a * b);
    }
    1.0 - safe_div(num, den, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_ctx<'a>(a: &'a [f64], b: &'a [f64], weights: &'a [f64]) -> PairInputs<'a> {
        let row_leaf_sum_i: f64 = a.iter().sum();
        let row_leaf_sum_j: f64 = b.iter().sum();
        let weighted_row_sum_i: f64 = a.iter().zip(weights).map(|(v, w)| v * w).sum();
        let weighted_row_sum_j: f64 = b.iter().zip(weights).map(|(v, w)| v * w).sum();
        let total_branch_length: f64 = weights.iter().sum();
        PairInputs {
            a,
            b,
            weights,
            col_sum: None,
            col_min: None,
            col_max: None,
            row_leaf_sum_i,
            row_leaf_sum_j,
            weighted_row_sum_i,
            weighted_row_sum_j,
            total_branch_length,
            leaf_pair: None,
        }
    }

    #[test]
    fn bray_curtis_scenario_a() {
        // S1={A:1}, S2={B:1}, S3={A:1,B:1} in presence space, unweighted.
        let w = [1.0, 1.0];
        let s1 = [1.0, 0.0];
        let s2 = [0.0, 1.0];
        let s3 = [1.0, 1.0];

        let d21 = bray_curtis(&simple_ctx(&s2, &s1, &w));
        assert!((d21 - 1.0).abs() < 1e-9);

        let d31 = bray_curtis(&simple_ctx(&s3, &s1, &w));
        assert!((d31 - 0.5).abs() < 1e-9);

        let d32 = bray_curtis(&simple_ctx(&s3, &s2, &w));
        assert!((d32 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn soergel_scenario_b() {
        // S1={A:1}, S2={B:1}, S3={A:1,B:1} in presence space, unweighted,
        // over the three-taxon {A,B,C} table (C absent from every sample).
        let w = [1.0, 1.0, 1.0];
        let s1 = [1.0, 0.0, 0.0];
        let s2 = [0.0, 1.0, 0.0];
        let s3 = [1.0, 1.0, 0.0];

        let d21 = soergel(&simple_ctx(&s2, &s1, &w));
        assert!((d21 - 1.0).abs() < 1e-9);

        let d31 = soergel(&simple_ctx(&s3, &s1, &w));
        assert!((d31 - 0.5).abs() < 1e-9);

        let d32 = soergel(&simple_ctx(&s3, &s2, &w));
        assert!((d32 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn manhattan_is_symmetric_and_zero_for_identical_vectors() {
        let a = [1.0, 2.0, 3.0];
        let w = [1.0, 1.0, 1.0];
        assert_eq!(manhattan(&simple_ctx(&a, &a, &w)), 0.0);
    }

    #[test]
    fn euclidean_matches_hand_computation() {
        let a = [0.0, 3.0];
        let b = [4.0, 0.0];
        let w = [1.0, 1.0];
        let d = euclidean(&simple_ctx(&a, &b, &w));
        assert!((d - 5.0).abs() < 1e-9);
    }

    #[test]
    fn parse_is_case_insensitive_and_knows_aliases() {
        assert_eq!(Calculator::parse("Bray-Curtis").unwrap(), Calculator::BrayCurtis);
        assert_eq!(Calculator::parse("NWU").unwrap(), Calculator::NormalizedWeightedUnifrac);
        assert!(Calculator::parse("not-a-calculator").is_err());
    }

    #[test]
    fn unweighted_support_matches_catalogue() {
        assert!(!Calculator::ChiSquared.supports_unweighted());
        assert!(Calculator::BrayCurtis.supports_unweighted());
        assert!(Calculator::Fst.supports_unweighted());
    }

    #[test]
    fn yue_clayton_is_zero_for_identical_vectors() {
        let a = [1.0, 2.0];
        let w = [1.0, 1.0];
        let d = yue_clayton(&simple_ctx(&a, &a, &w));
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn fst_uses_leaf_distances_from_the_tree() {
        use crate::tree::Tree;
        use crate::vectorizer::Vectorizer;

        let mut tree = Tree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let taxa: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let vectorizer = Vectorizer::new(&mut tree, &taxa, true, true, false).unwrap();
        let postorder = vectorizer.postorder().to_vec();

        let counts_i = crate::sample_table::SampleCounts {
            counts: vec![1.0, 1.0, 0.0, 0.0],
            total: 2.0,
        };
        let counts_j = crate::sample_table::SampleCounts {
            counts: vec![0.0, 0.0, 1.0, 1.0],
            total: 2.0,
        };
        let raw_i = vectorizer.calculate(&tree, &counts_i, true, counts_i.total);
        let raw_j = vectorizer.calculate(&tree, &counts_j, true, counts_j.total);

        let weights = vectorizer.branch_weights(&tree).unwrap();
        let leaf_pair = LeafPairContext {
            tree: &tree,
            postorder: &postorder,
            raw_b_i: &raw_i,
            raw_b_j: &raw_j,
            weighted: true,
        };
        let ctx = PairInputs {
            a: &raw_i,
            b: &raw_j,
            weights: &weights,
            col_sum: None,
            col_min: None,
            col_max: None,
            row_leaf_sum_i: 2.0,
            row_leaf_sum_j: 2.0,
            weighted_row_sum_i: 0.0,
            weighted_row_sum_j: 0.0,
            total_branch_length: weights.iter().sum(),
            leaf_pair: Some(leaf_pair),
        };
        // Disjoint leaf sets with symmetric distances: dT should exceed the
        // within-group averages, putting Fst strictly between 0 and 1.
        let value = fst(&ctx);
        assert!(value > 0.0 && value <= 1.0);
    }
}
