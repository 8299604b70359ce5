//! Branch-length distributions for synthetic test trees ([`crate::tree_generation`]).

use clap::ValueEnum;
use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma, Uniform};

/// Named branch-length distribution, selectable from the `generate`
/// subcommand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Distr {
    /// Uniform over `[0, 1)`.
    Uniform,
    /// Exponential with rate 1.
    Exponential,
    /// Gamma with shape 2, scale 1.
    Gamma,
}

/// A bound sampler for one [`Distr`] variant.
pub enum Sampler {
    /// See [`Distr::Uniform`].
    Uniform(Uniform<f64>),
    /// See [`Distr::Exponential`].
    Exponential(Exp<f64>),
    /// See [`Distr::Gamma`].
    Gamma(Gamma<f64>),
}

impl Sampler {
    /// Build the sampler for a given distribution choice.
    pub fn new(distr: Distr) -> Self {
        match distr {
            Distr::Uniform => Sampler::Uniform(Uniform::new(0.0, 1.0)),
            Distr::Exponential => {
                Sampler::Exponential(Exp::new(1.0).expect("rate 1.0 is always valid"))
            }
            Distr::Gamma => {
                Sampler::Gamma(Gamma::new(2.0, 1.0).expect("shape/scale 2.0/1.0 are always valid"))
            }
        }
    }

    /// Draw one branch length.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        match self {
            Sampler::Uniform(d) => d.sample(rng),
            Sampler::Exponential(d) => d.sample(rng),
            Sampler::Gamma(d) => d.sample(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_samples_a_finite_nonnegative_value() {
        let mut rng = rand::thread_rng();
        for distr in [Distr::Uniform, Distr::Exponential, Distr::Gamma] {
            let sampler = Sampler::new(distr);
            let value = sampler.sample(&mut rng);
            assert!(value.is_finite());
            assert!(value >= 0.0);
        }
    }
}
