//! Variation operators and their name registry.
//!
//! Operators are looked up by name in static tables, case-insensitively. A name
//! missing from the table, or a boundary mode outside [`BoundaryMode`], is a
//! configuration error raised before the run starts.

use crate::config::{CrossoverConfig, MutationConfig};
use crate::error::{EliteError, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a gene pushed outside its domain is brought back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// Clamp to the violated bound.
    Saturation,
    /// Reflect off the violated bound.
    Bounce,
    /// Wrap around to the opposite bound.
    Toroidal,
}

impl FromStr for BoundaryMode {
    type Err = EliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "saturation" => Ok(BoundaryMode::Saturation),
            "bounce" => Ok(BoundaryMode::Bounce),
            "toroidal" => Ok(BoundaryMode::Toroidal),
            other => Err(EliteError::Configuration(format!(
                "boundary mode {other:?} is not one of saturation, bounce, toroidal"
            ))),
        }
    }
}

impl BoundaryMode {
    /// Maps `x` back into `[lo, hi]`.
    pub fn apply(self, x: f64, lo: f64, hi: f64) -> f64 {
        if (lo..=hi).contains(&x) {
            return x;
        }
        let width = hi - lo;
        if width <= 0.0 {
            return lo;
        }
        match self {
            BoundaryMode::Saturation => x.clamp(lo, hi),
            BoundaryMode::Bounce => {
                let t = (x - lo).rem_euclid(2.0 * width);
                lo + if t > width { 2.0 * width - t } else { t }
            }
            BoundaryMode::Toroidal => lo + (x - lo).rem_euclid(width),
        }
    }
}

/// Gaussian perturbation of each gene with probability `indpb`.
#[derive(Debug, Clone)]
pub struct GaussianMutation {
    noise: Normal<f64>,
    indpb: f64,
    boundary: BoundaryMode,
    domain: Vec<(f64, f64)>,
}

/// Independent per-gene swap between two parents with probability `indpb`.
#[derive(Debug, Clone)]
pub struct UniformCrossover {
    indpb: f64,
}

#[derive(Debug, Clone)]
pub enum Mutation {
    Gaussian(GaussianMutation),
}

#[derive(Debug, Clone)]
pub enum Crossover {
    Uniform(UniformCrossover),
}

type MutationBuilder = fn(&MutationConfig, &[(f64, f64)]) -> Result<Mutation>;
type CrossoverBuilder = fn(&CrossoverConfig) -> Result<Crossover>;

const MUTATIONS: &[(&str, MutationBuilder)] = &[("gaussian", build_gaussian)];
const CROSSOVERS: &[(&str, CrossoverBuilder)] = &[("uniform", build_uniform)];

pub fn mutation_names() -> Vec<&'static str> {
    MUTATIONS.iter().map(|(n, _)| *n).collect()
}

pub fn crossover_names() -> Vec<&'static str> {
    CROSSOVERS.iter().map(|(n, _)| *n).collect()
}

fn lookup<T: Copy>(table: &[(&'static str, T)], name: &str, what: &str) -> Result<T> {
    let wanted = name.to_ascii_lowercase();
    table
        .iter()
        .find(|(n, _)| *n == wanted)
        .map(|(_, b)| *b)
        .ok_or_else(|| {
            let known: Vec<&str> = table.iter().map(|(n, _)| *n).collect();
            EliteError::Configuration(format!(
                "{what} operator {name:?} is not implemented, known: {known:?}"
            ))
        })
}

fn probability(name: &str, p: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(EliteError::Configuration(format!(
            "{name} must be a probability in [0, 1], got {p}"
        )))
    }
}

fn build_gaussian(config: &MutationConfig, domain: &[(f64, f64)]) -> Result<Mutation> {
    let indpb = probability("mutation indpb", config.indpb)?;
    let boundary: BoundaryMode = config.boundary.parse()?;
    if !config.mu.is_finite() {
        return Err(EliteError::Configuration(format!(
            "mutation mu must be finite, got {}",
            config.mu
        )));
    }
    let noise = Normal::new(config.mu, config.sigma).map_err(|e| {
        EliteError::Configuration(format!("invalid gaussian sigma {}: {e}", config.sigma))
    })?;
    if let Some((i, (lo, hi))) = domain
        .iter()
        .enumerate()
        .find(|(_, (lo, hi))| !(lo.is_finite() && hi.is_finite() && lo <= hi))
    {
        return Err(EliteError::Configuration(format!(
            "domain of gene {i} is [{lo}, {hi}], expected finite lower <= upper"
        )));
    }
    Ok(Mutation::Gaussian(GaussianMutation {
        noise,
        indpb,
        boundary,
        domain: domain.to_vec(),
    }))
}

fn build_uniform(config: &CrossoverConfig) -> Result<Crossover> {
    let indpb = probability("crossover indpb", config.indpb)?;
    Ok(Crossover::Uniform(UniformCrossover { indpb }))
}

/// Validates a mutation section without a problem domain at hand.
pub(crate) fn validate_mutation(config: &MutationConfig) -> Result<()> {
    let builder = lookup(MUTATIONS, &config.kind, "mutation")?;
    builder(config, &[]).map(|_| ())
}

pub(crate) fn validate_crossover(config: &CrossoverConfig) -> Result<()> {
    let builder = lookup(CROSSOVERS, &config.kind, "crossover")?;
    builder(config).map(|_| ())
}

impl Mutation {
    /// Builds the configured operator, bound to the problem's domain.
    pub fn from_config(config: &MutationConfig, domain: &[(f64, f64)]) -> Result<Self> {
        let builder = lookup(MUTATIONS, &config.kind, "mutation")?;
        builder(config, domain)
    }

    /// Offspring of one parent.
    pub fn mutate(&self, genotype: &[f64], rng: &mut Pcg64) -> Vec<Vec<f64>> {
        match self {
            Mutation::Gaussian(op) => vec![op.mutate(genotype, rng)],
        }
    }
}

impl Crossover {
    pub fn from_config(config: &CrossoverConfig) -> Result<Self> {
        let builder = lookup(CROSSOVERS, &config.kind, "crossover")?;
        builder(config)
    }

    /// Offspring of two parents.
    pub fn crossover(&self, a: &[f64], b: &[f64], rng: &mut Pcg64) -> Vec<Vec<f64>> {
        match self {
            Crossover::Uniform(op) => {
                let (x, y) = op.crossover(a, b, rng);
                vec![x, y]
            }
        }
    }
}

impl GaussianMutation {
    fn mutate(&self, genotype: &[f64], rng: &mut Pcg64) -> Vec<f64> {
        genotype
            .iter()
            .zip(&self.domain)
            .map(|(&x, &(lo, hi))| {
                if rng.random_bool(self.indpb) {
                    self.boundary.apply(x + self.noise.sample(rng), lo, hi)
                } else {
                    x
                }
            })
            .collect()
    }
}

impl UniformCrossover {
    fn crossover(&self, a: &[f64], b: &[f64], rng: &mut Pcg64) -> (Vec<f64>, Vec<f64>) {
        let mut x = a.to_vec();
        let mut y = b.to_vec();
        for (gx, gy) in x.iter_mut().zip(y.iter_mut()) {
            if rng.random_bool(self.indpb) {
                std::mem::swap(gx, gy);
            }
        }
        (x, y)
    }
}
