//! MAP-Elites for constrained numeric optimization.
//!
//! The archive is an N-dimensional grid of elites. Some of its axes describe
//! behavior; the others encode how severely each constraint of the problem is
//! violated, so the archive doubles as a map of feasibility. After a run the
//! archive yields the best solution among those that satisfy the most
//! constraints.
//!
//! Benchmarks plug in through the [`Problem`] trait and are looked up by name in
//! a [`ProblemRegistry`]. Variation is done by the operators in [`operators`].

use rand_pcg::Pcg64;
use std::collections::BTreeMap;
use std::fmt;

pub mod archive;
pub mod config;
pub mod error;
pub mod feature;
pub mod operators;
pub mod persistence;
pub mod registry;
pub mod report;

pub mod algorithms {
    pub mod map_elites;
}

pub use archive::{Direction, EliteArchive, Placement, PromisingSolution, SelectionPolicy};
pub use config::RunConfig;
pub use error::{EliteError, Result};
pub use feature::{Boundaries, FeatureDimension, FeatureKind};
pub use registry::ProblemRegistry;

/// Whether a constraint must stay at or below zero, or equal zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// `g(x) <= 0`
    Inequality,
    /// `h(x) == 0`
    Equality,
}

impl ConstraintKind {
    /// Violation magnitude of a raw constraint value; zero when satisfied.
    pub fn violation(self, raw: f64) -> f64 {
        match self {
            ConstraintKind::Inequality => raw.max(0.0),
            ConstraintKind::Equality => raw.abs(),
        }
    }
}

/// A named constraint of the underlying optimization problem.
pub struct Constraint {
    pub kind: ConstraintKind,
    pub evaluator: Box<dyn Fn(&[f64]) -> f64 + Send + Sync>,
}

impl Constraint {
    pub fn inequality(f: impl Fn(&[f64]) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            kind: ConstraintKind::Inequality,
            evaluator: Box::new(f),
        }
    }

    pub fn equality(f: impl Fn(&[f64]) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            kind: ConstraintKind::Equality,
            evaluator: Box::new(f),
        }
    }

    pub fn violation(&self, genotype: &[f64]) -> f64 {
        self.kind.violation((self.evaluator)(genotype))
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A benchmark: how to score a genotype, where it lives in feature space, and
/// how to draw a fresh one.
///
/// Implementations must be pure with respect to the archive. `map_to_features`
/// has to return one in-range bin index per entry of `feature_dimensions`.
pub trait Problem: Send + Sync {
    /// Scalar performance of a genotype.
    fn evaluate(&self, genotype: &[f64]) -> Result<f64>;

    /// Bin index per feature dimension.
    fn map_to_features(&self, genotype: &[f64]) -> Result<Vec<usize>>;

    /// A random genotype inside [`domain`](Self::domain).
    fn generate_random_solution(&self, rng: &mut Pcg64) -> Vec<f64>;

    /// The archive axes, in order. Called once at setup.
    fn feature_dimensions(&self) -> Vec<FeatureDimension>;

    /// Per-gene `(lower, upper)` bounds; its length is the genotype length.
    fn domain(&self) -> Vec<(f64, f64)>;

    /// Named constraints, for reporting.
    fn constraints(&self) -> BTreeMap<String, Constraint> {
        BTreeMap::new()
    }

    /// Display name used in logs.
    fn name(&self) -> &str {
        "problem"
    }

    /// Violation magnitude of every constraint, in name order.
    fn constraint_violations(&self, genotype: &[f64]) -> Vec<(String, f64)> {
        self.constraints()
            .into_iter()
            .map(|(name, c)| {
                let v = c.violation(genotype);
                (name, v)
            })
            .collect()
    }
}
