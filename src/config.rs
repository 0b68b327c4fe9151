//! Run configuration.
//!
//! A [`RunConfig`] is plain serde data, usually read from a JSON document. It is
//! validated eagerly by [`RunConfig::validate`] before any individual is generated,
//! so unknown operator names and malformed parameters fail at setup.

use crate::archive::SelectionPolicy;
use crate::error::{EliteError, Result};
use crate::feature::Boundaries;
use crate::operators;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

/// What to do when the problem fails on an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationPolicy {
    /// Log, count, and move on to the next individual.
    #[default]
    Skip,
    /// Stop the run and return the error.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemConfig {
    /// Registry name of the benchmark.
    pub name: String,
    /// Genotype length.
    pub dimensions: usize,
    /// Named bin boundary lists, interpreted by the problem.
    #[serde(default)]
    pub bins: BTreeMap<String, Boundaries>,
}

impl ProblemConfig {
    /// The boundary list registered under `key`.
    pub fn bins(&self, key: &str) -> Result<&Boundaries> {
        self.bins.get(key).ok_or_else(|| {
            EliteError::Configuration(format!(
                "problem {:?} needs bins {key:?}, configured: {:?}",
                self.name,
                self.bins.keys().collect::<Vec<_>>()
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Registry name, e.g. `"gaussian"`.
    pub kind: String,
    #[serde(default)]
    pub mu: f64,
    #[serde(default)]
    pub sigma: f64,
    /// Per-gene mutation probability.
    #[serde(default)]
    pub indpb: f64,
    /// `saturation`, `bounce` or `toroidal`.
    pub boundary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossoverConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Registry name, e.g. `"uniform"`.
    pub kind: String,
    /// Per-gene swap probability.
    #[serde(default)]
    pub indpb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Fixed seed; a fresh one is drawn and logged when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    pub iterations: usize,
    pub bootstrap_individuals: usize,
    #[serde(default = "default_true")]
    pub minimization: bool,
    pub problem: ProblemConfig,
    pub mutation: MutationConfig,
    pub crossover: CrossoverConfig,
    #[serde(default)]
    pub selection: SelectionPolicy,
    #[serde(default)]
    pub on_evaluation_error: EvaluationPolicy,
    /// Run directory; `logs/log_<unix seconds>_<millis>` when absent.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Allow writing into an existing run directory.
    #[serde(default)]
    pub overwrite: bool,
    /// Write the run directory while finalizing. Off only for throwaway runs.
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| EliteError::io(path, e))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks everything that can be checked without building the problem.
    pub fn validate(&self) -> Result<()> {
        if self.bootstrap_individuals == 0 {
            return Err(EliteError::Configuration(
                "bootstrap_individuals must be greater than 0".to_string(),
            ));
        }
        if self.problem.dimensions == 0 {
            return Err(EliteError::Configuration(
                "problem dimensions must be greater than 0".to_string(),
            ));
        }
        if let SelectionPolicy::AxisRejection { max_attempts: 0 } = self.selection {
            return Err(EliteError::Configuration(
                "axis_rejection needs max_attempts > 0".to_string(),
            ));
        }
        operators::validate_mutation(&self.mutation)?;
        operators::validate_crossover(&self.crossover)?;
        Ok(())
    }
}
