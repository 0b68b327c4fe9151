//! Error taxonomy for archive setup, selection, evaluation and persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while configuring or running MAP-Elites.
///
/// A rejected placement is not an error; see [`crate::archive::Placement`].
#[derive(Debug, Error)]
pub enum EliteError {
    /// Fatal at setup: unknown operator or problem name, malformed bins, bad parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Selection asked for more distinct elites than the archive holds.
    #[error("cannot select {requested} distinct elites, only {available} available")]
    InsufficientElites { requested: usize, available: usize },

    /// The problem could not evaluate or characterize a genotype.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// A feature mapping produced coordinates outside the archive grid.
    #[error("cell {coords:?} lies outside archive shape {shape:?}")]
    CellOutOfBounds {
        coords: Vec<usize>,
        shape: Vec<usize>,
    },

    #[error("genotype has {actual} genes, expected {expected}")]
    GenotypeLength { expected: usize, actual: usize },

    #[error("i/o failure at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive snapshot encoding failed: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("configuration document is malformed: {0}")]
    ConfigFormat(#[from] serde_json::Error),
}

impl EliteError {
    /// True for per-individual failures the loop may skip without aborting the run.
    pub fn is_evaluation_failure(&self) -> bool {
        matches!(
            self,
            EliteError::Evaluation(_)
                | EliteError::CellOutOfBounds { .. }
                | EliteError::GenotypeLength { .. }
        )
    }

    /// Failures that cost one placement attempt: evaluation failures plus
    /// selection giving up on a sparse archive.
    pub fn is_recoverable(&self) -> bool {
        self.is_evaluation_failure() || matches!(self, EliteError::InsufficientElites { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EliteError::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EliteError>;
