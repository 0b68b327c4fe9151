//! Run directories.
//!
//! A finished run is written as:
//!
//! - `config.json`: the run configuration
//! - `performances.bin`: the performance grid, `+inf` marking empty cells
//! - `solutions.bin`: the genotype grid, same leading shape, `genotype_len` values per cell
//! - `summary.json`: the [`RunSummary`]
//! - `run.log`: the textual run log
//!
//! Grids are bincode-encoded and row-major. An experiment directory holds one
//! run directory per independent run; see [`crate::report`].

use crate::algorithms::map_elites::RunSummary;
use crate::archive::{Direction, EliteArchive};
use crate::config::RunConfig;
use crate::error::{EliteError, Result};
use crate::feature::{Boundaries, FeatureDimension, FeatureKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

pub const CONFIG_FILE: &str = "config.json";
pub const PERFORMANCES_FILE: &str = "performances.bin";
pub const SOLUTIONS_FILE: &str = "solutions.bin";
pub const SUMMARY_FILE: &str = "summary.json";
pub const LOG_FILE: &str = "run.log";

/// Axis metadata stored beside the performance grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisRecord {
    pub name: String,
    pub kind: FeatureKind,
    pub boundaries: Vec<f64>,
}

impl From<&FeatureDimension> for AxisRecord {
    fn from(d: &FeatureDimension) -> Self {
        Self {
            name: d.name().to_string(),
            kind: d.kind(),
            boundaries: d.boundaries().as_slice().to_vec(),
        }
    }
}

impl TryFrom<AxisRecord> for FeatureDimension {
    type Error = EliteError;

    fn try_from(r: AxisRecord) -> Result<Self> {
        Ok(FeatureDimension::new(r.name, Boundaries::new(r.boundaries)?, r.kind))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceGrid {
    pub axes: Vec<AxisRecord>,
    pub direction: Direction,
    pub values: Vec<f64>,
}

impl PerformanceGrid {
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.boundaries.len().saturating_sub(1)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionGrid {
    pub shape: Vec<usize>,
    pub genotype_len: usize,
    pub values: Vec<f64>,
}

/// `logs/log_<unix seconds>_<millis>`.
pub fn default_run_dir() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    PathBuf::from("logs").join(format!("log_{}_{:03}", now.as_secs(), now.subsec_millis()))
}

fn write(path: PathBuf, bytes: &[u8]) -> Result<()> {
    fs::write(&path, bytes).map_err(|e| EliteError::io(path, e))
}

fn read(path: PathBuf) -> Result<Vec<u8>> {
    fs::read(&path).map_err(|e| EliteError::io(path, e))
}

/// Writes a complete run directory.
///
/// # Errors
///
/// [`EliteError::Persistence`] if `dir` already exists and `overwrite` is false, or
/// any file cannot be written. The archive itself is never modified.
pub fn save_run(
    dir: &Path,
    overwrite: bool,
    config: &RunConfig,
    archive: &EliteArchive,
    summary: &RunSummary,
) -> Result<()> {
    if dir.exists() && !overwrite {
        return Err(EliteError::io(
            dir,
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "run directory exists and overwrite is off",
            ),
        ));
    }
    fs::create_dir_all(dir).map_err(|e| EliteError::io(dir, e))?;

    write(dir.join(CONFIG_FILE), config.to_json_pretty()?.as_bytes())?;
    save_archive(dir, archive)?;
    write(
        dir.join(SUMMARY_FILE),
        serde_json::to_string_pretty(summary)?.as_bytes(),
    )?;
    let mut log = summary.log_lines().join("\n");
    log.push('\n');
    write(dir.join(LOG_FILE), log.as_bytes())?;

    info!(dir = %dir.display(), "run saved");
    Ok(())
}

/// Writes only the two grids.
pub fn save_archive(dir: &Path, archive: &EliteArchive) -> Result<()> {
    let performances = PerformanceGrid {
        axes: archive.dimensions().iter().map(AxisRecord::from).collect(),
        direction: archive.direction(),
        values: archive.performances().to_vec(),
    };
    let solutions = SolutionGrid {
        shape: archive.shape().to_vec(),
        genotype_len: archive.genotype_len(),
        values: archive.solutions().to_vec(),
    };
    write(dir.join(PERFORMANCES_FILE), &bincode::serialize(&performances)?)?;
    write(dir.join(SOLUTIONS_FILE), &bincode::serialize(&solutions)?)?;
    Ok(())
}

/// Reads the grids of a run directory back into an archive.
pub fn load_archive(dir: &Path) -> Result<EliteArchive> {
    let performances: PerformanceGrid =
        bincode::deserialize(&read(dir.join(PERFORMANCES_FILE))?)?;
    let solutions: SolutionGrid = bincode::deserialize(&read(dir.join(SOLUTIONS_FILE))?)?;
    if performances.shape() != solutions.shape {
        return Err(EliteError::Configuration(format!(
            "{}: performance grid shape {:?} differs from solution grid shape {:?}",
            dir.display(),
            performances.shape(),
            solutions.shape
        )));
    }
    let dimensions = performances
        .axes
        .into_iter()
        .map(FeatureDimension::try_from)
        .collect::<Result<Vec<_>>>()?;
    EliteArchive::from_parts(
        dimensions,
        solutions.genotype_len,
        performances.direction,
        performances.values,
        solutions.values,
    )
}

pub fn load_config(dir: &Path) -> Result<RunConfig> {
    RunConfig::from_path(dir.join(CONFIG_FILE))
}
