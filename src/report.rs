//! Aggregation of independent runs stored under one experiment directory.
//!
//! Each non-hidden subdirectory holding a performance grid counts as one run.
//! Empty cells never take part in any statistic.
//!
//! Besides performance, every reported elite carries its standing on the
//! constraint axes: how many it violates (any bin above 0), how those axes spread
//! over the severity bins, and, when the problem can be rebuilt from the run's
//! configuration, the mean violation magnitude of the violated constraints.

use crate::Problem;
use crate::archive::{Direction, Elite, EliteArchive, PromisingSolution};
use crate::error::{EliteError, Result};
use crate::persistence::{self, PERFORMANCES_FILE};
use crate::registry::ProblemRegistry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One elite measured against the constraint axes of its archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellStats {
    pub performance: f64,
    pub coords: Vec<usize>,
    /// Constraint axes on which the elite is outside bin 0.
    pub violated: usize,
    /// `bins[b]` counts the constraint axes on which the elite sits in bin `b`.
    pub bins: Vec<usize>,
    /// Mean violation magnitude over the violated constraints; `None` when the
    /// problem was not available.
    pub mean_violation: Option<f64>,
}

impl CellStats {
    fn of(elite: &Elite<'_>, archive: &EliteArchive, problem: Option<&dyn Problem>) -> Self {
        let axes = archive.constraint_axes();
        let width = axes.iter().map(|&a| archive.shape()[a]).max().unwrap_or(0);
        let mut bins = vec![0; width];
        for &a in &axes {
            bins[elite.coords[a]] += 1;
        }
        let violated_axes: Vec<usize> = axes
            .iter()
            .copied()
            .filter(|&a| elite.coords[a] > 0)
            .collect();

        let mean_violation = problem.map(|problem| {
            let violations = problem.constraint_violations(elite.genotype);
            let magnitudes: Vec<f64> = violated_axes
                .iter()
                .filter_map(|&a| {
                    let name = archive.dimensions()[a].name();
                    violations.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
                })
                .collect();
            if magnitudes.is_empty() {
                0.0
            } else {
                magnitudes.iter().sum::<f64>() / magnitudes.len() as f64
            }
        });

        Self {
            performance: elite.performance,
            coords: elite.coords.clone(),
            violated: violated_axes.len(),
            bins,
            mean_violation,
        }
    }
}

/// Statistics of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub name: String,
    pub direction: Direction,
    pub elites: usize,
    pub best: Option<f64>,
    pub worst: Option<f64>,
    /// Lower median of the occupied cells' performances.
    pub median: Option<f64>,
    pub best_cell: Option<CellStats>,
    pub worst_cell: Option<CellStats>,
    pub median_cell: Option<CellStats>,
    /// Some occupied cell sits in bin 0 on every constraint axis.
    pub feasible: bool,
    pub most_promising: Option<PromisingSolution>,
}

impl RunStats {
    pub fn from_archive(name: impl Into<String>, archive: &EliteArchive) -> Self {
        Self::measure(name, archive, None)
    }

    /// Like [`from_archive`](Self::from_archive), also filling in the mean
    /// violation of every reported cell.
    pub fn with_problem(
        name: impl Into<String>,
        archive: &EliteArchive,
        problem: &dyn Problem,
    ) -> Self {
        Self::measure(name, archive, Some(problem))
    }

    fn measure(
        name: impl Into<String>,
        archive: &EliteArchive,
        problem: Option<&dyn Problem>,
    ) -> Self {
        let direction = archive.direction();
        // Stable sort: equal performances stay in cell order.
        let mut elites: Vec<Elite<'_>> = archive.iter_elites().collect();
        elites.sort_by(|a, b| a.performance.total_cmp(&b.performance));

        let (best, worst) = match direction {
            Direction::Minimize => (elites.first(), elites.last()),
            Direction::Maximize => (elites.last(), elites.first()),
        };
        let median = elites.get(elites.len().saturating_sub(1) / 2);
        let cell = |e: Option<&Elite<'_>>| e.map(|e| CellStats::of(e, archive, problem));

        let axes = archive.constraint_axes();
        let feasible = elites
            .iter()
            .any(|e| axes.iter().all(|&a| e.coords[a] == 0));

        Self {
            name: name.into(),
            direction,
            elites: elites.len(),
            best: best.map(|e| e.performance),
            worst: worst.map(|e| e.performance),
            median: median.map(|e| e.performance),
            best_cell: cell(best),
            worst_cell: cell(worst),
            median_cell: cell(median),
            feasible,
            most_promising: archive.most_promising(),
        }
    }
}

/// Cross-run statistics of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub runs: Vec<RunStats>,
    /// Fraction of runs with at least one feasible elite.
    pub feasibility_rate: f64,
    /// Best of the per-run bests.
    pub best: Option<f64>,
    /// Worst of the per-run bests.
    pub worst: Option<f64>,
    pub median_best: Option<f64>,
    pub mean_best: Option<f64>,
    /// Population standard deviation of the per-run bests.
    pub std_best: Option<f64>,
    /// The cell behind [`best`](Self::best).
    pub best_cell: Option<CellStats>,
    /// The cell behind [`worst`](Self::worst).
    pub worst_cell: Option<CellStats>,
    /// Lower median of the per-run median cells, by performance.
    pub median_cell: Option<CellStats>,
}

impl ExperimentSummary {
    /// Aggregates already-computed run statistics.
    ///
    /// # Errors
    ///
    /// [`EliteError::Configuration`] if there are no runs or the runs disagree on
    /// the optimization direction.
    pub fn from_runs(runs: Vec<RunStats>) -> Result<Self> {
        let Some(first) = runs.first() else {
            return Err(EliteError::Configuration(
                "experiment contains no runs".to_string(),
            ));
        };
        let direction = first.direction;
        if let Some(other) = runs.iter().find(|r| r.direction != direction) {
            return Err(EliteError::Configuration(format!(
                "run {} optimizes {:?} but run {} optimizes {:?}",
                other.name, other.direction, first.name, direction
            )));
        }

        let feasible = runs.iter().filter(|r| r.feasible).count();
        let feasibility_rate = feasible as f64 / runs.len() as f64;

        let mut bests: Vec<&CellStats> = runs.iter().filter_map(|r| r.best_cell.as_ref()).collect();
        bests.sort_by(|a, b| a.performance.total_cmp(&b.performance));
        let (best_cell, worst_cell) = match direction {
            Direction::Minimize => (bests.first(), bests.last()),
            Direction::Maximize => (bests.last(), bests.first()),
        };
        let values: Vec<f64> = bests.iter().map(|c| c.performance).collect();
        let (median_best, mean_best, std_best) = if values.is_empty() {
            (None, None, None)
        } else {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|b| (b - mean).powi(2)).sum::<f64>() / n;
            (Some(values[(values.len() - 1) / 2]), Some(mean), Some(var.sqrt()))
        };

        let best_cell = best_cell.map(|&c| c.clone());
        let worst_cell = worst_cell.map(|&c| c.clone());

        let mut medians: Vec<&CellStats> =
            runs.iter().filter_map(|r| r.median_cell.as_ref()).collect();
        medians.sort_by(|a, b| a.performance.total_cmp(&b.performance));
        let median_cell = medians
            .get(medians.len().saturating_sub(1) / 2)
            .map(|&c| c.clone());

        Ok(Self {
            best: best_cell.as_ref().map(|c| c.performance),
            worst: worst_cell.as_ref().map(|c| c.performance),
            best_cell,
            worst_cell,
            median_cell,
            runs,
            feasibility_rate,
            median_best,
            mean_best,
            std_best,
        })
    }
}

fn run_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(dir).map_err(|e| EliteError::io(dir, e))?;
    let mut run_dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EliteError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if name.starts_with('.') || !path.is_dir() {
            continue;
        }
        if !path.join(PERFORMANCES_FILE).exists() {
            debug!(dir = %path.display(), "not a run directory, skipping");
            continue;
        }
        run_dirs.push((name, path));
    }
    run_dirs.sort();
    Ok(run_dirs)
}

/// Loads every run under `dir`, in name order, and aggregates them.
pub fn aggregate_experiment(dir: &Path) -> Result<ExperimentSummary> {
    let runs = run_dirs(dir)?
        .into_iter()
        .map(|(name, path)| {
            let archive = persistence::load_archive(&path)?;
            Ok(RunStats::from_archive(name, &archive))
        })
        .collect::<Result<Vec<_>>>()?;
    ExperimentSummary::from_runs(runs)
}

/// Like [`aggregate_experiment`], rebuilding each run's problem from its saved
/// configuration so that mean violations can be computed.
///
/// # Errors
///
/// Additionally fails when a run directory has no readable `config.json` or names
/// a problem the registry does not know.
pub fn aggregate_experiment_with(
    dir: &Path,
    registry: &ProblemRegistry,
) -> Result<ExperimentSummary> {
    let runs = run_dirs(dir)?
        .into_iter()
        .map(|(name, path)| {
            let archive = persistence::load_archive(&path)?;
            let config = persistence::load_config(&path)?;
            let problem = registry.build(&config.problem)?;
            Ok(RunStats::with_problem(name, &archive, problem.as_ref()))
        })
        .collect::<Result<Vec<_>>>()?;
    ExperimentSummary::from_runs(runs)
}
