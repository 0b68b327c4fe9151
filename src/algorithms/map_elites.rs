//! The MAP-Elites optimization loop.
//!
//! A run moves through [`LoopState::Bootstrapping`], [`LoopState::Iterating`] and
//! [`LoopState::Finalizing`] before ending in [`LoopState::Done`]:
//!
//! 1. Bootstrapping fills the archive with `bootstrap_individuals` random genotypes
//! 2. Each iteration selects one parent (or two, when crossover is enabled and the
//!    archive holds more than one elite), varies it into a single child, and offers
//!    the child to the archive
//! 3. Finalizing measures the run, extracts the most promising solution and,
//!    unless `persist` is off, writes the run directory (see [`crate::persistence`])
//!
//! Every iteration makes exactly one placement attempt. The loop is consumed by
//! [`MapElites::run`], so a finished loop cannot be restarted.
//!
//! # Determinism
//!
//! All randomness comes from one [`Pcg64`] seeded from the configuration and
//! threaded through generation, selection and variation. With the `parallel`
//! feature, bootstrap genotypes are still drawn serially and placed in draw order;
//! only their evaluation runs on the rayon pool, so results do not change.
//!
//! # Example
//!
//! ```rust
//! use rand::Rng;
//! use rand_pcg::Pcg64;
//! use symbios_elites::algorithms::map_elites::MapElites;
//! use symbios_elites::{FeatureDimension, Problem, Result, RunConfig};
//!
//! /// Minimize x^2 over [-1, 1], binned by x.
//! struct Parabola;
//!
//! impl Problem for Parabola {
//!     fn evaluate(&self, g: &[f64]) -> Result<f64> {
//!         Ok(g[0] * g[0])
//!     }
//!     fn map_to_features(&self, g: &[f64]) -> Result<Vec<usize>> {
//!         Ok(vec![self.feature_dimensions()[0].locate(g[0])?])
//!     }
//!     fn generate_random_solution(&self, rng: &mut Pcg64) -> Vec<f64> {
//!         vec![rng.random_range(-1.0..1.0)]
//!     }
//!     fn feature_dimensions(&self) -> Vec<FeatureDimension> {
//!         vec![FeatureDimension::behavior("x", "inf,-0.5,0,0.5,inf".parse().unwrap())]
//!     }
//!     fn domain(&self) -> Vec<(f64, f64)> {
//!         vec![(-1.0, 1.0)]
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let config = RunConfig::from_json_str(r#"{
//!     "seed": 7,
//!     "iterations": 500,
//!     "bootstrap_individuals": 20,
//!     "problem": { "name": "parabola", "dimensions": 1 },
//!     "mutation": { "kind": "gaussian", "sigma": 0.1, "indpb": 1.0, "boundary": "bounce" },
//!     "crossover": { "enabled": false, "kind": "uniform" },
//!     "persist": false
//! }"#)?;
//!
//! let run = MapElites::new(Box::new(Parabola), config)?.run()?;
//! assert_eq!(run.summary.iterations_run, 500);
//! assert_eq!(run.archive.len(), 4);
//! // No constraint axes, so nothing counts as promising.
//! assert!(run.summary.most_promising.is_none());
//! assert!(run.summary.best_overall.unwrap().performance < 0.05);
//! # Ok(())
//! # }
//! ```

use crate::Problem;
use crate::archive::{
    Candidate, Direction, EliteArchive, EliteRecord, Placement, PromisingSolution,
    SelectionPolicy,
};
use crate::config::{EvaluationPolicy, RunConfig};
use crate::error::{EliteError, Result};
use crate::operators::{Crossover, Mutation};
use crate::persistence;
use crate::registry::ProblemRegistry;
use rand::Rng;
use rand::prelude::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Bootstrapping,
    Iterating,
    Finalizing,
    Done,
}

/// What the stopping criteria get to look at between iterations.
pub struct LoopStatus<'a> {
    /// Index of the iteration about to run.
    pub iteration: usize,
    pub elapsed: Duration,
    pub archive: &'a EliteArchive,
}

type StoppingCriteria = Box<dyn FnMut(&LoopStatus<'_>) -> bool + Send>;

/// Progress hooks. Every method defaults to doing nothing.
pub trait RunObserver {
    fn on_phase(&mut self, _state: LoopState) {}

    /// `iteration` is `None` during bootstrapping.
    fn on_placement(&mut self, _iteration: Option<usize>, _placement: &Placement) {}

    /// An attempt that produced no placement, skipped under
    /// [`EvaluationPolicy::Skip`]: the problem failed on the individual, or
    /// selection could not find parents.
    fn on_failure(&mut self, _iteration: Option<usize>, _error: &EliteError) {}
}

/// Observer that ignores everything.
pub struct Silent;

impl RunObserver for Silent {}

/// Tally of placement outcomes over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementCounts {
    pub inserted: usize,
    pub replaced: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl PlacementCounts {
    pub fn attempts(&self) -> usize {
        self.inserted + self.replaced + self.rejected + self.failed
    }

    fn record(&mut self, placement: &Placement) {
        match placement {
            Placement::Inserted => self.inserted += 1,
            Placement::Replaced { .. } => self.replaced += 1,
            Placement::Rejected { .. } => self.rejected += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub problem: String,
    pub seed: u64,
    pub direction: Direction,
    pub iterations_run: usize,
    pub stopped_early: bool,
    pub counts: PlacementCounts,
    pub elapsed: Duration,
    pub archive_len: usize,
    pub capacity: usize,
    pub most_promising: Option<PromisingSolution>,
    pub best_overall: Option<EliteRecord>,
}

impl RunSummary {
    /// Human-readable run log.
    pub fn log_lines(&self) -> Vec<String> {
        let secs = self.elapsed.as_secs();
        let mut lines = vec![
            format!("Problem {}", self.problem),
            format!("Using random seed {}", self.seed),
            format!(
                "Iterations run: {}{}",
                self.iterations_run,
                if self.stopped_early {
                    " (stopping criteria met)"
                } else {
                    ""
                }
            ),
            format!(
                "Placements: {} inserted, {} replaced, {} rejected, {} failed",
                self.counts.inserted,
                self.counts.replaced,
                self.counts.rejected,
                self.counts.failed
            ),
            format!(
                "Archive coverage: {}/{} cells",
                self.archive_len, self.capacity
            ),
        ];
        if let Some(p) = &self.most_promising {
            lines.push(format!(
                "The best value solving the highest number of constraints is {}, with {} constraints solved, at {:?}",
                p.performance, p.solved, p.coords
            ));
        }
        if let Some(b) = &self.best_overall {
            lines.push(format!(
                "Best overall value: {} produced by individual {:?} and placed at {:?}",
                b.performance, b.genotype, b.coords
            ));
        }
        lines.push(format!(
            "Running time {:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        ));
        lines
    }
}

/// A completed run: the final archive and what happened.
#[derive(Debug, Clone)]
pub struct FinishedRun {
    pub archive: EliteArchive,
    pub summary: RunSummary,
    pub config: RunConfig,
    /// Where finalizing wrote the run; `None` when `persist` is off.
    pub run_dir: Option<PathBuf>,
}

impl FinishedRun {
    /// Writes a copy of the run to `dir`, honoring the configured `overwrite`.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        persistence::save_run(dir, self.config.overwrite, &self.config, &self.archive, &self.summary)
    }
}

/// Evaluates a genotype into a candidate: feature cell first, then performance.
pub fn evaluate_candidate(problem: &dyn Problem, genotype: Vec<f64>) -> Result<Candidate> {
    let coords = problem.map_to_features(&genotype)?;
    let performance = problem.evaluate(&genotype)?;
    Ok(Candidate {
        genotype,
        coords,
        performance,
    })
}

fn first_offspring(mut offspring: Vec<Vec<f64>>) -> Result<Vec<f64>> {
    if offspring.is_empty() {
        return Err(EliteError::Evaluation(
            "variation operator produced no offspring".to_string(),
        ));
    }
    Ok(offspring.swap_remove(0))
}

pub struct MapElites {
    problem: Box<dyn Problem>,
    archive: EliteArchive,
    mutation: Mutation,
    crossover: Option<Crossover>,
    selection: SelectionPolicy,
    on_evaluation_error: EvaluationPolicy,
    seed: u64,
    rng: Pcg64,
    state: LoopState,
    counts: PlacementCounts,
    stopping_criteria: Option<StoppingCriteria>,
    config: RunConfig,
}

impl MapElites {
    /// Sets up a run: validates the configuration, allocates the archive from the
    /// problem's feature dimensions, and binds the variation operators to the
    /// problem's domain.
    ///
    /// # Arguments
    ///
    /// * `problem` - The benchmark; its feature dimensions become the archive axes
    /// * `config` - Run settings; `problem.dimensions` must equal the domain length
    ///
    /// # Errors
    ///
    /// [`EliteError::Configuration`] for any invalid setting, an empty feature
    /// dimension list, or a domain whose length disagrees with
    /// `problem.dimensions`.
    pub fn new(problem: Box<dyn Problem>, config: RunConfig) -> Result<Self> {
        config.validate()?;

        let dimensions = problem.feature_dimensions();
        if dimensions.is_empty() {
            return Err(EliteError::Configuration(format!(
                "problem {} declares no feature dimensions",
                problem.name()
            )));
        }
        let domain = problem.domain();
        if domain.len() != config.problem.dimensions {
            return Err(EliteError::Configuration(format!(
                "problem {} has a {}-gene domain but {} dimensions are configured",
                problem.name(),
                domain.len(),
                config.problem.dimensions
            )));
        }

        let direction = Direction::from_minimization(config.minimization);
        let archive = EliteArchive::new(dimensions, domain.len(), direction)?;
        let mutation = Mutation::from_config(&config.mutation, &domain)?;
        let crossover = if config.crossover.enabled {
            Some(Crossover::from_config(&config.crossover)?)
        } else {
            None
        };

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        info!(
            problem = problem.name(),
            seed,
            shape = ?archive.shape(),
            ?direction,
            "configuration completed"
        );

        Ok(Self {
            problem,
            archive,
            mutation,
            crossover,
            selection: config.selection,
            on_evaluation_error: config.on_evaluation_error,
            seed,
            rng: Pcg64::seed_from_u64(seed),
            state: LoopState::Bootstrapping,
            counts: PlacementCounts::default(),
            stopping_criteria: None,
            config,
        })
    }

    /// Builds the problem named in the configuration, then sets up the run.
    pub fn from_registry(registry: &ProblemRegistry, config: RunConfig) -> Result<Self> {
        config.validate()?;
        let problem = registry.build(&config.problem)?;
        Self::new(problem, config)
    }

    /// Installs an early-exit check, evaluated before every iteration.
    pub fn with_stopping_criteria(
        mut self,
        criteria: impl FnMut(&LoopStatus<'_>) -> bool + Send + 'static,
    ) -> Self {
        self.stopping_criteria = Some(Box::new(criteria));
        self
    }

    pub fn archive(&self) -> &EliteArchive {
        &self.archive
    }

    pub fn problem(&self) -> &dyn Problem {
        self.problem.as_ref()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Evaluates `genotype` and offers it to its cell.
    ///
    /// # Errors
    ///
    /// Evaluation failures from the problem and invalid cells; the archive is left
    /// unchanged. A worse candidate is not an error, it yields
    /// [`Placement::Rejected`].
    pub fn place(&mut self, genotype: Vec<f64>) -> Result<Placement> {
        let candidate = evaluate_candidate(self.problem.as_ref(), genotype)?;
        self.archive.offer(candidate)
    }

    /// Draws `k` genotypes from distinct occupied cells.
    pub fn select(&mut self, k: usize) -> Result<Vec<Vec<f64>>> {
        self.archive.select(k, self.selection, &mut self.rng)
    }

    /// Runs to completion.
    pub fn run(self) -> Result<FinishedRun> {
        self.run_with_observer(&mut Silent)
    }

    pub fn run_with_observer(mut self, observer: &mut dyn RunObserver) -> Result<FinishedRun> {
        let start = Instant::now();

        self.enter(LoopState::Bootstrapping, observer);
        self.bootstrap(observer)?;

        self.enter(LoopState::Iterating, observer);
        let iterations = self.config.iterations;
        let mut iterations_run = 0;
        let mut stopped_early = false;
        for i in 0..iterations {
            if self.should_stop(i, start.elapsed()) {
                info!(iteration = i, "stopping criteria met");
                stopped_early = true;
                break;
            }
            debug!(iteration = i, "select and vary");
            let evaluated = self
                .breed()
                .and_then(|child| evaluate_candidate(self.problem.as_ref(), child));
            self.commit(evaluated, Some(i), observer)?;
            iterations_run += 1;
        }

        self.enter(LoopState::Finalizing, observer);
        let summary = RunSummary {
            problem: self.problem.name().to_string(),
            seed: self.seed,
            direction: self.archive.direction(),
            iterations_run,
            stopped_early,
            counts: self.counts,
            elapsed: start.elapsed(),
            archive_len: self.archive.len(),
            capacity: self.archive.capacity(),
            most_promising: self.archive.most_promising(),
            best_overall: self.archive.best_overall().map(|e| e.to_record()),
        };
        for line in summary.log_lines() {
            info!("{line}");
        }
        let run_dir = if self.config.persist {
            let dir = self
                .config
                .log_dir
                .clone()
                .unwrap_or_else(persistence::default_run_dir);
            persistence::save_run(
                &dir,
                self.config.overwrite,
                &self.config,
                &self.archive,
                &summary,
            )?;
            Some(dir)
        } else {
            None
        };

        self.enter(LoopState::Done, observer);
        Ok(FinishedRun {
            archive: self.archive,
            summary,
            config: self.config,
            run_dir,
        })
    }

    fn enter(&mut self, state: LoopState, observer: &mut dyn RunObserver) {
        info!(?state, "entering phase");
        self.state = state;
        observer.on_phase(state);
    }

    fn should_stop(&mut self, iteration: usize, elapsed: Duration) -> bool {
        let archive = &self.archive;
        self.stopping_criteria.as_mut().is_some_and(|criteria| {
            criteria(&LoopStatus {
                iteration,
                elapsed,
                archive,
            })
        })
    }

    fn bootstrap(&mut self, observer: &mut dyn RunObserver) -> Result<()> {
        let n = self.config.bootstrap_individuals;
        info!(individuals = n, "generating initial population");

        // Drawn serially so the RNG stream does not depend on evaluation order.
        let genotypes: Vec<Vec<f64>> = (0..n)
            .map(|_| self.problem.generate_random_solution(&mut self.rng))
            .collect();
        let problem = self.problem.as_ref();

        #[cfg(feature = "parallel")]
        let evaluated: Vec<Result<Candidate>> = genotypes
            .into_par_iter()
            .map(|g| evaluate_candidate(problem, g))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let evaluated: Vec<Result<Candidate>> = genotypes
            .into_iter()
            .map(|g| evaluate_candidate(problem, g))
            .collect();

        for result in evaluated {
            self.commit(result, None, observer)?;
        }
        Ok(())
    }

    /// Produces the single child of one iteration.
    fn breed(&mut self) -> Result<Vec<f64>> {
        if self.archive.is_empty() {
            // Every bootstrap individual failed; restart from a random genotype.
            warn!("archive is empty, drawing a fresh random individual");
            return Ok(self.problem.generate_random_solution(&mut self.rng));
        }
        match &self.crossover {
            Some(crossover) if self.archive.len() > 1 => {
                let parents = self.archive.select(2, self.selection, &mut self.rng)?;
                let child =
                    first_offspring(crossover.crossover(&parents[0], &parents[1], &mut self.rng))?;
                first_offspring(self.mutation.mutate(&child, &mut self.rng))
            }
            _ => {
                let parents = self.archive.select(1, self.selection, &mut self.rng)?;
                first_offspring(self.mutation.mutate(&parents[0], &mut self.rng))
            }
        }
    }

    fn commit(
        &mut self,
        evaluated: Result<Candidate>,
        iteration: Option<usize>,
        observer: &mut dyn RunObserver,
    ) -> Result<()> {
        match evaluated.and_then(|c| self.archive.offer(c)) {
            Ok(placement) => {
                self.counts.record(&placement);
                observer.on_placement(iteration, &placement);
                Ok(())
            }
            Err(e)
                if e.is_recoverable() && self.on_evaluation_error == EvaluationPolicy::Skip =>
            {
                warn!(?iteration, error = %e, "skipping individual");
                self.counts.failed += 1;
                observer.on_failure(iteration, &e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
