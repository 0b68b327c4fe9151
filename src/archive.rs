//! The dense N-dimensional elite archive.
//!
//! One cell exists for every combination of feature bins. An empty cell holds
//! performance `+inf` and a genotype made entirely of `+inf`; a finite genotype
//! marks the cell as occupied. Cells are written only through
//! [`EliteArchive::offer`], which applies the replacement rule of the configured
//! [`Direction`].
//!
//! Cells are stored row-major (last axis varies fastest), so the flat
//! performance and solution buffers line up with the persisted grids.

use crate::error::{EliteError, Result};
use crate::feature::{FeatureDimension, FeatureKind};
use rand::Rng;
use rand::prelude::IndexedRandom;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Optimization direction and its replacement comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Direction {
    pub fn from_minimization(minimization: bool) -> Self {
        if minimization {
            Direction::Minimize
        } else {
            Direction::Maximize
        }
    }

    /// Whether a challenger displaces an occupied cell's incumbent.
    ///
    /// Minimization is strict (ties keep the incumbent); maximization is not (ties
    /// go to the challenger).
    pub fn improves(self, challenger: f64, incumbent: f64) -> bool {
        match self {
            Direction::Minimize => challenger < incumbent,
            Direction::Maximize => challenger >= incumbent,
        }
    }

    /// Strict "better than" used when ranking elites against each other.
    pub fn better(self, a: f64, b: f64) -> bool {
        match self {
            Direction::Minimize => a < b,
            Direction::Maximize => a > b,
        }
    }
}

/// How parents are drawn from the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Uniform over occupied cells.
    #[default]
    Uniform,
    /// Draw one random bin per axis until an occupied, unchosen cell turns up.
    /// Biased toward cells on short axes; gives up after `max_attempts` draws.
    AxisRejection { max_attempts: usize },
}

/// An evaluated genotype ready to be offered to the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub genotype: Vec<f64>,
    pub coords: Vec<usize>,
    pub performance: f64,
}

/// Outcome of offering a candidate to its cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// The cell was empty.
    Inserted,
    /// The candidate displaced an incumbent.
    Replaced { previous: f64 },
    /// The incumbent stays.
    Rejected { incumbent: f64 },
}

impl Placement {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Placement::Rejected { .. })
    }
}

/// A borrowed view of one occupied cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Elite<'a> {
    pub coords: Vec<usize>,
    pub genotype: &'a [f64],
    pub performance: f64,
}

impl Elite<'_> {
    pub fn to_record(&self) -> EliteRecord {
        EliteRecord {
            coords: self.coords.clone(),
            genotype: self.genotype.to_vec(),
            performance: self.performance,
        }
    }
}

/// An owned copy of one occupied cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliteRecord {
    pub coords: Vec<usize>,
    pub genotype: Vec<f64>,
    pub performance: f64,
}

/// Best solution among those violating the fewest constraint axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromisingSolution {
    pub performance: f64,
    /// Number of constraint axes on which the solution sits in bin 0.
    pub solved: usize,
    pub coords: Vec<usize>,
    pub genotype: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct EliteArchive {
    dimensions: Vec<FeatureDimension>,
    shape: Vec<usize>,
    strides: Vec<usize>,
    genotype_len: usize,
    direction: Direction,
    performances: Vec<f64>,
    solutions: Vec<f64>,
    /// Flat indices of occupied cells, in order of first occupation.
    occupied: Vec<usize>,
}

impl EliteArchive {
    /// Allocates an archive with every cell empty.
    ///
    /// # Errors
    ///
    /// [`EliteError::Configuration`] if there are no dimensions, the genotype length
    /// is zero, or the grid is too large to address.
    pub fn new(
        dimensions: Vec<FeatureDimension>,
        genotype_len: usize,
        direction: Direction,
    ) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(EliteError::Configuration(
                "an archive needs at least one feature dimension".to_string(),
            ));
        }
        if genotype_len == 0 {
            return Err(EliteError::Configuration(
                "genotype length must be greater than 0".to_string(),
            ));
        }
        let shape: Vec<usize> = dimensions.iter().map(FeatureDimension::bin_count).collect();
        let capacity = shape
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .and_then(|c| c.checked_mul(genotype_len).map(|_| c))
            .ok_or_else(|| {
                EliteError::Configuration(format!("archive shape {shape:?} is too large"))
            })?;

        let mut strides = vec![1usize; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }

        Ok(Self {
            dimensions,
            shape,
            strides,
            genotype_len,
            direction,
            performances: vec![f64::INFINITY; capacity],
            solutions: vec![f64::INFINITY; capacity * genotype_len],
            occupied: Vec::new(),
        })
    }

    /// Rebuilds an archive from persisted flat buffers.
    ///
    /// # Errors
    ///
    /// [`EliteError::Configuration`] when buffer lengths disagree with the shape, or
    /// a cell is half-filled (some genes finite, some not).
    pub fn from_parts(
        dimensions: Vec<FeatureDimension>,
        genotype_len: usize,
        direction: Direction,
        performances: Vec<f64>,
        solutions: Vec<f64>,
    ) -> Result<Self> {
        let mut archive = Self::new(dimensions, genotype_len, direction)?;
        if performances.len() != archive.performances.len()
            || solutions.len() != archive.solutions.len()
        {
            return Err(EliteError::Configuration(format!(
                "snapshot buffers ({} performances, {} genes) do not fit shape {:?} x {}",
                performances.len(),
                solutions.len(),
                archive.shape,
                genotype_len
            )));
        }
        archive.performances = performances;
        archive.solutions = solutions;
        for flat in 0..archive.performances.len() {
            let genes = archive.genes(flat);
            let finite = genes.iter().filter(|g| g.is_finite()).count();
            if finite == genes.len() {
                if !archive.performances[flat].is_finite() {
                    return Err(EliteError::Configuration(format!(
                        "cell {:?} holds a genotype but performance {}",
                        archive.unravel(flat),
                        archive.performances[flat]
                    )));
                }
                archive.occupied.push(flat);
            } else if finite != 0 {
                return Err(EliteError::Configuration(format!(
                    "cell {:?} holds a partially empty genotype",
                    archive.unravel(flat)
                )));
            }
        }
        Ok(archive)
    }

    pub fn dimensions(&self) -> &[FeatureDimension] {
        &self.dimensions
    }

    /// Bin count of every dimension.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn genotype_len(&self) -> usize {
        self.genotype_len
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.occupied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }

    /// Total number of cells.
    pub fn capacity(&self) -> usize {
        self.performances.len()
    }

    /// Fraction of cells occupied.
    pub fn coverage(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Flat row-major performance grid; `+inf` marks empty cells.
    pub fn performances(&self) -> &[f64] {
        &self.performances
    }

    /// Flat row-major genotype grid, `genotype_len` values per cell.
    pub fn solutions(&self) -> &[f64] {
        &self.solutions
    }

    /// Indices of the axes tagged [`FeatureKind::Constraint`].
    pub fn constraint_axes(&self) -> Vec<usize> {
        self.dimensions
            .iter()
            .enumerate()
            .filter(|(_, d)| d.kind() == FeatureKind::Constraint)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn ravel(&self, coords: &[usize]) -> Result<usize> {
        if coords.len() != self.shape.len()
            || coords.iter().zip(&self.shape).any(|(&c, &n)| c >= n)
        {
            return Err(EliteError::CellOutOfBounds {
                coords: coords.to_vec(),
                shape: self.shape.clone(),
            });
        }
        Ok(coords.iter().zip(&self.strides).map(|(c, s)| c * s).sum())
    }

    pub fn unravel(&self, mut flat: usize) -> Vec<usize> {
        self.strides
            .iter()
            .map(|&s| {
                let c = flat / s;
                flat %= s;
                c
            })
            .collect()
    }

    fn genes(&self, flat: usize) -> &[f64] {
        let start = flat * self.genotype_len;
        &self.solutions[start..start + self.genotype_len]
    }

    fn cell_is_empty(&self, flat: usize) -> bool {
        self.genes(flat).iter().any(|g| !g.is_finite())
    }

    /// Whether the cell at `coords` has never been filled.
    pub fn is_empty_cell(&self, coords: &[usize]) -> Result<bool> {
        Ok(self.cell_is_empty(self.ravel(coords)?))
    }

    fn elite(&self, flat: usize) -> Elite<'_> {
        Elite {
            coords: self.unravel(flat),
            genotype: self.genes(flat),
            performance: self.performances[flat],
        }
    }

    pub fn get(&self, coords: &[usize]) -> Option<Elite<'_>> {
        let flat = self.ravel(coords).ok()?;
        (!self.cell_is_empty(flat)).then(|| self.elite(flat))
    }

    /// Occupied cells in row-major order.
    pub fn iter_elites(&self) -> impl Iterator<Item = Elite<'_>> {
        let mut flats = self.occupied.clone();
        flats.sort_unstable();
        flats.into_iter().map(move |flat| self.elite(flat))
    }

    /// Offers a candidate to the cell at its coordinates.
    ///
    /// An empty cell always accepts. An occupied cell is overwritten when
    /// [`Direction::improves`] holds; otherwise the candidate is dropped.
    ///
    /// # Errors
    ///
    /// Coordinates outside the grid, a genotype of the wrong length, non-finite
    /// genes, or a non-finite performance. Infinity is reserved for empty cells in
    /// the performance buffer. The archive is untouched in every error case.
    pub fn offer(&mut self, candidate: Candidate) -> Result<Placement> {
        let flat = self.ravel(&candidate.coords)?;
        if candidate.genotype.len() != self.genotype_len {
            return Err(EliteError::GenotypeLength {
                expected: self.genotype_len,
                actual: candidate.genotype.len(),
            });
        }
        if candidate.genotype.iter().any(|g| !g.is_finite()) {
            return Err(EliteError::Evaluation(format!(
                "genotype {:?} has non-finite genes",
                candidate.genotype
            )));
        }
        if !candidate.performance.is_finite() {
            return Err(EliteError::Evaluation(format!(
                "genotype {:?} evaluated to {}",
                candidate.genotype, candidate.performance
            )));
        }

        let incumbent = self.performances[flat];
        let placement = if self.cell_is_empty(flat) {
            self.occupied.push(flat);
            Placement::Inserted
        } else if self.direction.improves(candidate.performance, incumbent) {
            Placement::Replaced {
                previous: incumbent,
            }
        } else {
            debug!(
                genotype = ?candidate.genotype,
                coords = ?candidate.coords,
                performance = candidate.performance,
                incumbent,
                "rejected"
            );
            return Ok(Placement::Rejected { incumbent });
        };

        debug!(
            genotype = ?candidate.genotype,
            coords = ?candidate.coords,
            performance = candidate.performance,
            "placed"
        );
        self.performances[flat] = candidate.performance;
        let start = flat * self.genotype_len;
        self.solutions[start..start + self.genotype_len].copy_from_slice(&candidate.genotype);
        Ok(placement)
    }

    /// Draws `k` genotypes from distinct occupied cells.
    ///
    /// # Errors
    ///
    /// [`EliteError::InsufficientElites`] if fewer than `k` cells are occupied, or if
    /// [`SelectionPolicy::AxisRejection`] runs out of attempts.
    pub fn select(
        &self,
        k: usize,
        policy: SelectionPolicy,
        rng: &mut Pcg64,
    ) -> Result<Vec<Vec<f64>>> {
        if k > self.occupied.len() {
            return Err(EliteError::InsufficientElites {
                requested: k,
                available: self.occupied.len(),
            });
        }
        match policy {
            SelectionPolicy::Uniform => Ok(self
                .occupied
                .choose_multiple(rng, k)
                .map(|&flat| self.genes(flat).to_vec())
                .collect()),
            SelectionPolicy::AxisRejection { max_attempts } => {
                let mut chosen: Vec<usize> = Vec::with_capacity(k);
                let mut attempts = 0usize;
                while chosen.len() < k {
                    if attempts >= max_attempts {
                        return Err(EliteError::InsufficientElites {
                            requested: k,
                            available: chosen.len(),
                        });
                    }
                    attempts += 1;
                    let flat: usize = self
                        .shape
                        .iter()
                        .zip(&self.strides)
                        .map(|(&n, &s)| rng.random_range(0..n) * s)
                        .sum();
                    if !chosen.contains(&flat) && !self.cell_is_empty(flat) {
                        chosen.push(flat);
                    }
                }
                Ok(chosen.iter().map(|&f| self.genes(f).to_vec()).collect())
            }
        }
    }

    /// The best elite overall, ignoring constraint status.
    pub fn best_overall(&self) -> Option<Elite<'_>> {
        let mut best: Option<usize> = None;
        for &flat in &self.occupied {
            best = match best {
                Some(b) if !self.is_preferred(flat, b) => Some(b),
                _ => Some(flat),
            };
        }
        best.map(|flat| self.elite(flat))
    }

    /// Ties on performance go to the lower flat index so results do not depend on
    /// insertion order.
    fn is_preferred(&self, flat: usize, over: usize) -> bool {
        let (a, b) = (self.performances[flat], self.performances[over]);
        self.direction.better(a, b) || (a == b && flat < over)
    }

    /// Lowest-valued elite among those sitting in bin 0 on the most constraint axes.
    ///
    /// Behavior axes never count. The answer maximizes the number of feasible
    /// constraint axes and, among those, takes the minimum performance whatever the
    /// archive's direction; equal values go to the lower flat index. `None` when no
    /// occupied cell solves at least one constraint axis, which includes archives
    /// without constraint axes.
    pub fn most_promising(&self) -> Option<PromisingSolution> {
        let axes = self.constraint_axes();
        let solved_of = |flat: usize| -> usize {
            let coords = self.unravel(flat);
            axes.iter().filter(|&&a| coords[a] == 0).count()
        };
        let lower = |flat: usize, over: usize| {
            let (a, b) = (self.performances[flat], self.performances[over]);
            a < b || (a == b && flat < over)
        };

        let mut best: Option<(usize, usize)> = None;
        for &flat in &self.occupied {
            let solved = solved_of(flat);
            if solved == 0 {
                continue;
            }
            best = match best {
                Some((b, b_solved))
                    if b_solved > solved || (b_solved == solved && !lower(flat, b)) =>
                {
                    Some((b, b_solved))
                }
                _ => Some((flat, solved)),
            };
        }

        best.map(|(flat, solved)| PromisingSolution {
            performance: self.performances[flat],
            solved,
            coords: self.unravel(flat),
            genotype: self.genes(flat).to_vec(),
        })
    }
}
