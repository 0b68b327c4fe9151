//! Feature dimensions: the axes of the elite archive.
//!
//! Each axis is an ordered list of bin boundaries. Bin `i` covers the half-open
//! interval `[boundaries[i], boundaries[i + 1])`; when the last boundary is `+inf`
//! the final bin is closed on the right, so `+inf` itself maps there.
//!
//! An axis either describes behavior or encodes how badly one constraint is
//! violated. In the latter case bin 0 means "feasible on this constraint" and
//! higher bins mean larger violations.

use crate::error::{EliteError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an axis is interpreted when ranking solutions by constraint satisfaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// A behavior descriptor; never pinned during most-promising extraction.
    Behavior,
    /// A discretized violation level; bin 0 is feasible.
    Constraint,
}

/// Strictly increasing bin boundaries, optionally opened by `-inf` and closed by `+inf`.
///
/// Parses from a comma-separated list where a leading `inf` stands for `-inf` and a
/// trailing `inf` for `+inf`, e.g. `"inf,0.0001,0.01,1,inf"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BoundarySpec", into = "String")]
pub struct Boundaries(Vec<f64>);

#[derive(Deserialize)]
#[serde(untagged)]
enum BoundarySpec {
    Text(String),
    Values(Vec<f64>),
}

impl TryFrom<BoundarySpec> for Boundaries {
    type Error = EliteError;

    fn try_from(spec: BoundarySpec) -> Result<Self> {
        match spec {
            BoundarySpec::Text(text) => text.parse(),
            BoundarySpec::Values(values) => Boundaries::new(values),
        }
    }
}

impl From<Boundaries> for String {
    fn from(b: Boundaries) -> String {
        b.to_string()
    }
}

impl Boundaries {
    /// Validates and wraps a boundary list.
    ///
    /// # Errors
    ///
    /// [`EliteError::Configuration`] when fewer than two values are given, a value is
    /// NaN, an infinity appears anywhere but the open ends, or the list is not
    /// strictly increasing.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.len() < 2 {
            return Err(EliteError::Configuration(format!(
                "bin boundaries need at least 2 values, got {}",
                values.len()
            )));
        }
        let last = values.len() - 1;
        for (i, &v) in values.iter().enumerate() {
            if v.is_nan() {
                return Err(EliteError::Configuration(format!(
                    "bin boundary {i} is NaN"
                )));
            }
            let allowed_infinite =
                (i == 0 && v == f64::NEG_INFINITY) || (i == last && v == f64::INFINITY);
            if v.is_infinite() && !allowed_infinite {
                return Err(EliteError::Configuration(format!(
                    "bin boundary {i} is {v}; only the first may be -inf and the last +inf"
                )));
            }
        }
        if let Some(w) = values.windows(2).find(|w| w[0] >= w[1]) {
            return Err(EliteError::Configuration(format!(
                "bin boundaries must be strictly increasing, found {} before {}",
                w[0], w[1]
            )));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn bin_count(&self) -> usize {
        self.0.len() - 1
    }

    /// Maps a raw value to its bin, or `None` when it lies outside the covered range.
    pub fn bin(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        // Number of boundaries <= value; the bin is the one opened by the last of them.
        let p = self.0.partition_point(|&b| b <= value);
        let n = self.0.len();
        match p {
            0 => None,
            p if p == n => (self.0[n - 1] == f64::INFINITY).then_some(n - 2),
            p => Some(p - 1),
        }
    }
}

impl FromStr for Boundaries {
    type Err = EliteError;

    fn from_str(s: &str) -> Result<Self> {
        let tokens: Vec<&str> = s.split(',').map(str::trim).collect();
        let last = tokens.len().saturating_sub(1);
        let values = tokens
            .iter()
            .enumerate()
            .map(|(i, tok)| {
                let lower = tok.to_ascii_lowercase();
                let bare_inf = matches!(lower.as_str(), "inf" | "+inf" | "infinity");
                if i == 0 && (bare_inf || lower == "-inf") {
                    Ok(f64::NEG_INFINITY)
                } else if i == last && bare_inf {
                    Ok(f64::INFINITY)
                } else {
                    tok.parse::<f64>().map_err(|_| {
                        EliteError::Configuration(format!(
                            "bin boundary {tok:?} in {s:?} is not a number"
                        ))
                    })
                }
            })
            .collect::<Result<Vec<f64>>>()?;
        Boundaries::new(values)
    }
}

impl fmt::Display for Boundaries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if v.is_infinite() {
                f.write_str("inf")?;
            } else {
                write!(f, "{v}")?;
            }
        }
        Ok(())
    }
}

/// One axis of the behavior space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDimension {
    name: String,
    boundaries: Boundaries,
    kind: FeatureKind,
}

impl FeatureDimension {
    pub fn new(name: impl Into<String>, boundaries: Boundaries, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            boundaries,
            kind,
        }
    }

    pub fn behavior(name: impl Into<String>, boundaries: Boundaries) -> Self {
        Self::new(name, boundaries, FeatureKind::Behavior)
    }

    pub fn constraint(name: impl Into<String>, boundaries: Boundaries) -> Self {
        Self::new(name, boundaries, FeatureKind::Constraint)
    }

    /// Tags the first axis as behavior and every later axis as a constraint axis.
    pub fn positional(dims: Vec<FeatureDimension>) -> Vec<FeatureDimension> {
        dims.into_iter()
            .enumerate()
            .map(|(i, mut d)| {
                d.kind = if i == 0 {
                    FeatureKind::Behavior
                } else {
                    FeatureKind::Constraint
                };
                d
            })
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn boundaries(&self) -> &Boundaries {
        &self.boundaries
    }

    pub fn bin_count(&self) -> usize {
        self.boundaries.bin_count()
    }

    pub fn bin(&self, value: f64) -> Option<usize> {
        self.boundaries.bin(value)
    }

    /// Like [`bin`](Self::bin) but reports uncovered values as an evaluation failure.
    pub fn locate(&self, value: f64) -> Result<usize> {
        self.bin(value).ok_or_else(|| {
            EliteError::Evaluation(format!(
                "value {value} is outside the bins of feature {:?} [{}]",
                self.name, self.boundaries
            ))
        })
    }
}
