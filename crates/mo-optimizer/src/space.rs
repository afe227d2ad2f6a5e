//! Search space definitions: grid values, sampling distributions and
//! per-parameter restrictions.

use mo_types::{Candidate, MoResult, ParameterValue, SearchError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Distribution a parameter is sampled from by random and swarm search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    /// Continuous uniform range [low, high].
    Uniform { low: f64, high: f64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntUniform { low: i64, high: i64 },
    /// Exponential with the given scale, shifted by `loc`.
    Exponential { loc: f64, scale: f64 },
    /// Categorical choices.
    Choice { values: Vec<ParameterValue> },
}

impl Distribution {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match self {
            Self::Uniform { low, high } => ParameterValue::Float(rng.random_range(*low..=*high)),
            Self::LogUniform { low, high } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp())
            }
            Self::IntUniform { low, high } => ParameterValue::Int(rng.random_range(*low..=*high)),
            Self::Exponential { loc, scale } => {
                let u: f64 = rng.random();
                ParameterValue::Float(loc - scale * (1.0 - u).ln())
            }
            Self::Choice { values } => values[rng.random_range(0..values.len())].clone(),
        }
    }

    fn validate(&self, name: &str) -> Result<(), SearchError> {
        let invalid = |message: String| SearchError::InvalidDomain {
            name: name.to_string(),
            message,
        };
        match self {
            Self::Uniform { low, high } if !(low <= high) => {
                Err(invalid(format!("uniform range [{low}, {high}] is empty")))
            }
            Self::LogUniform { low, high } if !(*low > 0.0 && low <= high) => Err(invalid(
                format!("log-uniform range [{low}, {high}] must be positive and ordered"),
            )),
            Self::IntUniform { low, high } if low > high => {
                Err(invalid(format!("integer range [{low}, {high}] is empty")))
            }
            Self::Exponential { scale, .. } if !(*scale > 0.0) => {
                Err(invalid(format!("exponential scale {scale} must be positive")))
            }
            Self::Choice { values } if values.is_empty() => {
                Err(invalid("choice distribution has no values".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Validity predicate over a parameter's numeric value.
#[derive(Clone)]
pub struct Restriction {
    label: String,
    predicate: Arc<dyn Fn(f64) -> bool + Send + Sync>,
}

impl Restriction {
    pub fn new(label: impl Into<String>, predicate: impl Fn(f64) -> bool + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn greater_than(bound: f64) -> Self {
        Self::new(format!("> {bound}"), move |v| v > bound)
    }

    pub fn at_least(bound: f64) -> Self {
        Self::new(format!(">= {bound}"), move |v| v >= bound)
    }

    pub fn between(low: f64, high: f64) -> Self {
        Self::new(format!("in [{low}, {high}]"), move |v| (low..=high).contains(&v))
    }

    pub fn allows(&self, value: f64) -> bool {
        (self.predicate)(value)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Restriction").field(&self.label).finish()
    }
}

/// A single parameter dimension in the search space.
#[derive(Debug, Clone)]
pub struct ParameterDef {
    pub name: String,
    /// Enumerated values for grid search, in order.
    pub grid: Vec<ParameterValue>,
    pub distribution: Option<Distribution>,
    pub restriction: Option<Restriction>,
    /// Swarm boundaries for this coordinate.
    pub bounds: (f64, f64),
}

impl ParameterDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grid: Vec::new(),
            distribution: None,
            restriction: None,
            bounds: (0.0, 1.0),
        }
    }

    pub fn with_grid<V: Into<ParameterValue>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.grid = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    pub fn with_restriction(mut self, restriction: Restriction) -> Self {
        self.restriction = Some(restriction);
        self
    }

    pub fn with_bounds(mut self, low: f64, high: f64) -> Self {
        self.bounds = (low, high);
        self
    }

    /// Number of distinct grid values.
    pub fn distinct_grid_values(&self) -> usize {
        let mut distinct: Vec<&ParameterValue> = Vec::with_capacity(self.grid.len());
        for value in &self.grid {
            if !distinct.contains(&value) {
                distinct.push(value);
            }
        }
        distinct.len()
    }

    /// Whether the swarm searches this parameter; single-valued grids are
    /// held constant instead.
    pub fn is_searched(&self) -> bool {
        self.distinct_grid_values() != 1
    }

    /// Draw a value for random search. Falls back to a uniform pick from the
    /// grid when no distribution is configured.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> MoResult<ParameterValue> {
        match (&self.distribution, self.grid.is_empty()) {
            (Some(distribution), _) => Ok(distribution.sample(rng)),
            (None, false) => Ok(self.grid[rng.random_range(0..self.grid.len())].clone()),
            (None, true) => Err(SearchError::NoDistribution {
                name: self.name.clone(),
            }
            .into()),
        }
    }

    /// Draw a numeric starting coordinate for the swarm.
    pub fn sample_coordinate<R: Rng + ?Sized>(&self, rng: &mut R) -> MoResult<f64> {
        let value = self.sample(rng)?;
        value.as_f64().ok_or_else(|| {
            SearchError::NonNumeric {
                name: self.name.clone(),
                message: format!("sampled value {value} is not a number"),
            }
            .into()
        })
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, Default)]
pub struct ParameterSpace {
    pub parameters: Vec<ParameterDef>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add(mut self, parameter: ParameterDef) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Reject empty spaces, duplicate names, unusable distributions and
    /// inverted bounds.
    pub fn validate(&self) -> MoResult<()> {
        if self.parameters.is_empty() {
            return Err(SearchError::EmptySpace.into());
        }
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(SearchError::DuplicateParameter(param.name.clone()).into());
            }
            if let Some(distribution) = &param.distribution {
                distribution.validate(&param.name)?;
            }
            let (low, high) = param.bounds;
            if !(low <= high) {
                return Err(SearchError::InvalidDomain {
                    name: param.name.clone(),
                    message: format!("bounds [{low}, {high}] are inverted"),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Total number of grid points (`None` if a parameter has no grid values
    /// or the product overflows).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            if param.grid.is_empty() {
                return None;
            }
            total = total.checked_mul(param.grid.len())?;
        }
        Some(total)
    }

    /// Parameters the swarm moves through, in declaration order.
    pub fn searched(&self) -> Vec<&ParameterDef> {
        self.parameters.iter().filter(|p| p.is_searched()).collect()
    }

    /// Values of the single-valued parameters, held constant during a search.
    pub fn fixed_defaults(&self) -> Candidate {
        self.parameters
            .iter()
            .filter(|p| !p.is_searched())
            .map(|p| (p.name.clone(), p.grid[0].clone()))
            .collect()
    }
}
