//! Parameter values and fully-specified candidates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::ClassifierError;

/// A concrete hyperparameter value.
///
/// Untagged so candidates serialize as plain JSON objects
/// (`{"n_neighbors": 5, "weighted": true}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    /// Numeric view used by restriction predicates and the swarm.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One assignment of values to classifier hyperparameters.
///
/// Keys are kept ordered so reports and logs are stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(BTreeMap<String, ParameterValue>);

impl Candidate {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParameterValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Fill in fixed defaults for every parameter this candidate does not set.
    pub fn merged_with(mut self, defaults: &Candidate) -> Self {
        for (name, value) in defaults.iter() {
            self.0
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    /// Check that the keys are exactly `required`.
    pub fn ensure_keys(&self, required: &[&str]) -> Result<(), ClassifierError> {
        for name in required {
            if !self.0.contains_key(*name) {
                return Err(ClassifierError::MissingParameter(name.to_string()));
            }
        }
        if let Some(extra) = self.0.keys().find(|k| !required.contains(&k.as_str())) {
            return Err(ClassifierError::UnexpectedParameter(extra.clone()));
        }
        Ok(())
    }

    fn require(&self, name: &str) -> Result<&ParameterValue, ClassifierError> {
        self.0
            .get(name)
            .ok_or_else(|| ClassifierError::MissingParameter(name.to_string()))
    }

    pub fn get_f64(&self, name: &str) -> Result<f64, ClassifierError> {
        let value = self.require(name)?;
        value.as_f64().ok_or_else(|| ClassifierError::InvalidParameter {
            name: name.to_string(),
            message: format!("expected a number, got {value}"),
        })
    }

    /// Integer parameters searched by the swarm arrive as floats and are rounded.
    pub fn get_usize(&self, name: &str) -> Result<usize, ClassifierError> {
        let raw = self.get_f64(name)?;
        let rounded = raw.round();
        if !rounded.is_finite() || rounded < 0.0 {
            return Err(ClassifierError::InvalidParameter {
                name: name.to_string(),
                message: format!("expected a non-negative integer, got {raw}"),
            });
        }
        Ok(rounded as usize)
    }

    /// Numeric values are read as flags with a 0.5 cut-off.
    pub fn get_bool(&self, name: &str) -> Result<bool, ClassifierError> {
        match self.require(name)? {
            ParameterValue::Bool(b) => Ok(*b),
            ParameterValue::Text(s) => Err(ClassifierError::InvalidParameter {
                name: name.to_string(),
                message: format!("expected a flag, got {s:?}"),
            }),
            other => Ok(other.as_f64().unwrap_or(0.0) >= 0.5),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, ParameterValue)> for Candidate {
    fn from_iter<I: IntoIterator<Item = (String, ParameterValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
