//! Objective function: candidate assembly, restriction checks, scoring and
//! shared evaluation history.

use mo_types::{
    best_of, BestResult, Candidate, EvaluationRecord, MoResult, ParameterValue, SearchError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::space::{ParameterSpace, Restriction};

/// Starting magnitude of the constraint-violation penalty.
pub const BASE_PENALTY: f64 = 3.0;

/// Scores a full candidate, returning one score per cross-validation fold.
///
/// This is the boundary to the classifier factory and the cross-validation
/// scorer. Errors propagate out of the search unchanged.
pub trait CandidateScorer: Send + Sync {
    fn score(&self, candidate: &Candidate) -> MoResult<Vec<f64>>;
}

impl<F> CandidateScorer for F
where
    F: Fn(&Candidate) -> MoResult<Vec<f64>> + Send + Sync,
{
    fn score(&self, candidate: &Candidate) -> MoResult<Vec<f64>> {
        self(candidate)
    }
}

/// Fitness over a numeric position vector. Higher is better.
pub trait Objective: Send + Sync {
    fn evaluate(&self, position: &[f64]) -> MoResult<f64>;
}

/// Penalty fitness for a candidate whose restrictions failed.
///
/// Each failing value multiplies the base penalty by `max(|v|, 1)`, so the
/// result is strictly negative and never shrinks as violations accumulate.
/// Saturates at `-f64::MAX`.
pub fn constraint_penalty(failing_values: &[f64]) -> f64 {
    let magnitude = failing_values
        .iter()
        .fold(BASE_PENALTY, |acc, v| acc * v.abs().max(1.0));
    -magnitude.min(f64::MAX)
}

#[derive(Debug, Default)]
struct EvaluationLog {
    history: Vec<EvaluationRecord>,
    best: Option<BestResult>,
}

impl EvaluationLog {
    /// Append and check-and-set the best against the current maximum, under
    /// one lock so both stay consistent.
    fn record(&mut self, record: EvaluationRecord) {
        let improves = match &self.best {
            None => !record.mean_score.is_nan(),
            Some(best) => record.mean_score > best.score,
        };
        if improves {
            self.best = Some(BestResult {
                candidate: record.candidate.clone(),
                score: record.mean_score,
            });
        }
        self.history.push(record);
    }
}

/// The objective function wrapped around a [`CandidateScorer`].
///
/// Safe to call from many workers at once: history and best-result tracking
/// live behind a single mutex.
pub struct Evaluator<S> {
    searched: Vec<String>,
    defaults: Candidate,
    restrictions: HashMap<String, Restriction>,
    scorer: S,
    log: Mutex<EvaluationLog>,
    evaluations: AtomicUsize,
    rejected: AtomicUsize,
}

impl<S: CandidateScorer> Evaluator<S> {
    pub fn new(searched: Vec<String>, defaults: Candidate, scorer: S) -> Self {
        Self {
            searched,
            defaults,
            restrictions: HashMap::new(),
            scorer,
            log: Mutex::new(EvaluationLog::default()),
            evaluations: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        }
    }

    pub fn with_restriction(mut self, name: impl Into<String>, restriction: Restriction) -> Self {
        self.restrictions.insert(name.into(), restriction);
        self
    }

    /// Build an evaluator for `space`: multi-valued parameters are searched,
    /// single-valued ones become fixed defaults, and every declared
    /// restriction is installed.
    pub fn for_space(space: &ParameterSpace, scorer: S) -> MoResult<Self> {
        space.validate()?;
        let searched = space.searched().iter().map(|p| p.name.clone()).collect();
        let mut evaluator = Self::new(searched, space.fixed_defaults(), scorer);
        for param in &space.parameters {
            if let Some(restriction) = &param.restriction {
                evaluator
                    .restrictions
                    .insert(param.name.clone(), restriction.clone());
            }
        }
        Ok(evaluator)
    }

    pub fn searched_names(&self) -> &[String] {
        &self.searched
    }

    pub fn defaults(&self) -> &Candidate {
        &self.defaults
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    /// Score a position over the searched parameters, in order.
    pub fn evaluate(&self, position: &[f64]) -> MoResult<f64> {
        if position.len() != self.searched.len() {
            return Err(SearchError::DimensionMismatch {
                expected: self.searched.len(),
                actual: position.len(),
            }
            .into());
        }
        let partial: Candidate = self
            .searched
            .iter()
            .zip(position)
            .map(|(name, &value)| (name.clone(), ParameterValue::Float(value)))
            .collect();
        self.evaluate_candidate(partial)
    }

    /// Score a candidate that names its values directly. Missing parameters
    /// are filled from the fixed defaults.
    pub fn evaluate_candidate(&self, partial: Candidate) -> MoResult<f64> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let failing: Vec<f64> = partial
            .iter()
            .filter_map(|(name, value)| {
                let restriction = self.restrictions.get(name)?;
                let numeric = value.as_f64()?;
                (!restriction.allows(numeric)).then_some(numeric)
            })
            .collect();

        let candidate = partial.merged_with(&self.defaults);

        if !failing.is_empty() {
            let penalty = constraint_penalty(&failing);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(candidate = %candidate, penalty, "candidate violates restrictions");
            return Ok(penalty);
        }

        let fold_scores = self.scorer.score(&candidate)?;
        if fold_scores.is_empty() || fold_scores.iter().any(|s| !s.is_finite()) {
            return Err(SearchError::InvalidScore(format!(
                "fold scores {fold_scores:?} for {candidate}"
            ))
            .into());
        }
        let record = EvaluationRecord::from_folds(candidate, fold_scores);
        let fitness = record.mean_score;
        debug!(candidate = %record.candidate, fitness, "evaluated candidate");

        self.log.lock().record(record);
        Ok(fitness)
    }

    /// Snapshot of the valid evaluations so far, in completion order.
    pub fn history(&self) -> Vec<EvaluationRecord> {
        self.log.lock().history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.log.lock().history.len()
    }

    pub fn best(&self) -> Option<BestResult> {
        self.log.lock().best.clone()
    }

    /// Every call so far, penalised ones included.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Re-derive the best from history; always equals [`Evaluator::best`].
    pub fn best_from_history(&self) -> Option<BestResult> {
        let log = self.log.lock();
        best_of(&log.history).map(|record| BestResult {
            candidate: record.candidate.clone(),
            score: record.mean_score,
        })
    }
}

impl<S: CandidateScorer> Objective for Evaluator<S> {
    fn evaluate(&self, position: &[f64]) -> MoResult<f64> {
        Evaluator::evaluate(self, position)
    }
}
