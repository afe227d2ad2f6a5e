//! Evaluation history records and the final per-run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::params::Candidate;

/// One valid (non-penalised) evaluation of a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub candidate: Candidate,
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
}

impl EvaluationRecord {
    pub fn from_folds(candidate: Candidate, fold_scores: Vec<f64>) -> Self {
        let mean_score = mean(&fold_scores);
        Self {
            candidate,
            mean_score,
            fold_scores,
        }
    }

    /// Population standard deviation of the fold scores.
    pub fn std_dev(&self) -> f64 {
        if self.fold_scores.is_empty() {
            return 0.0;
        }
        let n = self.fold_scores.len() as f64;
        let var = self
            .fold_scores
            .iter()
            .map(|s| (s - self.mean_score).powi(2))
            .sum::<f64>()
            / n;
        var.sqrt()
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Best record in `history`: highest mean score, first occurrence on ties.
/// NaN means are never best.
pub fn best_of(history: &[EvaluationRecord]) -> Option<&EvaluationRecord> {
    let mut best: Option<&EvaluationRecord> = None;
    for record in history.iter().filter(|r| !r.mean_score.is_nan()) {
        match best {
            Some(current) if record.mean_score <= current.mean_score => {}
            _ => best = Some(record),
        }
    }
    best
}

/// Best-seen result of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub candidate: Candidate,
    pub score: f64,
}

/// One row of the persisted score report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub mean_score: f64,
    pub half_std: f64,
    pub parameters: Candidate,
    pub fold_scores: Vec<f64>,
}

impl From<&EvaluationRecord> for ScoreRow {
    fn from(record: &EvaluationRecord) -> Self {
        Self {
            mean_score: record.mean_score,
            half_std: record.std_dev() / 2.0,
            parameters: record.candidate.clone(),
            fold_scores: record.fold_scores.clone(),
        }
    }
}

impl fmt::Display for ScoreRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3} (+/-{:.3}) for {} with {:?}",
            self.mean_score, self.half_std, self.parameters, self.fold_scores
        )
    }
}

/// Score rows sorted by descending mean score (stable for ties), NaN last.
pub fn sorted_score_rows(history: &[EvaluationRecord]) -> Vec<ScoreRow> {
    let mut rows: Vec<ScoreRow> = history.iter().map(ScoreRow::from).collect();
    rows.sort_by(|a, b| {
        b.mean_score
            .partial_cmp(&a.mean_score)
            .unwrap_or_else(|| a.mean_score.is_nan().cmp(&b.mean_score.is_nan()))
    });
    rows
}

/// Final test-set report for one optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierEvaluation {
    pub name: String,
    pub method: String,
    pub parameters: Candidate,
    pub accuracy: f64,
    pub f1_weighted: f64,
    pub precision_weighted: f64,
    pub recall_weighted: f64,
    pub precision_positive: f64,
    pub precision_negative: f64,
    pub recall_positive: f64,
    pub recall_negative: f64,
    pub f1_positive: f64,
    pub f1_negative: f64,
    pub support_positive: usize,
    pub support_negative: usize,
    pub recorded_at: DateTime<Utc>,
}

impl fmt::Display for ClassifierEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] accuracy={:.4} f1={:.4} precision={:.4} recall={:.4} params={}",
            self.name,
            self.method,
            self.accuracy,
            self.f1_weighted,
            self.precision_weighted,
            self.recall_weighted,
            self.parameters
        )
    }
}
