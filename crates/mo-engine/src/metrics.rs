//! Binary classification metrics.

use chrono::Utc;
use mo_types::{validation_error, Candidate, ClassifierEvaluation, MoResult};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Precision, recall and F1 of one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(true_positive: usize, predicted: usize, support: usize) -> Self {
        let precision = ratio(true_positive, predicted);
        let recall = ratio(true_positive, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Undefined ratios (empty denominator) count as zero.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Per-class and support-weighted metrics for 0/1 labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryReport {
    pub accuracy: f64,
    pub negative: ClassMetrics,
    pub positive: ClassMetrics,
}

impl BinaryReport {
    pub fn compute(y_true: &[u8], y_pred: &[u8]) -> MoResult<Self> {
        if y_true.len() != y_pred.len() {
            return Err(validation_error!(
                "{} labels but {} predictions",
                y_true.len(),
                y_pred.len()
            ));
        }
        if y_true.is_empty() {
            return Err(validation_error!("cannot score an empty prediction set"));
        }

        // counts[truth][prediction]
        let mut counts = [[0usize; 2]; 2];
        for (&truth, &predicted) in y_true.iter().zip(y_pred) {
            counts[usize::from(truth.min(1))][usize::from(predicted.min(1))] += 1;
        }
        let support = [counts[0][0] + counts[0][1], counts[1][0] + counts[1][1]];
        let predicted = [counts[0][0] + counts[1][0], counts[0][1] + counts[1][1]];

        Ok(Self {
            accuracy: ratio(counts[0][0] + counts[1][1], y_true.len()),
            negative: ClassMetrics::from_counts(counts[0][0], predicted[0], support[0]),
            positive: ClassMetrics::from_counts(counts[1][1], predicted[1], support[1]),
        })
    }

    fn weighted(&self, metric: impl Fn(&ClassMetrics) -> f64) -> f64 {
        let total = self.negative.support + self.positive.support;
        if total == 0 {
            return 0.0;
        }
        (metric(&self.negative) * self.negative.support as f64
            + metric(&self.positive) * self.positive.support as f64)
            / total as f64
    }

    pub fn precision_weighted(&self) -> f64 {
        self.weighted(|m| m.precision)
    }

    pub fn recall_weighted(&self) -> f64 {
        self.weighted(|m| m.recall)
    }

    pub fn f1_weighted(&self) -> f64 {
        self.weighted(|m| m.f1)
    }

    /// F1 of label 1 alone; the cross-validation objective.
    pub fn f1_positive(&self) -> f64 {
        self.positive.f1
    }

    /// Per-class table, one log line per row.
    pub fn log(&self) {
        info!("{:>14} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support");
        for (label, m) in [("0", &self.negative), ("1", &self.positive)] {
            info!(
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, m.precision, m.recall, m.f1, m.support
            );
        }
        info!(
            "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "weighted avg",
            self.precision_weighted(),
            self.recall_weighted(),
            self.f1_weighted(),
            self.negative.support + self.positive.support
        );
        info!("{:>14} {:>9.4}", "accuracy", self.accuracy);
    }

    pub fn to_evaluation(&self, name: &str, method: &str, parameters: Candidate) -> ClassifierEvaluation {
        ClassifierEvaluation {
            name: name.to_string(),
            method: method.to_string(),
            parameters,
            accuracy: self.accuracy,
            f1_weighted: self.f1_weighted(),
            precision_weighted: self.precision_weighted(),
            recall_weighted: self.recall_weighted(),
            precision_positive: self.positive.precision,
            precision_negative: self.negative.precision,
            recall_positive: self.positive.recall,
            recall_negative: self.negative.recall,
            f1_positive: self.positive.f1,
            f1_negative: self.negative.f1,
            support_positive: self.positive.support,
            support_negative: self.negative.support,
            recorded_at: Utc::now(),
        }
    }
}
