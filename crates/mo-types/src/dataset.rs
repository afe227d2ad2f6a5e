//! In-memory feature/label table.

use serde::{Deserialize, Serialize};

/// Tabular dataset: one feature row per sample and a binary label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
}

impl Dataset {
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<u8>) -> Self {
        Self { features, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.first().map_or(0, Vec::len)
    }

    /// Rows selected by `indices`, in the given order.
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Number of samples per class, indexed by label.
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for &label in &self.labels {
            counts[usize::from(label.min(1))] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_keeps_order() {
        let data = Dataset::new(
            vec![vec![0.0], vec![1.0], vec![2.0]],
            vec![0, 1, 0],
        );
        let sub = data.subset(&[2, 0]);
        assert_eq!(sub.features, vec![vec![2.0], vec![0.0]]);
        assert_eq!(sub.labels, vec![0, 0]);
        assert_eq!(data.class_counts(), [2, 1]);
        assert_eq!(data.n_features(), 1);
    }
}
