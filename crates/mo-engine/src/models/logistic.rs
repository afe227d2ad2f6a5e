//! Logistic regression trained by batch gradient descent on standardised
//! features.

use mo_optimizer::{Distribution, ParameterDef, ParameterSpace, Restriction};
use mo_types::{Candidate, ClassifierError, Dataset, MoError, MoResult};
use serde::{Deserialize, Serialize};

use crate::classifier::{Classifier, ClassifierFamily};

const PARAMETERS: &[&str] = &["learning_rate", "epochs", "l2", "threshold"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogisticState {
    weights: Vec<f64>,
    bias: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    learning_rate: f64,
    epochs: usize,
    l2: f64,
    threshold: f64,
    state: Option<LogisticState>,
}

impl LogisticRegression {
    pub fn from_parameters(parameters: &Candidate) -> MoResult<Self> {
        parameters.ensure_keys(PARAMETERS)?;
        let learning_rate = parameters.get_f64("learning_rate")?;
        let l2 = parameters.get_f64("l2")?;
        let threshold = parameters.get_f64("threshold")?;
        let invalid = |name: &str, message: String| ClassifierError::InvalidParameter {
            name: name.to_string(),
            message,
        };
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(invalid("learning_rate", format!("{learning_rate} must be positive")).into());
        }
        if !(l2 >= 0.0 && l2.is_finite()) {
            return Err(invalid("l2", format!("{l2} must be non-negative")).into());
        }
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(invalid("threshold", format!("{threshold} must lie in (0, 1)")).into());
        }
        Ok(Self {
            learning_rate,
            epochs: parameters.get_usize("epochs")?,
            l2,
            threshold,
            state: None,
        })
    }

    /// Probability of the positive class for each row.
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> MoResult<Vec<f64>> {
        let state = self.state.as_ref().ok_or(ClassifierError::NotFitted)?;
        features
            .iter()
            .map(|row| {
                if row.len() != state.weights.len() {
                    return Err(MoError::from(ClassifierError::FeatureMismatch {
                        expected: state.weights.len(),
                        actual: row.len(),
                    }));
                }
                let z = row
                    .iter()
                    .zip(&state.means)
                    .zip(&state.scales)
                    .zip(&state.weights)
                    .map(|(((x, mean), scale), w)| w * (x - mean) / scale)
                    .sum::<f64>()
                    + state.bias;
                Ok(sigmoid(z))
            })
            .collect()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, data: &Dataset) -> MoResult<()> {
        if data.is_empty() {
            return Err(ClassifierError::TrainingFailed {
                message: "no training samples".into(),
            }
            .into());
        }
        let n = data.len() as f64;
        let width = data.n_features();

        let mut means = vec![0.0; width];
        for row in &data.features {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x / n;
            }
        }
        let mut scales = vec![0.0; width];
        for row in &data.features {
            for ((s, x), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (x - m).powi(2) / n;
            }
        }
        for s in scales.iter_mut() {
            *s = if *s > 1e-24 { s.sqrt() } else { 1.0 };
        }

        let standardized: Vec<Vec<f64>> = data
            .features
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&means)
                    .zip(&scales)
                    .map(|((x, m), s)| (x - m) / s)
                    .collect()
            })
            .collect();

        let mut weights = vec![0.0; width];
        let mut bias = 0.0;
        for _ in 0..self.epochs {
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;
            for (row, &label) in standardized.iter().zip(&data.labels) {
                let z = row.iter().zip(&weights).map(|(x, w)| x * w).sum::<f64>() + bias;
                let error = sigmoid(z) - f64::from(label);
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += error * x;
                }
                grad_b += error;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= self.learning_rate * (g / n + self.l2 * *w);
            }
            bias -= self.learning_rate * grad_b / n;
        }

        if !(bias.is_finite() && weights.iter().all(|w| w.is_finite())) {
            return Err(ClassifierError::TrainingFailed {
                message: "gradient descent diverged".into(),
            }
            .into());
        }

        self.state = Some(LogisticState {
            weights,
            bias,
            means,
            scales,
        });
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> MoResult<Vec<u8>> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| u8::from(p >= self.threshold))
            .collect())
    }

    fn to_json(&self) -> MoResult<serde_json::Value> {
        let state = self.state.as_ref().ok_or(ClassifierError::NotFitted)?;
        Ok(serde_json::to_value(state)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticFamily;

impl ClassifierFamily for LogisticFamily {
    fn name(&self) -> &'static str {
        "logistic"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn default_space(&self) -> ParameterSpace {
        ParameterSpace::new()
            .add(
                ParameterDef::new("learning_rate")
                    .with_grid([0.01, 0.1, 1.0])
                    .with_distribution(Distribution::LogUniform { low: 1e-3, high: 1.0 })
                    .with_restriction(Restriction::greater_than(0.0))
                    .with_bounds(1e-3, 1.0),
            )
            .add(
                ParameterDef::new("epochs")
                    .with_grid([200i64])
                    .with_distribution(Distribution::IntUniform { low: 50, high: 500 }),
            )
            .add(
                ParameterDef::new("l2")
                    .with_grid([0.0, 0.01, 0.1])
                    .with_distribution(Distribution::Exponential { loc: 0.0, scale: 0.05 })
                    .with_restriction(Restriction::at_least(0.0))
                    .with_bounds(0.0, 1.0),
            )
            .add(
                ParameterDef::new("threshold")
                    .with_grid([0.3, 0.5, 0.7])
                    .with_distribution(Distribution::Uniform { low: 0.05, high: 0.95 })
                    .with_restriction(Restriction::new("in (0, 1)", |v| v > 0.0 && v < 1.0)),
            )
    }

    fn build(&self, parameters: &Candidate) -> MoResult<Box<dyn Classifier>> {
        Ok(Box::new(LogisticRegression::from_parameters(parameters)?))
    }

    fn load(&self, parameters: &Candidate, model: serde_json::Value) -> MoResult<Box<dyn Classifier>> {
        let mut classifier = LogisticRegression::from_parameters(parameters)?;
        let state: LogisticState = serde_json::from_value(model)?;
        if state.weights.len() != state.means.len() || state.weights.len() != state.scales.len() {
            return Err(ClassifierError::TrainingFailed {
                message: "saved logistic model has inconsistent dimensions".into(),
            }
            .into());
        }
        classifier.state = Some(state);
        Ok(Box::new(classifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(threshold: f64) -> Candidate {
        Candidate::new()
            .with("learning_rate", 0.5)
            .with("epochs", 300i64)
            .with("l2", 0.0)
            .with("threshold", threshold)
    }

    fn separable() -> Dataset {
        let features = vec![
            vec![0.0, 10.0],
            vec![0.5, 11.0],
            vec![1.0, 9.0],
            vec![4.0, 30.0],
            vec![4.5, 31.0],
            vec![5.0, 29.0],
        ];
        Dataset::new(features, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn learns_a_separable_problem() {
        let mut model = LogisticRegression::from_parameters(&params(0.5)).unwrap();
        let data = separable();
        model.fit(&data).unwrap();
        assert_eq!(model.predict(&data.features).unwrap(), data.labels);

        let proba = model.predict_proba(&[vec![5.0, 30.0], vec![0.0, 10.0]]).unwrap();
        assert!(proba[0] > 0.9);
        assert!(proba[1] < 0.1);
    }

    #[test]
    fn constant_feature_does_not_break_scaling() {
        let data = Dataset::new(
            vec![vec![1.0, 0.0], vec![1.0, 1.0], vec![1.0, 2.0], vec![1.0, 3.0]],
            vec![0, 0, 1, 1],
        );
        let mut model = LogisticRegression::from_parameters(&params(0.5)).unwrap();
        model.fit(&data).unwrap();
        assert_eq!(model.predict(&data.features).unwrap(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(LogisticRegression::from_parameters(&params(1.5)).is_err());
        assert!(LogisticRegression::from_parameters(&params(0.5).with("learning_rate", -1.0)).is_err());
        assert!(LogisticRegression::from_parameters(&params(0.5).with("extra", 1i64)).is_err());
    }

    #[test]
    fn unfitted_model_cannot_predict() {
        let model = LogisticRegression::from_parameters(&params(0.5)).unwrap();
        let err = model.predict(&[vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, MoError::Classifier(ClassifierError::NotFitted)));
    }

    #[test]
    fn feature_width_is_checked() {
        let mut model = LogisticRegression::from_parameters(&params(0.5)).unwrap();
        model.fit(&separable()).unwrap();
        assert!(model.predict(&[vec![1.0]]).is_err());
    }

    #[test]
    fn saved_state_reloads() {
        let family = LogisticFamily;
        let mut model = LogisticRegression::from_parameters(&params(0.5)).unwrap();
        let data = separable();
        model.fit(&data).unwrap();

        let json = model.to_json().unwrap();
        let reloaded = family.load(&params(0.5), json).unwrap();
        assert_eq!(reloaded.predict(&data.features).unwrap(), data.labels);
    }
}
