//! k-nearest-neighbours classifier with Minkowski distance.

use mo_optimizer::{Distribution, ParameterDef, ParameterSpace, Restriction};
use mo_types::{Candidate, ClassifierError, Dataset, MoError, MoResult, ParameterValue};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classifier::{Classifier, ClassifierFamily};

const PARAMETERS: &[&str] = &["n_neighbors", "p", "distance_weighted"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct KnnState {
    points: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KNearestNeighbors {
    n_neighbors: usize,
    p: f64,
    distance_weighted: bool,
    state: Option<KnnState>,
}

impl KNearestNeighbors {
    pub fn from_parameters(parameters: &Candidate) -> MoResult<Self> {
        parameters.ensure_keys(PARAMETERS)?;
        let n_neighbors = parameters.get_usize("n_neighbors")?;
        let p = parameters.get_f64("p")?;
        if n_neighbors == 0 {
            return Err(ClassifierError::InvalidParameter {
                name: "n_neighbors".into(),
                message: "must be at least 1".into(),
            }
            .into());
        }
        if !(p >= 1.0 && p.is_finite()) {
            return Err(ClassifierError::InvalidParameter {
                name: "p".into(),
                message: format!("Minkowski power {p} must be at least 1"),
            }
            .into());
        }
        Ok(Self {
            n_neighbors,
            p,
            distance_weighted: parameters.get_bool("distance_weighted")?,
            state: None,
        })
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs().powf(self.p))
            .sum::<f64>()
            .powf(1.0 / self.p)
    }

    fn vote(&self, state: &KnnState, row: &[f64]) -> u8 {
        let mut neighbours: Vec<(f64, u8)> = state
            .points
            .iter()
            .zip(&state.labels)
            .map(|(point, &label)| (self.distance(point, row), label))
            .collect();
        // More neighbours than training points falls back to all of them.
        let k = self.n_neighbors.min(neighbours.len());
        if k < neighbours.len() {
            neighbours.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
            neighbours.truncate(k);
        }

        let mut votes = [0.0f64; 2];
        if self.distance_weighted && neighbours.iter().any(|(d, _)| *d == 0.0) {
            // exact matches win outright
            for (_, label) in neighbours.iter().filter(|(d, _)| *d == 0.0) {
                votes[usize::from((*label).min(1))] += 1.0;
            }
        } else {
            for (d, label) in &neighbours {
                let weight = if self.distance_weighted { 1.0 / d } else { 1.0 };
                votes[usize::from((*label).min(1))] += weight;
            }
        }
        u8::from(votes[1] > votes[0])
    }
}

impl Classifier for KNearestNeighbors {
    fn fit(&mut self, data: &Dataset) -> MoResult<()> {
        if data.is_empty() {
            return Err(ClassifierError::TrainingFailed {
                message: "no training samples".into(),
            }
            .into());
        }
        self.state = Some(KnnState {
            points: data.features.clone(),
            labels: data.labels.iter().map(|&l| l.min(1)).collect(),
        });
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> MoResult<Vec<u8>> {
        let state = self.state.as_ref().ok_or(ClassifierError::NotFitted)?;
        let width = state.points.first().map_or(0, Vec::len);
        features
            .par_iter()
            .map(|row| {
                if row.len() != width {
                    return Err(MoError::from(ClassifierError::FeatureMismatch {
                        expected: width,
                        actual: row.len(),
                    }));
                }
                Ok(self.vote(state, row))
            })
            .collect()
    }

    fn to_json(&self) -> MoResult<serde_json::Value> {
        let state = self.state.as_ref().ok_or(ClassifierError::NotFitted)?;
        Ok(serde_json::to_value(state)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KnnFamily;

impl ClassifierFamily for KnnFamily {
    fn name(&self) -> &'static str {
        "knn"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn default_space(&self) -> ParameterSpace {
        ParameterSpace::new()
            .add(
                ParameterDef::new("n_neighbors")
                    .with_grid([1i64, 3, 5, 7, 9])
                    .with_distribution(Distribution::IntUniform { low: 1, high: 15 })
                    .with_restriction(Restriction::at_least(1.0))
                    .with_bounds(1.0, 15.0),
            )
            .add(
                ParameterDef::new("p")
                    .with_grid([1.0, 2.0])
                    .with_distribution(Distribution::Uniform { low: 1.0, high: 3.0 })
                    .with_restriction(Restriction::at_least(1.0))
                    .with_bounds(1.0, 3.0),
            )
            .add(
                ParameterDef::new("distance_weighted")
                    .with_grid([false, true])
                    .with_distribution(Distribution::Choice {
                        values: vec![ParameterValue::Bool(false), ParameterValue::Bool(true)],
                    }),
            )
    }

    fn build(&self, parameters: &Candidate) -> MoResult<Box<dyn Classifier>> {
        Ok(Box::new(KNearestNeighbors::from_parameters(parameters)?))
    }

    fn load(&self, parameters: &Candidate, model: serde_json::Value) -> MoResult<Box<dyn Classifier>> {
        let mut classifier = KNearestNeighbors::from_parameters(parameters)?;
        let state: KnnState = serde_json::from_value(model)?;
        if state.points.len() != state.labels.len() || state.points.is_empty() {
            return Err(ClassifierError::TrainingFailed {
                message: "saved knn model has no usable training points".into(),
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

    fn params(k: i64, weighted: bool) -> Candidate {
        Candidate::new()
            .with("n_neighbors", k)
            .with("p", 2.0)
            .with("distance_weighted", weighted)
    }

    fn line() -> Dataset {
        Dataset::new(
            vec![vec![0.0], vec![1.0], vec![2.0], vec![10.0], vec![11.0]],
            vec![0, 0, 0, 1, 1],
        )
    }

    #[test]
    fn majority_vote() {
        let mut model = KNearestNeighbors::from_parameters(&params(3, false)).unwrap();
        model.fit(&line()).unwrap();
        assert_eq!(model.predict(&[vec![0.5], vec![10.5], vec![8.0]]).unwrap(), vec![0, 1, 1]);
    }

    #[test]
    fn distance_weighting_changes_the_vote() {
        // all five points vote: three distant 0s against two closer 1s
        let data = line();
        let mut plain = KNearestNeighbors::from_parameters(&params(5, false)).unwrap();
        plain.fit(&data).unwrap();
        assert_eq!(plain.predict(&[vec![7.0]]).unwrap(), vec![0]);

        let mut weighted = KNearestNeighbors::from_parameters(&params(5, true)).unwrap();
        weighted.fit(&data).unwrap();
        assert_eq!(weighted.predict(&[vec![7.0]]).unwrap(), vec![1]);
    }

    #[test]
    fn exact_match_wins_when_weighted() {
        let mut model = KNearestNeighbors::from_parameters(&params(5, true)).unwrap();
        model.fit(&line()).unwrap();
        assert_eq!(model.predict(&[vec![10.0]]).unwrap(), vec![1]);
    }

    #[test]
    fn oversized_k_uses_every_point() {
        let mut model = KNearestNeighbors::from_parameters(&params(50, false)).unwrap();
        model.fit(&line()).unwrap();
        assert_eq!(model.predict(&[vec![100.0]]).unwrap(), vec![0]);
    }

    #[test]
    fn swarm_coordinates_are_accepted() {
        let candidate = Candidate::new()
            .with("n_neighbors", 2.6)
            .with("p", 1.4)
            .with("distance_weighted", 0.7);
        let model = KNearestNeighbors::from_parameters(&candidate).unwrap();
        assert_eq!(model.n_neighbors, 3);
        assert!(model.distance_weighted);
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(KNearestNeighbors::from_parameters(&params(0, false)).is_err());
        assert!(KNearestNeighbors::from_parameters(&params(3, false).with("p", 0.5)).is_err());
    }

    #[test]
    fn saved_state_reloads() {
        let mut model = KNearestNeighbors::from_parameters(&params(1, false)).unwrap();
        model.fit(&line()).unwrap();
        let reloaded = KnnFamily.load(&params(1, false), model.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.predict(&[vec![9.0]]).unwrap(), vec![1]);
        assert!(KnnFamily
            .load(&params(1, false), serde_json::json!({"points": [], "labels": []}))
            .is_err());
    }
}
