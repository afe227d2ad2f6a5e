//! Classifier boundary: the model and factory traits, stratified k-fold
//! splitting and the cross-validation scorer the search drives.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use mo_data::ModelArtifact;
use mo_optimizer::{CandidateScorer, ParameterSpace};
use mo_types::{Candidate, ClassifierError, Dataset, MoResult};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::metrics::BinaryReport;
use crate::models::{KnnFamily, LogisticFamily};

/// A binary classifier.
pub trait Classifier: Send + Sync + fmt::Debug {
    fn fit(&mut self, data: &Dataset) -> MoResult<()>;

    fn predict(&self, features: &[Vec<f64>]) -> MoResult<Vec<u8>>;

    /// Fitted state, reloadable through [`ClassifierFamily::load`].
    fn to_json(&self) -> MoResult<serde_json::Value>;
}

/// Factory for one kind of classifier.
pub trait ClassifierFamily: Send + Sync {
    fn name(&self) -> &'static str;

    /// The exact parameter set [`ClassifierFamily::build`] accepts.
    fn parameter_names(&self) -> &'static [&'static str];

    /// Grid values, distributions, restrictions and swarm bounds for every
    /// parameter.
    fn default_space(&self) -> ParameterSpace;

    fn build(&self, parameters: &Candidate) -> MoResult<Box<dyn Classifier>>;

    /// Rebuild a fitted classifier from [`Classifier::to_json`] output.
    fn load(&self, parameters: &Candidate, model: serde_json::Value) -> MoResult<Box<dyn Classifier>>;
}

/// Names accepted by [`family_by_name`].
pub const FAMILY_NAMES: &[&str] = &["logistic", "knn"];

pub fn family_by_name(name: &str) -> MoResult<Arc<dyn ClassifierFamily>> {
    match name.to_ascii_lowercase().as_str() {
        "logistic" => Ok(Arc::new(LogisticFamily)),
        "knn" => Ok(Arc::new(KnnFamily)),
        other => Err(ClassifierError::UnknownFamily(other.to_string()).into()),
    }
}

/// Check that `space` declares exactly the family's parameters.
pub fn check_space(family: &dyn ClassifierFamily, space: &ParameterSpace) -> MoResult<()> {
    let required = family.parameter_names();
    for name in required {
        if space.get(name).is_none() {
            return Err(ClassifierError::MissingParameter(name.to_string()).into());
        }
    }
    if let Some(extra) = space.names().into_iter().find(|n| !required.contains(n)) {
        return Err(ClassifierError::UnexpectedParameter(extra.to_string()).into());
    }
    Ok(())
}

pub fn save_classifier<P: AsRef<Path>>(
    path: P,
    family: &dyn ClassifierFamily,
    parameters: &Candidate,
    classifier: &dyn Classifier,
) -> MoResult<()> {
    ModelArtifact::new(family.name(), parameters.clone(), classifier.to_json()?).save(path)
}

/// Load a saved classifier with the family recorded in the file.
pub fn load_classifier<P: AsRef<Path>>(path: P) -> MoResult<(ModelArtifact, Box<dyn Classifier>)> {
    let artifact = ModelArtifact::load(path)?;
    let family = family_by_name(&artifact.family)?;
    let classifier = family.load(&artifact.parameters, artifact.model.clone())?;
    Ok((artifact, classifier))
}

/// Stratified k-fold splitter: each class is spread evenly over the folds.
#[derive(Debug, Clone)]
pub struct StratifiedKFold {
    n_splits: usize,
    random_state: Option<u64>,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            random_state: None,
        }
    }

    /// Shuffle each class with a seeded generator before splitting.
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = Some(random_state);
        self
    }

    /// `(train_indices, test_indices)` for every fold.
    pub fn split(&self, labels: &[u8]) -> MoResult<Vec<(Vec<usize>, Vec<usize>)>> {
        if self.n_splits < 2 || labels.len() < self.n_splits {
            return Err(ClassifierError::InsufficientSamples {
                samples: labels.len(),
                folds: self.n_splits,
            }
            .into());
        }

        let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
        for (i, &label) in labels.iter().enumerate() {
            by_class[usize::from(label.min(1))].push(i);
        }
        if let Some(seed) = self.random_state {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for indices in by_class.iter_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Deal each class round-robin, continuing where the previous class
        // stopped so fold sizes stay balanced.
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        let mut next = 0;
        for indices in &by_class {
            for &i in indices {
                folds[next].push(i);
                next = (next + 1) % self.n_splits;
            }
        }

        Ok((0..self.n_splits)
            .map(|k| {
                let test = folds[k].clone();
                let train = folds
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != k)
                    .flat_map(|(_, fold)| fold.iter().copied())
                    .collect();
                (train, test)
            })
            .collect())
    }
}

/// Scores a candidate by positive-class F1 over stratified folds of the
/// training set, and refits the winner on the whole set on request.
pub struct CrossValidationScorer {
    family: Arc<dyn ClassifierFamily>,
    data: Arc<Dataset>,
    folds: Vec<(Vec<usize>, Vec<usize>)>,
    fitted: Mutex<Option<(Candidate, Arc<dyn Classifier>)>>,
}

impl CrossValidationScorer {
    pub fn new(family: Arc<dyn ClassifierFamily>, data: Arc<Dataset>, cv: usize, seed: u64) -> MoResult<Self> {
        let folds = StratifiedKFold::new(cv)
            .with_random_state(seed)
            .split(&data.labels)?;
        debug!(family = family.name(), folds = folds.len(), samples = data.len(), "cross-validation ready");
        Ok(Self {
            family,
            data,
            folds,
            fitted: Mutex::new(None),
        })
    }

    pub fn family(&self) -> &dyn ClassifierFamily {
        self.family.as_ref()
    }

    pub fn folds(&self) -> usize {
        self.folds.len()
    }

    /// The classifier for `best`, fitted on the full training set. Fitted
    /// once and cached until asked for a different candidate.
    pub fn best_classifier(&self, best: &Candidate) -> MoResult<Arc<dyn Classifier>> {
        let mut fitted = self.fitted.lock();
        if let Some((candidate, classifier)) = fitted.as_ref() {
            if candidate == best {
                return Ok(Arc::clone(classifier));
            }
        }

        info!(family = self.family.name(), parameters = %best, "refitting best classifier on the full training set");
        let mut classifier = self.family.build(best)?;
        classifier.fit(&self.data)?;
        let classifier: Arc<dyn Classifier> = Arc::from(classifier);
        *fitted = Some((best.clone(), Arc::clone(&classifier)));
        Ok(classifier)
    }
}

impl CandidateScorer for CrossValidationScorer {
    fn score(&self, candidate: &Candidate) -> MoResult<Vec<f64>> {
        candidate.ensure_keys(self.family.parameter_names())?;
        self.folds
            .iter()
            .map(|(train, test)| -> MoResult<f64> {
                let mut classifier = self.family.build(candidate)?;
                classifier.fit(&self.data.subset(train))?;
                let held_out = self.data.subset(test);
                let predicted = classifier.predict(&held_out.features)?;
                Ok(BinaryReport::compute(&held_out.labels, &predicted)?.f1_positive())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mo_types::MoError;
    use std::collections::HashSet;

    fn clusters(per_class: usize) -> Dataset {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..per_class {
            let jitter = i as f64 * 0.05;
            features.push(vec![0.0 + jitter, 0.5 - jitter]);
            labels.push(0);
            features.push(vec![5.0 - jitter, 4.5 + jitter]);
            labels.push(1);
        }
        Dataset::new(features, labels)
    }

    #[test]
    fn stratified_folds_partition_and_balance() {
        let labels = [0, 0, 0, 0, 0, 0, 1, 1, 1, 1];
        let folds = StratifiedKFold::new(2).with_random_state(3).split(&labels).unwrap();
        assert_eq!(folds.len(), 2);

        let mut seen = HashSet::new();
        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), labels.len());
            let positives = test.iter().filter(|&&i| labels[i] == 1).count();
            assert_eq!(positives, 2);
            for &i in test {
                assert!(seen.insert(i), "index {i} tested twice");
                assert!(!train.contains(&i));
            }
        }
        assert_eq!(seen.len(), labels.len());
    }

    #[test]
    fn stratified_split_is_seeded() {
        let labels: Vec<u8> = (0..30).map(|i| (i % 3 == 0) as u8).collect();
        let a = StratifiedKFold::new(3).with_random_state(1).split(&labels).unwrap();
        let b = StratifiedKFold::new(3).with_random_state(1).split(&labels).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn too_few_samples_for_folds() {
        assert!(StratifiedKFold::new(3).split(&[0, 1]).is_err());
        assert!(StratifiedKFold::new(1).split(&[0, 1, 0]).is_err());
    }

    #[test]
    fn scorer_returns_one_score_per_fold() {
        let family = family_by_name("knn").unwrap();
        let scorer = CrossValidationScorer::new(family, Arc::new(clusters(10)), 2, 0).unwrap();
        let candidate = Candidate::new()
            .with("n_neighbors", 3i64)
            .with("p", 2.0)
            .with("distance_weighted", false);
        let scores = scorer.score(&candidate).unwrap();
        assert_eq!(scores, vec![1.0, 1.0]);
    }

    #[test]
    fn never_predicting_the_minority_class_scores_zero() {
        // two positives among ten negatives: five neighbours out of six
        // training points never hold a positive majority
        let mut features: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        features.insert(3, vec![3.5]);
        features.insert(8, vec![7.5]);
        let mut labels = vec![0u8; 12];
        labels[3] = 1;
        labels[8] = 1;

        let family = family_by_name("knn").unwrap();
        let scorer =
            CrossValidationScorer::new(family, Arc::new(Dataset::new(features, labels)), 2, 0).unwrap();
        let candidate = Candidate::new()
            .with("n_neighbors", 5i64)
            .with("p", 2.0)
            .with("distance_weighted", false);
        assert_eq!(scorer.score(&candidate).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn scorer_rejects_incomplete_candidates() {
        let family = family_by_name("knn").unwrap();
        let scorer = CrossValidationScorer::new(family, Arc::new(clusters(4)), 2, 0).unwrap();
        let err = scorer.score(&Candidate::new().with("n_neighbors", 3i64)).unwrap_err();
        assert!(matches!(err, MoError::Classifier(ClassifierError::MissingParameter(_))));
        let err = scorer
            .score(
                &Candidate::new()
                    .with("n_neighbors", 3i64)
                    .with("p", 2.0)
                    .with("distance_weighted", false)
                    .with("leaf_size", 30i64),
            )
            .unwrap_err();
        assert!(matches!(err, MoError::Classifier(ClassifierError::UnexpectedParameter(_))));
    }

    #[test]
    fn best_classifier_is_cached() {
        let family = family_by_name("logistic").unwrap();
        let scorer = CrossValidationScorer::new(family, Arc::new(clusters(6)), 2, 0).unwrap();
        let best = Candidate::new()
            .with("learning_rate", 0.5)
            .with("epochs", 100i64)
            .with("l2", 0.0)
            .with("threshold", 0.5);
        let first = scorer.best_classifier(&best).unwrap();
        let second = scorer.best_classifier(&best).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = best.clone().with("threshold", 0.6);
        let third = scorer.best_classifier(&other).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn family_lookup_and_space_check() {
        for name in FAMILY_NAMES {
            let family = family_by_name(name).unwrap();
            assert_eq!(family.name(), *name);
            check_space(family.as_ref(), &family.default_space()).unwrap();
        }
        assert!(family_by_name("svm").is_err());

        let knn = family_by_name("knn").unwrap();
        let logistic_space = family_by_name("logistic").unwrap().default_space();
        assert!(check_space(knn.as_ref(), &logistic_space).is_err());
    }
}
