//! Run configuration and the end-to-end optimization pipeline.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mo_data::{load_dataset, save_evaluations, save_score_history};
use mo_optimizer::{Evaluator, ParameterSpace, SearchMethod, SearchOutcome, SwarmConfig, WorkerPool};
use mo_types::{config_error, ClassifierEvaluation, Dataset, MoResult, ScoreRow, SearchError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::{
    check_space, family_by_name, save_classifier, Classifier, ClassifierFamily,
    CrossValidationScorer,
};
use crate::metrics::BinaryReport;

/// Top-level configuration for an optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Label recorded in the evaluation log.
    pub name: String,

    /// Classifier family to tune: "logistic" or "knn".
    pub classifier: String,

    /// Which search strategy to use: "grid", "random" or "pso".
    pub search: String,

    /// Random-search sample count, or the swarm's evaluation budget.
    pub iterations: usize,

    /// Worker count; negative means every available core.
    pub jobs: i32,

    /// Cross-validation folds.
    pub cv_folds: usize,

    pub seed: u64,

    pub swarm: SwarmConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            name: "classifier".to_string(),
            classifier: "logistic".to_string(),
            search: "grid".to_string(),
            iterations: 50,
            jobs: -1,
            cv_folds: 2,
            seed: 0,
            swarm: SwarmConfig::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn new(name: impl Into<String>, classifier: impl Into<String>, search: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classifier: classifier.into(),
            search: search.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> MoResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| config_error!("cannot open config {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_jobs(mut self, jobs: i32) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = cv_folds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_swarm(mut self, swarm: SwarmConfig) -> Self {
        self.swarm = swarm;
        self
    }

    /// The configured search method with its budget.
    pub fn search_method(&self) -> MoResult<SearchMethod> {
        SearchMethod::from_name(&self.search, self.iterations, self.swarm.clone())
    }

    pub fn validate(&self) -> MoResult<()> {
        if self.jobs == 0 {
            return Err(config_error!("jobs must not be zero (use -1 for all cores)"));
        }
        if self.cv_folds < 2 {
            return Err(config_error!("cv_folds must be at least 2, got {}", self.cv_folds));
        }
        if self.swarm.size == 0 {
            return Err(config_error!("swarm size must be positive"));
        }
        self.search_method()?;
        Ok(())
    }
}

/// Where a run reads its datasets and writes its results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub train: PathBuf,
    pub test: PathBuf,
    pub model: PathBuf,
    /// Sorted score history, if requested.
    pub scores: Option<PathBuf>,
    /// Evaluation log the run's report is appended to, if requested.
    pub evaluations_log: Option<PathBuf>,
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: SearchOutcome,
    pub evaluation: ClassifierEvaluation,
    pub scores: Vec<ScoreRow>,
}

/// Orchestrates search, refit, test-set evaluation and persistence.
pub struct MetaOptimizer {
    config: OptimizerConfig,
    family: Arc<dyn ClassifierFamily>,
    space: ParameterSpace,
}

impl MetaOptimizer {
    /// Optimizer for the configured family over its default space.
    pub fn new(config: OptimizerConfig) -> MoResult<Self> {
        config.validate()?;
        let family = family_by_name(&config.classifier)?;
        let space = family.default_space();
        Ok(Self {
            config,
            family,
            space,
        })
    }

    /// Replace the family's default search space.
    pub fn with_space(mut self, space: ParameterSpace) -> Self {
        self.space = space;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    fn available_method(&self) -> MoResult<SearchMethod> {
        let method = self.config.search_method()?;
        if !method.is_available() {
            return Err(SearchError::Unavailable(format!(
                "{} search was not compiled into this build",
                method.name()
            ))
            .into());
        }
        Ok(method)
    }

    /// Search the space on `train` and refit the winner on all of it.
    pub fn optimize(&self, train: Arc<Dataset>) -> MoResult<(SearchOutcome, Arc<dyn Classifier>)> {
        let method = self.available_method()?;
        check_space(self.family.as_ref(), &self.space)?;

        let scorer = CrossValidationScorer::new(
            Arc::clone(&self.family),
            train,
            self.config.cv_folds,
            self.config.seed,
        )?;
        let evaluator = Evaluator::for_space(&self.space, scorer)?;
        let pool = WorkerPool::new(self.config.jobs)?;

        info!(
            classifier = self.family.name(),
            method = method.name(),
            workers = pool.workers(),
            folds = evaluator.scorer().folds(),
            "optimizing classifier"
        );
        let outcome = method.run(&evaluator, &self.space, &pool, self.config.seed)?;
        let classifier = evaluator.scorer().best_classifier(&outcome.best.candidate)?;
        Ok((outcome, classifier))
    }

    /// Score `classifier` on `test` and log the classification report.
    pub fn evaluate(
        &self,
        classifier: &dyn Classifier,
        outcome: &SearchOutcome,
        test: &Dataset,
    ) -> MoResult<ClassifierEvaluation> {
        let predicted = classifier.predict(&test.features)?;
        let report = BinaryReport::compute(&test.labels, &predicted)?;
        report.log();
        let evaluation =
            report.to_evaluation(&self.config.name, &outcome.method, outcome.best.candidate.clone());
        info!("{}", evaluation);
        Ok(evaluation)
    }

    /// Full run: load, search, refit, test, persist.
    pub fn run(&self, paths: &RunPaths) -> MoResult<RunReport> {
        // fail before any I/O if the method cannot run in this build
        self.available_method()?;

        let train = Arc::new(load_dataset(&paths.train)?);
        let test = load_dataset(&paths.test)?;
        if train.n_features() != test.n_features() {
            return Err(config_error!(
                "training set has {} features but test set has {}",
                train.n_features(),
                test.n_features()
            ));
        }

        let (outcome, classifier) = self.optimize(train)?;
        let evaluation = self.evaluate(classifier.as_ref(), &outcome, &test)?;

        save_classifier(
            &paths.model,
            self.family.as_ref(),
            &outcome.best.candidate,
            classifier.as_ref(),
        )?;
        let scores = match &paths.scores {
            Some(path) => save_score_history(path, &outcome.history)?,
            None => Vec::new(),
        };
        if let Some(log) = &paths.evaluations_log {
            save_evaluations(log, std::slice::from_ref(&evaluation), true)?;
        }

        Ok(RunReport {
            outcome,
            evaluation,
            scores,
        })
    }
}
