//! # mo-engine
//!
//! Classifier meta-optimizer: the classifier families, stratified
//! cross-validation scoring, test-set metrics and [`MetaOptimizer`], which
//! ties search, refit, evaluation and persistence together.

pub mod classifier;
pub mod metrics;
pub mod models;
pub mod optimizer;

pub use classifier::{
    check_space, family_by_name, load_classifier, save_classifier, Classifier, ClassifierFamily,
    CrossValidationScorer, StratifiedKFold, FAMILY_NAMES,
};
pub use metrics::{BinaryReport, ClassMetrics};
pub use models::{KNearestNeighbors, KnnFamily, LogisticFamily, LogisticRegression};
pub use optimizer::{MetaOptimizer, OptimizerConfig, RunPaths, RunReport};
