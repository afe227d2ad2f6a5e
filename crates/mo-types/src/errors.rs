use thiserror::Error;

/// Main error type for the meta-optimizer
#[derive(Error, Debug)]
pub enum MoError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Dataset and report file errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Dataset not found: {path}")]
    NotFound { path: String },

    #[error("Dataset is empty: {path}")]
    Empty { path: String },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Data parsing error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Invalid class label {label} at line {line}, expected 0 or 1")]
    InvalidLabel { line: usize, label: String },

    #[error("Row width mismatch at line {line}: expected {expected} columns, got {actual}")]
    RowWidth {
        line: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to persist {path}: {message}")]
    PersistFailed { path: String, message: String },
}

/// Search-space and strategy errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Empty search space")]
    EmptySpace,

    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("Duplicate parameter: {0}")]
    DuplicateParameter(String),

    #[error("Parameter {name} has no grid values")]
    NoGridValues { name: String },

    #[error("Parameter {name} has no sampling distribution")]
    NoDistribution { name: String },

    #[error("Invalid domain for parameter {name}: {message}")]
    InvalidDomain { name: String, message: String },

    #[error("Parameter {name} cannot be searched numerically: {message}")]
    NonNumeric { name: String, message: String },

    #[error("Position has {actual} coordinates, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unknown search method: {0}")]
    UnknownMethod(String),

    #[error("Search method unavailable: {0}")]
    Unavailable(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Invalid swarm: {0}")]
    InvalidSwarm(String),

    #[error("Scorer returned an unusable score: {0}")]
    InvalidScore(String),

    #[error("No valid evaluations completed")]
    NoEvaluations,
}

/// Errors raised by classifier factories and scorers
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Unknown classifier family: {0}")]
    UnknownFamily(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Unexpected parameter: {0}")]
    UnexpectedParameter(String),

    #[error("Invalid parameter value for {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Training failed: {message}")]
    TrainingFailed { message: String },

    #[error("Model is not fitted")]
    NotFitted,

    #[error("Feature width mismatch: model expects {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Cannot split {samples} samples into {folds} folds")]
    InsufficientSamples { samples: usize, folds: usize },
}

/// Result type alias for meta-optimizer operations
pub type MoResult<T> = Result<T, MoError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::MoError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::MoError::Config(format!($($arg)*))
    };
}
