//! Classifier families shipped with the optimizer.

pub mod knn;
pub mod logistic;

pub use knn::{KNearestNeighbors, KnnFamily};
pub use logistic::{LogisticFamily, LogisticRegression};
