//! facerec-eval — Evaluation of face embeddings.
//!
//! Turns an ordered list of embeddings and their identity labels into a
//! verification threshold (pairwise distances swept against F1) and into
//! identification accuracies for a k-NN and a linear SVM classifier.

pub mod classify;
pub mod histogram;
pub mod metrics;
pub mod pairs;
pub mod threshold;

pub use classify::{
    fit_and_score, Classifier, ClassifierError, KNearestNeighbors, KnnModel, LabelEncoder,
    LinearSvc, LinearSvcModel, ParitySplit, Predictor, Split,
};
pub use histogram::Histogram;
pub use metrics::{accuracy_score, confusion_matrix, BinaryCounts, ClassificationReport};
pub use pairs::{pairwise_distances, squared_euclidean, EvalError, PairIteration, PairSet};
pub use threshold::{select_threshold, ThresholdRange, ThresholdScore, ThresholdSelection};
