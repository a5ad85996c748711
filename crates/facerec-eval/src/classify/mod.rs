//! Identity classifiers over embedding matrices.
//!
//! [`Classifier`] fits a model on labelled rows; the resulting [`Predictor`]
//! labels new rows. Labels are dense class indices from a [`LabelEncoder`].
//! The estimators themselves come from linfa; this module adapts the
//! embedding matrices to its `f64` records.

mod encoder;
mod knn;
mod split;
mod svm;

pub use encoder::LabelEncoder;
pub use knn::{KNearestNeighbors, KnnModel};
pub use split::{ParitySplit, Split};
pub use svm::{LinearSvc, LinearSvcModel};

use crate::metrics::accuracy_score;
use ndarray::ArrayView2;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ClassifierError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("{samples} samples but {labels} labels")]
    LengthMismatch { samples: usize, labels: usize },
    #[error("feature dimension mismatch: model has {expected}, input has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("need samples of at least 2 classes, got {0}")]
    TooFewClasses(usize),
    #[error("unknown label: {0}")]
    UnknownLabel(String),
    #[error("{stage}: {message}")]
    Backend { stage: &'static str, message: String },
}

impl ClassifierError {
    fn backend(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            stage,
            message: err.to_string(),
        }
    }
}

/// A supervised learner: fit on `(x, y)` and produce a predictor.
pub trait Classifier {
    type Model: Predictor;

    fn fit(&self, x: ArrayView2<'_, f32>, y: &[usize]) -> Result<Self::Model, ClassifierError>;
}

/// A fitted model.
pub trait Predictor {
    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<usize>, ClassifierError>;

    /// Accuracy of `predict(x)` against `y`.
    fn score(&self, x: ArrayView2<'_, f32>, y: &[usize]) -> Result<f64, ClassifierError> {
        if x.nrows() != y.len() {
            return Err(ClassifierError::LengthMismatch {
                samples: x.nrows(),
                labels: y.len(),
            });
        }
        Ok(accuracy_score(y, &self.predict(x)?))
    }
}

fn check_training_set(x: &ArrayView2<'_, f32>, y: &[usize]) -> Result<(), ClassifierError> {
    if x.nrows() != y.len() {
        return Err(ClassifierError::LengthMismatch {
            samples: x.nrows(),
            labels: y.len(),
        });
    }
    if x.nrows() == 0 {
        return Err(ClassifierError::EmptyTrainingSet);
    }
    Ok(())
}

/// Copy rows into the `f64` records linfa estimators take.
fn to_records(x: &ArrayView2<'_, f32>) -> Result<ndarray_linfa::Array2<f64>, ClassifierError> {
    ndarray_linfa::Array2::from_shape_vec(x.dim(), x.iter().map(|&v| f64::from(v)).collect())
        .map_err(|e| ClassifierError::backend("records", e))
}

fn check_dim(expected: usize, x: &ArrayView2<'_, f32>) -> Result<(), ClassifierError> {
    if x.ncols() != expected {
        return Err(ClassifierError::DimensionMismatch {
            expected,
            actual: x.ncols(),
        });
    }
    Ok(())
}

/// Fit on the training half of `split` and score on its test half.
pub fn fit_and_score<C: Classifier>(
    classifier: &C,
    split: &Split,
) -> Result<(C::Model, f64), ClassifierError> {
    let model = classifier.fit(split.x_train.view(), &split.y_train)?;
    let accuracy = model.score(split.x_test.view(), &split.y_test)?;
    Ok((model, accuracy))
}
