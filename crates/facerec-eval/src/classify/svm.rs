//! Linear support vector classifier.
//!
//! One linfa C-SVC with a linear kernel is trained per class against the
//! rest, each calibrated to a probability by Platt scaling. A row gets the
//! class whose model is most confident.

use super::{check_dim, check_training_set, to_records, Classifier, ClassifierError, Predictor};
use linfa::composing::MultiClassModel;
use linfa::dataset::Pr;
use linfa::prelude::*;
use linfa::Dataset;
use linfa_svm::Svm;
use ndarray::ArrayView2;
use ndarray_linfa::{Array1, Array2};
use std::collections::BTreeSet;
use tracing::debug;

pub const DEFAULT_C: f64 = 1.0;
pub const DEFAULT_TOL: f64 = 1e-3;

#[derive(Debug, Clone, Copy)]
pub struct LinearSvc {
    /// Penalty on margin violations, applied to both sides of each binary model.
    pub c: f64,
    /// Solver stopping tolerance.
    pub tol: f64,
}

impl Default for LinearSvc {
    fn default() -> Self {
        Self {
            c: DEFAULT_C,
            tol: DEFAULT_TOL,
        }
    }
}

pub struct LinearSvcModel {
    model: MultiClassModel<Array2<f64>, usize>,
    classes: Vec<usize>,
    dim: usize,
}

impl std::fmt::Debug for LinearSvcModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearSvcModel")
            .field("classes", &self.classes)
            .field("dim", &self.dim)
            .finish_non_exhaustive()
    }
}

impl LinearSvcModel {
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Labels seen during training, ascending.
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }
}

impl Predictor for LinearSvcModel {
    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<usize>, ClassifierError> {
        check_dim(self.dim, &x)?;
        let records = to_records(&x)?;
        let labels: Array1<usize> = self.model.predict(&records);
        Ok(labels.to_vec())
    }
}

impl Classifier for LinearSvc {
    type Model = LinearSvcModel;

    fn fit(&self, x: ArrayView2<'_, f32>, y: &[usize]) -> Result<LinearSvcModel, ClassifierError> {
        check_training_set(&x, y)?;

        let classes: BTreeSet<usize> = y.iter().copied().collect();
        if classes.len() < 2 {
            return Err(ClassifierError::TooFewClasses(classes.len()));
        }

        let dataset = Dataset::new(to_records(&x)?, Array1::from(y.to_vec()));
        let params = Svm::<f64, Pr>::params()
            .pos_neg_weights(self.c, self.c)
            .eps(self.tol)
            .linear_kernel();

        let models = dataset
            .one_vs_all()
            .map_err(|e| ClassifierError::backend("svm one-vs-rest", e))?
            .into_iter()
            .map(|(label, binary)| {
                params
                    .fit(&binary)
                    .map(|model| (label, model))
                    .map_err(|e| ClassifierError::backend("svm fit", e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(classes = classes.len(), dim = x.ncols(), samples = y.len(), "linear SVC fitted");
        Ok(LinearSvcModel {
            model: models.into_iter().collect(),
            classes: classes.into_iter().collect(),
            dim: x.ncols(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn clusters() -> (ndarray::Array2<f32>, Vec<usize>) {
        let x = array![
            [0.0f32, 0.0],
            [0.2, 0.1],
            [0.1, 0.3],
            [0.3, 0.2],
            [5.0, 5.0],
            [5.2, 4.9],
            [4.8, 5.1],
            [5.1, 5.3],
            [0.0, 5.0],
            [0.2, 5.3],
            [-0.1, 4.8],
            [0.1, 5.1],
        ];
        (x, vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2])
    }

    #[test]
    fn test_separable_multiclass() {
        let (x, y) = clusters();
        let model = LinearSvc::default().fit(x.view(), &y).unwrap();
        assert_eq!(model.n_classes(), 3);
        assert_eq!(model.classes(), &[0, 1, 2]);
        assert_eq!(model.predict(x.view()).unwrap(), y);
        assert_eq!(model.score(x.view(), &y).unwrap(), 1.0);
    }

    #[test]
    fn test_binary() {
        let x = array![[-2.0f32], [-1.5], [-1.0], [1.0], [1.5], [2.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let model = LinearSvc::default().fit(x.view(), &y).unwrap();
        assert_eq!(model.n_classes(), 2);
        assert_eq!(model.predict(array![[-3.0f32], [3.0]].view()).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_refit_gives_same_predictions() {
        let (x, y) = clusters();
        let queries = array![[0.4f32, 0.4], [4.5, 4.5], [0.3, 4.4], [2.6, 2.4]];
        let a = LinearSvc::default().fit(x.view(), &y).unwrap();
        let b = LinearSvc::default().fit(x.view(), &y).unwrap();
        assert_eq!(a.predict(queries.view()).unwrap(), b.predict(queries.view()).unwrap());
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[0.0f32], [1.0]];
        assert_eq!(
            LinearSvc::default().fit(x.view(), &[3, 3]).unwrap_err(),
            ClassifierError::TooFewClasses(1)
        );
    }

    #[test]
    fn test_predict_dim_checked() {
        let (x, y) = clusters();
        let model = LinearSvc::default().fit(x.view(), &y).unwrap();
        assert_eq!(
            model.predict(array![[1.0f32]].view()).unwrap_err(),
            ClassifierError::DimensionMismatch { expected: 2, actual: 1 }
        );
    }
}
