use super::{check_dim, check_training_set, to_records, Classifier, ClassifierError, Predictor};
use linfa_nn::distance::L2Dist;
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour};
use ndarray::ArrayView2;
use ndarray_linfa::Array2;
use std::collections::BTreeMap;

/// k-nearest-neighbor classifier with Euclidean distance and majority vote.
#[derive(Debug, Clone, Copy)]
pub struct KNearestNeighbors {
    pub k: usize,
}

impl Default for KNearestNeighbors {
    fn default() -> Self {
        Self { k: 1 }
    }
}

/// Stored training records; neighbors come from a linfa linear-search index.
#[derive(Debug, Clone)]
pub struct KnnModel {
    k: usize,
    records: Array2<f64>,
    y: Vec<usize>,
}

impl Classifier for KNearestNeighbors {
    type Model = KnnModel;

    fn fit(&self, x: ArrayView2<'_, f32>, y: &[usize]) -> Result<KnnModel, ClassifierError> {
        check_training_set(&x, y)?;
        Ok(KnnModel {
            k: self.k.clamp(1, y.len()),
            records: to_records(&x)?,
            y: y.to_vec(),
        })
    }
}

impl KnnModel {
    pub fn k(&self) -> usize {
        self.k
    }
}

/// Most frequent label; ties go to the smaller label.
fn majority(labels: impl IntoIterator<Item = usize>) -> Option<usize> {
    let mut votes = BTreeMap::new();
    for label in labels {
        *votes.entry(label).or_insert(0usize) += 1;
    }
    // max_by_key keeps the last maximum, so walk labels from the top down
    votes.into_iter().rev().max_by_key(|&(_, n)| n).map(|(label, _)| label)
}

impl Predictor for KnnModel {
    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<usize>, ClassifierError> {
        check_dim(self.records.ncols(), &x)?;
        let index = CommonNearestNeighbour::LinearSearch
            .from_batch(&self.records, L2Dist)
            .map_err(|e| ClassifierError::backend("knn index", e))?;

        let queries = to_records(&x)?;
        queries
            .outer_iter()
            .map(|row| {
                let neighbors = index
                    .k_nearest(row, self.k)
                    .map_err(|e| ClassifierError::backend("knn query", e))?;
                majority(neighbors.into_iter().map(|(_, i)| self.y[i]))
                    .ok_or_else(|| ClassifierError::backend("knn query", "no neighbors returned"))
            })
            .collect()
    }
}
