//! Pairwise distance evaluation over an ordered embedding list.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EvalError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("{embeddings} embeddings but {labels} identity labels")]
    LengthMismatch { embeddings: usize, labels: usize },
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

/// Which index pairs the evaluator visits, and in what order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairIteration {
    /// `i` in `0..n-1`, `j` in `1..n`: ordered pairs including the symmetric
    /// duplicates and the `i == j` pairs this range produces for `i >= 1`.
    #[default]
    Reference,
    /// Every unordered pair once, `i < j`, in lexicographic order.
    UniqueUnordered,
}

impl PairIteration {
    fn inner_range(self, i: usize, n: usize) -> std::ops::Range<usize> {
        match self {
            PairIteration::Reference => 1..n,
            PairIteration::UniqueUnordered => (i + 1)..n,
        }
    }

    /// Index pairs in iteration order.
    pub fn pairs(self, n: usize) -> impl Iterator<Item = (usize, usize)> {
        (0..n.saturating_sub(1)).flat_map(move |i| self.inner_range(i, n).map(move |j| (i, j)))
    }

    /// Number of pairs visited for `n` samples.
    pub fn count(self, n: usize) -> usize {
        if n < 2 {
            return 0;
        }
        match self {
            PairIteration::Reference => (n - 1) * (n - 1),
            PairIteration::UniqueUnordered => n * (n - 1) / 2,
        }
    }
}

/// Squared Euclidean distance `Σ (a_k − b_k)²`.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> Result<f32, EvalError> {
    if a.len() != b.len() {
        return Err(EvalError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(squared_euclidean_unchecked(a, b))
}

fn squared_euclidean_unchecked(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Parallel `distances` / `identical` sequences, one entry per visited pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PairSet {
    pub distances: Vec<f32>,
    /// 1 when both samples share an identity, else 0.
    pub identical: Vec<u8>,
}

impl PairSet {
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    fn distances_where(&self, label: u8) -> Vec<f32> {
        self.distances
            .iter()
            .zip(&self.identical)
            .filter(|(_, &l)| l == label)
            .map(|(&d, _)| d)
            .collect()
    }

    /// Distances of same-identity pairs.
    pub fn positive_distances(&self) -> Vec<f32> {
        self.distances_where(1)
    }

    /// Distances of different-identity pairs.
    pub fn negative_distances(&self) -> Vec<f32> {
        self.distances_where(0)
    }
}

/// Compute distances and identity-match labels for every pair visited by `iteration`.
///
/// Pairs are evaluated on the rayon pool; output order is the iteration order.
pub fn pairwise_distances<E, L>(
    embeddings: &[E],
    identities: &[L],
    iteration: PairIteration,
) -> Result<PairSet, EvalError>
where
    E: AsRef<[f32]> + Sync,
    L: PartialEq + Sync,
{
    if embeddings.len() != identities.len() {
        return Err(EvalError::LengthMismatch {
            embeddings: embeddings.len(),
            labels: identities.len(),
        });
    }

    let expected = embeddings.first().map(|e| e.as_ref().len()).unwrap_or(0);
    if let Some(bad) = embeddings.iter().find(|e| e.as_ref().len() != expected) {
        return Err(EvalError::DimensionMismatch {
            expected,
            actual: bad.as_ref().len(),
        });
    }

    let n = embeddings.len();
    let scored: Vec<(f32, u8)> = (0..n.saturating_sub(1))
        .into_par_iter()
        .flat_map_iter(|i| {
            iteration.inner_range(i, n).map(move |j| {
                let d = squared_euclidean_unchecked(embeddings[i].as_ref(), embeddings[j].as_ref());
                (d, u8::from(identities[i] == identities[j]))
            })
        })
        .collect();

    let (distances, identical): (Vec<f32>, Vec<u8>) = scored.into_iter().unzip();
    tracing::debug!(samples = n, pairs = distances.len(), ?iteration, "pairwise distances computed");

    Ok(PairSet {
        distances,
        identical,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_euclidean() {
        assert_eq!(squared_euclidean(&[0.0, 0.0], &[3.0, 4.0]).unwrap(), 25.0);
        assert_eq!(squared_euclidean(&[1.5, -2.0], &[1.5, -2.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_squared_euclidean_symmetric() {
        let a = [0.1, 0.7, -0.3];
        let b = [0.4, -0.2, 0.9];
        assert_eq!(squared_euclidean(&a, &b).unwrap(), squared_euclidean(&b, &a).unwrap());
    }

    #[test]
    fn test_squared_euclidean_dimension_mismatch() {
        assert_eq!(
            squared_euclidean(&[1.0, 2.0], &[1.0, 2.0, 3.0]),
            Err(EvalError::DimensionMismatch { expected: 2, actual: 3 })
        );
    }

    #[test]
    fn test_reference_iteration_order() {
        let pairs: Vec<_> = PairIteration::Reference.pairs(3).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 1), (1, 2)]);
        assert_eq!(PairIteration::Reference.count(3), 4);
    }

    #[test]
    fn test_unique_iteration_order() {
        let pairs: Vec<_> = PairIteration::UniqueUnordered.pairs(4).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
        assert_eq!(PairIteration::UniqueUnordered.count(4), 6);
    }

    #[test]
    fn test_iteration_small_inputs() {
        for mode in [PairIteration::Reference, PairIteration::UniqueUnordered] {
            assert_eq!(mode.pairs(0).count(), 0);
            assert_eq!(mode.pairs(1).count(), 0);
            assert_eq!(mode.count(1), 0);
        }
    }

    #[test]
    fn test_unique_pairs_scenario() {
        let embeddings = vec![vec![0.0, 0.0], vec![0.0, 0.0], vec![3.0, 4.0]];
        let identities = ["A", "A", "B"];
        let set = pairwise_distances(&embeddings, &identities, PairIteration::UniqueUnordered).unwrap();
        assert_eq!(set.distances, vec![0.0, 25.0, 25.0]);
        assert_eq!(set.identical, vec![1, 0, 0]);
    }

    #[test]
    fn test_reference_pairs_scenario() {
        let embeddings = vec![vec![0.0, 0.0], vec![0.0, 0.0], vec![3.0, 4.0]];
        let identities = ["A", "A", "B"];
        let set = pairwise_distances(&embeddings, &identities, PairIteration::Reference).unwrap();
        // (0,1) (0,2) (1,1) (1,2)
        assert_eq!(set.distances, vec![0.0, 25.0, 0.0, 25.0]);
        assert_eq!(set.identical, vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_parallel_order_matches_sequential() {
        let n = 40;
        let embeddings: Vec<Vec<f32>> = (0..n).map(|i| vec![i as f32, (i * i % 7) as f32]).collect();
        let identities: Vec<usize> = (0..n).map(|i| i % 5).collect();

        for mode in [PairIteration::Reference, PairIteration::UniqueUnordered] {
            let set = pairwise_distances(&embeddings, &identities, mode).unwrap();
            let expected: Vec<f32> = mode
                .pairs(n)
                .map(|(i, j)| squared_euclidean(&embeddings[i], &embeddings[j]).unwrap())
                .collect();
            assert_eq!(set.distances, expected);
            assert_eq!(set.len(), mode.count(n));
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let embeddings = vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]];
        let err = pairwise_distances(&embeddings, &["A", "B"], PairIteration::Reference).unwrap_err();
        assert_eq!(err, EvalError::DimensionMismatch { expected: 2, actual: 3 });
    }

    #[test]
    fn test_label_count_mismatch() {
        let embeddings = vec![vec![1.0], vec![2.0]];
        let err = pairwise_distances(&embeddings, &["A"], PairIteration::Reference).unwrap_err();
        assert_eq!(err, EvalError::LengthMismatch { embeddings: 2, labels: 1 });
    }

    #[test]
    fn test_positive_negative_split() {
        let set = PairSet {
            distances: vec![0.1, 0.9, 0.2, 1.4],
            identical: vec![1, 0, 1, 0],
        };
        assert_eq!(set.positive_distances(), vec![0.1, 0.2]);
        assert_eq!(set.negative_distances(), vec![0.9, 1.4]);
    }
}
