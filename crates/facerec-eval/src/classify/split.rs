use super::ClassifierError;
use ndarray::{Array2, ArrayView2, Axis};

/// Deterministic train/test partition by sample index parity:
/// odd indices train, even indices test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParitySplit;

impl ParitySplit {
    pub fn train_indices(&self, n: usize) -> Vec<usize> {
        (0..n).filter(|i| i % 2 != 0).collect()
    }

    pub fn test_indices(&self, n: usize) -> Vec<usize> {
        (0..n).filter(|i| i % 2 == 0).collect()
    }

    pub fn split(&self, x: ArrayView2<'_, f32>, y: &[usize]) -> Result<Split, ClassifierError> {
        if x.nrows() != y.len() {
            return Err(ClassifierError::LengthMismatch {
                samples: x.nrows(),
                labels: y.len(),
            });
        }
        let train_indices = self.train_indices(y.len());
        let test_indices = self.test_indices(y.len());
        Ok(Split {
            x_train: x.select(Axis(0), &train_indices),
            y_train: train_indices.iter().map(|&i| y[i]).collect(),
            x_test: x.select(Axis(0), &test_indices),
            y_test: test_indices.iter().map(|&i| y[i]).collect(),
            train_indices,
            test_indices,
        })
    }
}

/// Rows and labels of both partitions, with their original sample indices.
#[derive(Debug, Clone)]
pub struct Split {
    pub x_train: Array2<f32>,
    pub y_train: Vec<usize>,
    pub x_test: Array2<f32>,
    pub y_test: Vec<usize>,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_parity_indices() {
        assert_eq!(ParitySplit.train_indices(5), vec![1, 3]);
        assert_eq!(ParitySplit.test_indices(5), vec![0, 2, 4]);
    }

    #[test]
    fn test_split_rows_follow_indices() {
        let x = array![[0.0f32], [1.0], [2.0], [3.0]];
        let split = ParitySplit.split(x.view(), &[10, 11, 12, 13]).unwrap();
        assert_eq!(split.x_train, array![[1.0f32], [3.0]]);
        assert_eq!(split.y_train, vec![11, 13]);
        assert_eq!(split.x_test, array![[0.0f32], [2.0]]);
        assert_eq!(split.y_test, vec![10, 12]);
    }

    #[test]
    fn test_split_length_mismatch() {
        let x = array![[0.0f32], [1.0]];
        assert!(ParitySplit.split(x.view(), &[1]).is_err());
    }
}
