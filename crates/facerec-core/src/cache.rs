//! In-memory embedding cache: one embedding per sample, computed once.

use crate::aligner::{AlignError, Aligner};
use crate::recognizer::{Embedder, RecognizerError};
use crate::types::Embedding;
use image::RgbImage;
use ndarray::Array2;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("alignment failed: {0}")]
    Align(#[from] AlignError),
    #[error("embedding failed: {0}")]
    Embed(#[from] RecognizerError),
    #[error("embedding {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Align and embed a single image.
pub fn embed_image<A, E>(aligner: &mut A, embedder: &mut E, image: &RgbImage) -> Result<Embedding, CacheError>
where
    A: Aligner + ?Sized,
    E: Embedder + ?Sized,
{
    let aligned = aligner.align(image)?;
    Ok(embedder.embed(&aligned)?)
}

/// Embeddings indexed identically to the sample list they were computed from.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingCache {
    embeddings: Vec<Embedding>,
    dim: usize,
}

impl EmbeddingCache {
    /// Wrap precomputed embeddings. All vectors must share one dimension.
    pub fn from_embeddings(embeddings: Vec<Embedding>) -> Result<Self, CacheError> {
        let dim = embeddings.first().map(Embedding::dim).unwrap_or(0);
        if let Some((index, e)) = embeddings.iter().enumerate().find(|(_, e)| e.dim() != dim) {
            return Err(CacheError::DimensionMismatch {
                index,
                expected: dim,
                actual: e.dim(),
            });
        }
        Ok(Self { embeddings, dim })
    }

    /// Align and embed every image in order.
    pub fn compute<I, A, E>(images: I, aligner: &mut A, embedder: &mut E) -> Result<Self, CacheError>
    where
        I: IntoIterator<Item = RgbImage>,
        A: Aligner + ?Sized,
        E: Embedder + ?Sized,
    {
        let embeddings = images
            .into_iter()
            .map(|image| embed_image(aligner, embedder, &image))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_embeddings(embeddings)
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, index: usize) -> Option<&Embedding> {
        self.embeddings.get(index)
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    /// Row-major `len × dim` matrix copy of the cache.
    pub fn matrix(&self) -> Result<Array2<f32>, CacheError> {
        let flat: Vec<f32> = self
            .embeddings
            .iter()
            .flat_map(|e| e.values.iter().copied())
            .collect();
        Ok(Array2::from_shape_vec((self.len(), self.dim), flat)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlignedFace, BoundingBox};

    struct WholeImage;

    impl Aligner for WholeImage {
        fn largest_face(&mut self, image: &RgbImage) -> Result<BoundingBox, AlignError> {
            if image.width() == 0 {
                return Err(AlignError::NoFaceDetected);
            }
            Ok(BoundingBox {
                x: 0.0, y: 0.0, width: image.width() as f32, height: image.height() as f32,
                confidence: 1.0, landmarks: None,
            })
        }

        fn align_box(&self, image: &RgbImage, _face: &BoundingBox) -> Result<AlignedFace, AlignError> {
            Ok(AlignedFace { data: image.as_raw().clone(), size: image.width() as usize })
        }
    }

    /// Embeds a face as its mean channel values.
    struct MeanColor;

    impl Embedder for MeanColor {
        fn embed(&mut self, face: &AlignedFace) -> Result<Embedding, RecognizerError> {
            let n = (face.size * face.size) as f32;
            let mut sums = [0.0f32; 3];
            for px in face.data.chunks(3) {
                for c in 0..3 {
                    sums[c] += px[c] as f32 / 255.0;
                }
            }
            Ok(Embedding::new(sums.iter().map(|s| s / n).collect()))
        }
    }

    #[test]
    fn test_compute_one_row_per_image() {
        let images = vec![
            RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0])),
            RgbImage::from_pixel(4, 4, image::Rgb([0, 255, 0])),
        ];
        let cache = EmbeddingCache::compute(images, &mut WholeImage, &mut MeanColor).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.dim(), 3);
        assert_eq!(cache.get(0).unwrap().values, vec![1.0, 0.0, 0.0]);
        assert_eq!(cache.get(1).unwrap().values, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_compute_fails_fast_without_face() {
        let images = vec![RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3])), RgbImage::new(0, 0)];
        let err = EmbeddingCache::compute(images, &mut WholeImage, &mut MeanColor).unwrap_err();
        assert!(matches!(err, CacheError::Align(AlignError::NoFaceDetected)));
    }

    #[test]
    fn test_from_embeddings_rejects_mixed_dims() {
        let err = EmbeddingCache::from_embeddings(vec![
            Embedding::new(vec![1.0, 2.0]),
            Embedding::new(vec![1.0, 2.0, 3.0]),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            CacheError::DimensionMismatch { index: 1, expected: 2, actual: 3 }
        ));
    }

    #[test]
    fn test_matrix_layout() {
        let cache = EmbeddingCache::from_embeddings(vec![
            Embedding::new(vec![1.0, 2.0]),
            Embedding::new(vec![3.0, 4.0]),
        ])
        .unwrap();
        let m = cache.matrix().unwrap();
        assert_eq!(m.shape(), &[2, 2]);
        assert_eq!(m[[1, 0]], 3.0);
    }
}
