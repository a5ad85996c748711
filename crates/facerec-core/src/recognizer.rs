//! Face embedder via ONNX Runtime.
//!
//! Maps an aligned face crop to a fixed-length embedding vector. The default
//! configuration targets the OpenFace nn4.small2 network exported to ONNX:
//! 96×96 RGB input scaled to [0, 1], NHWC layout, 128-dimensional output.

use crate::types::{AlignedFace, Embedding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_INPUT_SIZE: usize = 96;
pub const DEFAULT_EMBEDDING_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("aligned face is {actual}x{actual}, model expects {expected}x{expected}")]
    InputSize { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Maps a normalized fixed-size face image to an embedding vector.
pub trait Embedder {
    fn embed(&mut self, face: &AlignedFace) -> Result<Embedding, RecognizerError>;
}

/// Memory layout of the model's image input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// Batch, height, width, channels (Keras exports).
    #[default]
    Nhwc,
    /// Batch, channels, height, width (PyTorch exports).
    Nchw,
}

/// Shape parameters for [`FaceEmbedder`].
#[derive(Debug, Clone, Copy)]
pub struct EmbedderOptions {
    pub input_size: usize,
    pub embedding_dim: usize,
    pub layout: InputLayout,
}

impl Default for EmbedderOptions {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            layout: InputLayout::Nhwc,
        }
    }
}

/// ONNX-backed embedding network.
pub struct FaceEmbedder {
    session: Session,
    options: EmbedderOptions,
}

impl FaceEmbedder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &Path, options: EmbedderOptions) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2).map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            input_size = options.input_size,
            layout = ?options.layout,
            "loaded embedding model"
        );

        Ok(Self { session, options })
    }

    /// Build the [0, 1]-scaled input tensor for an aligned crop.
    fn preprocess(face: &AlignedFace, layout: InputLayout) -> Array4<f32> {
        let size = face.size;
        let shape = match layout {
            InputLayout::Nhwc => (1, size, size, 3),
            InputLayout::Nchw => (1, 3, size, size),
        };
        let mut tensor = Array4::<f32>::zeros(shape);

        for y in 0..size {
            for x in 0..size {
                for c in 0..3 {
                    let v = face.normalized(x, y, c);
                    match layout {
                        InputLayout::Nhwc => tensor[[0, y, x, c]] = v,
                        InputLayout::Nchw => tensor[[0, c, y, x]] = v,
                    }
                }
            }
        }

        tensor
    }
}

/// L2-normalize in place; zero vectors are left untouched.
fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|x| *x /= norm);
    }
}

impl Embedder for FaceEmbedder {
    fn embed(&mut self, face: &AlignedFace) -> Result<Embedding, RecognizerError> {
        if face.size != self.options.input_size {
            return Err(RecognizerError::InputSize {
                expected: self.options.input_size,
                actual: face.size,
            });
        }

        let input = Self::preprocess(face, self.options.layout);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let mut values: Vec<f32> = raw_data.to_vec();
        if values.len() != self.options.embedding_dim {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {}-dim embedding, got {}",
                self.options.embedding_dim,
                values.len()
            )));
        }

        l2_normalize(&mut values);

        Ok(Embedding::new(values))
    }
}
