//! facerec-core — Face detection, alignment and embedding.
//!
//! Uses SCRFD for face detection and an OpenFace-style embedding network,
//! both running via ONNX Runtime for CPU inference. The [`Aligner`] and
//! [`Embedder`] traits are the seams where other providers plug in.

pub mod aligner;
pub mod alignment;
pub mod cache;
pub mod detector;
pub mod recognizer;
pub mod types;

pub use aligner::{AlignError, Aligner, ScrfdAligner};
pub use cache::{embed_image, CacheError, EmbeddingCache};
pub use detector::{DetectorError, DetectorOptions, FaceDetector};
pub use recognizer::{Embedder, EmbedderOptions, FaceEmbedder, InputLayout, RecognizerError};
pub use types::{AlignedFace, BoundingBox, Embedding, LandmarkSet};
