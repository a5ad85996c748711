//! facerec-data — Dataset and model-file access.
//!
//! Enumerates identity-labelled images on disk, decodes them to RGB, and
//! makes sure the ONNX model files exist before the pipeline loads them.

pub mod assets;
pub mod image_io;
pub mod metadata;

pub use assets::{AssetError, ModelAsset};
pub use image_io::{load_image, save_image, ImageLoadError};
pub use metadata::{load_metadata, MetadataError, Sample};
