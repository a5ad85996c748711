//! Image file loading and saving.

use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageLoadError {
    #[error("failed to load {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Decode an image file into 8-bit RGB, dropping any alpha channel.
pub fn load_image(path: &Path) -> Result<RgbImage, ImageLoadError> {
    let image = image::open(path).map_err(|source| ImageLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::trace!(path = %path.display(), width = image.width(), height = image.height(), "image loaded");
    Ok(image.to_rgb8())
}

/// Write an RGB image; the format follows the file extension.
pub fn save_image(image: &RgbImage, path: &Path) -> Result<(), ImageLoadError> {
    image.save(path).map_err(|source| ImageLoadError::Encode {
        path: path.to_path_buf(),
        source,
    })
}
