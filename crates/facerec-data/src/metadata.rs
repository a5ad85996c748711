//! Dataset metadata: one [`Sample`] per image under `<root>/<identity>/<file>`.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File extensions accepted as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("image directory not found: {0}")]
    NotFound(PathBuf),
    #[error("no images found under {0}")]
    Empty(PathBuf),
    #[error("walk: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One input image and the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    /// Identity label, taken from the parent directory name.
    pub identity: String,
    /// File name within the identity directory.
    pub file: String,
    #[serde(skip)]
    root: PathBuf,
}

impl Sample {
    pub fn new(root: impl Into<PathBuf>, identity: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            file: file.into(),
            root: root.into(),
        }
    }

    pub fn image_path(&self) -> PathBuf {
        self.root.join(&self.identity).join(&self.file)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(ext)))
}

/// Enumerate samples under `root`, sorted by identity then file name.
///
/// Only files exactly one directory below `root` are considered; files
/// directly in `root` and deeper nesting are ignored.
pub fn load_metadata(root: &Path) -> Result<Vec<Sample>, MetadataError> {
    if !root.is_dir() {
        return Err(MetadataError::NotFound(root.to_path_buf()));
    }

    let mut samples = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_image(path) {
            continue;
        }
        let identity = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned());
        let Some(identity) = identity else {
            continue;
        };
        samples.push(Sample::new(
            root,
            identity,
            entry.file_name().to_string_lossy().into_owned(),
        ));
    }

    if samples.is_empty() {
        return Err(MetadataError::Empty(root.to_path_buf()));
    }

    tracing::info!(
        root = %root.display(),
        samples = samples.len(),
        identities = count_identities(&samples),
        "loaded image metadata"
    );
    Ok(samples)
}

/// Number of distinct identities in a sample list.
pub fn count_identities(samples: &[Sample]) -> usize {
    let mut ids: Vec<&str> = samples.iter().map(|s| s.identity.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.len()
}
