//! Model asset management: locate model files, downloading them on first use.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Downloads smaller than this are treated as error pages, not models.
const MIN_ASSET_BYTES: usize = 1024;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("model asset {name} missing at {path}: {reason}")]
    Missing {
        name: String,
        path: PathBuf,
        reason: String,
    },
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    Checksum {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A model file the pipeline needs, with an optional download source.
#[derive(Debug, Clone)]
pub struct ModelAsset {
    pub name: String,
    pub path: PathBuf,
    pub url: Option<String>,
    /// Lower-case hex SHA-256 the file must match, when known.
    pub sha256: Option<String>,
}

impl ModelAsset {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            url: None,
            sha256: None,
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_sha256(mut self, sha256: Option<String>) -> Self {
        self.sha256 = sha256.map(|s| s.to_ascii_lowercase());
        self
    }

    /// Return the asset path, downloading it first if it is absent.
    pub fn ensure(&self) -> Result<PathBuf, AssetError> {
        if self.path.exists() {
            tracing::debug!(name = %self.name, path = %self.path.display(), "model asset present");
            return Ok(self.path.clone());
        }

        let Some(url) = self.url.as_deref() else {
            return Err(self.missing("no download URL configured".to_string()));
        };

        tracing::info!(name = %self.name, url, "downloading model asset");
        let bytes = download(url).map_err(|e| self.missing(format!("download from {url} failed: {e}")))?;
        if bytes.len() < MIN_ASSET_BYTES {
            return Err(self.missing(format!(
                "download from {url} is suspiciously small ({} bytes)",
                bytes.len()
            )));
        }
        self.verify(&bytes)?;
        self.write(&bytes)?;

        tracing::info!(
            name = %self.name,
            path = %self.path.display(),
            bytes = bytes.len(),
            "model asset downloaded"
        );
        Ok(self.path.clone())
    }

    fn missing(&self, reason: String) -> AssetError {
        AssetError::Missing {
            name: self.name.clone(),
            path: self.path.clone(),
            reason,
        }
    }

    fn verify(&self, bytes: &[u8]) -> Result<(), AssetError> {
        let Some(expected) = self.sha256.as_deref() else {
            return Ok(());
        };
        let actual = sha256_hex(bytes);
        if actual != expected {
            return Err(AssetError::Checksum {
                path: self.path.clone(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Write via a sibling temp file so a partial download never looks complete.
    fn write(&self, bytes: &[u8]) -> Result<(), AssetError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| AssetError::Io { path, source }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let partial = self.path.with_extension("part");
        std::fs::write(&partial, bytes).map_err(io_err(&partial))?;
        std::fs::rename(&partial, &self.path).map_err(io_err(&self.path))?;
        Ok(())
    }
}

fn download(url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;
    let response = client.get(url).send()?.error_for_status()?;
    Ok(response.bytes()?.to_vec())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
