use facerec_core::{DetectorOptions, EmbedderOptions, InputLayout, LandmarkSet};
use facerec_data::ModelAsset;
use facerec_eval::{KNearestNeighbors, LinearSvc, PairIteration, ThresholdRange};
use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "facerec.toml";
const DEFAULT_DETECTOR_URL: &str =
    "https://github.com/deepinsight/insightface/releases/download/v0.7/scrfd_500m_bnkps.onnx";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Pipeline configuration.
///
/// Layered as defaults, then an optional TOML file, then `FACEREC_*`
/// environment variables. Per-run paths from the command line are applied
/// by the caller afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the identity-per-directory image tree.
    pub images_dir: PathBuf,
    /// Directory holding the ONNX model files.
    pub model_dir: PathBuf,
    pub detector_model: String,
    pub embedder_model: String,
    pub detector_url: Option<String>,
    pub embedder_url: Option<String>,
    pub detector_sha256: Option<String>,
    pub embedder_sha256: Option<String>,
    /// Detector anchors scoring at or below this are discarded.
    pub detector_confidence: f32,
    /// IoU above which overlapping detections are merged.
    pub detector_nms_iou: f32,
    /// Side of the aligned square crop, in pixels.
    pub crop_size: usize,
    pub landmarks: LandmarkSet,
    pub embedding_dim: usize,
    pub input_layout: InputLayout,
    pub threshold_start: f64,
    pub threshold_stop: f64,
    pub threshold_step: f64,
    pub pair_iteration: PairIteration,
    pub knn_neighbors: usize,
    pub svm_c: f64,
    pub svm_tol: f64,
    pub histogram_bins: usize,
}

impl Default for Config {
    fn default() -> Self {
        let embedder = EmbedderOptions::default();
        let detector = DetectorOptions::default();
        let thresholds = ThresholdRange::default();
        let svm = LinearSvc::default();
        Self {
            images_dir: PathBuf::from("images"),
            model_dir: PathBuf::from("models"),
            detector_model: "scrfd_500m_bnkps.onnx".to_string(),
            embedder_model: "nn4.small2.v1.onnx".to_string(),
            detector_url: Some(DEFAULT_DETECTOR_URL.to_string()),
            embedder_url: None,
            detector_sha256: None,
            embedder_sha256: None,
            detector_confidence: detector.confidence,
            detector_nms_iou: detector.nms_iou,
            crop_size: embedder.input_size,
            landmarks: LandmarkSet::default(),
            embedding_dim: embedder.embedding_dim,
            input_layout: embedder.layout,
            threshold_start: thresholds.start,
            threshold_stop: thresholds.stop,
            threshold_step: thresholds.step,
            pair_iteration: PairIteration::default(),
            knn_neighbors: KNearestNeighbors::default().k,
            svm_c: svm.c,
            svm_tol: svm.tol,
            histogram_bins: 10,
        }
    }
}

impl Config {
    /// Load from `FACEREC_CONFIG` (or `./facerec.toml` when present), then
    /// apply `FACEREC_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("FACEREC_CONFIG").ok().map(PathBuf::from);
        let path = explicit.or_else(|| {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            local.exists().then_some(local)
        });

        let mut config = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `FACEREC_<KEY>` variables. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("FACEREC_IMAGES_DIR") {
            self.images_dir = PathBuf::from(v);
        }
        if let Some(v) = env("FACEREC_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = env("FACEREC_DETECTOR_MODEL") {
            self.detector_model = v;
        }
        if let Some(v) = env("FACEREC_EMBEDDER_MODEL") {
            self.embedder_model = v;
        }
        if let Some(v) = env("FACEREC_DETECTOR_URL") {
            self.detector_url = non_empty(v);
        }
        if let Some(v) = env("FACEREC_EMBEDDER_URL") {
            self.embedder_url = non_empty(v);
        }
        if let Some(v) = env("FACEREC_DETECTOR_SHA256") {
            self.detector_sha256 = non_empty(v);
        }
        if let Some(v) = env("FACEREC_EMBEDDER_SHA256") {
            self.embedder_sha256 = non_empty(v);
        }

        env_parse(&env, "FACEREC_DETECTOR_CONFIDENCE", &mut self.detector_confidence);
        env_parse(&env, "FACEREC_DETECTOR_NMS_IOU", &mut self.detector_nms_iou);
        env_parse(&env, "FACEREC_CROP_SIZE", &mut self.crop_size);
        env_enum(&env, "FACEREC_LANDMARKS", &mut self.landmarks);
        env_parse(&env, "FACEREC_EMBEDDING_DIM", &mut self.embedding_dim);
        env_enum(&env, "FACEREC_INPUT_LAYOUT", &mut self.input_layout);
        env_parse(&env, "FACEREC_THRESHOLD_START", &mut self.threshold_start);
        env_parse(&env, "FACEREC_THRESHOLD_STOP", &mut self.threshold_stop);
        env_parse(&env, "FACEREC_THRESHOLD_STEP", &mut self.threshold_step);
        env_enum(&env, "FACEREC_PAIR_ITERATION", &mut self.pair_iteration);
        env_parse(&env, "FACEREC_KNN_NEIGHBORS", &mut self.knn_neighbors);
        env_parse(&env, "FACEREC_SVM_C", &mut self.svm_c);
        env_parse(&env, "FACEREC_SVM_TOL", &mut self.svm_tol);
        env_parse(&env, "FACEREC_HISTOGRAM_BINS", &mut self.histogram_bins);
    }

    pub fn detector_asset(&self) -> ModelAsset {
        ModelAsset::new("detector", self.model_dir.join(&self.detector_model))
            .with_url(self.detector_url.clone())
            .with_sha256(self.detector_sha256.clone())
    }

    pub fn embedder_asset(&self) -> ModelAsset {
        ModelAsset::new("embedder", self.model_dir.join(&self.embedder_model))
            .with_url(self.embedder_url.clone())
            .with_sha256(self.embedder_sha256.clone())
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            confidence: self.detector_confidence,
            nms_iou: self.detector_nms_iou,
        }
    }

    pub fn embedder_options(&self) -> EmbedderOptions {
        EmbedderOptions {
            input_size: self.crop_size,
            embedding_dim: self.embedding_dim,
            layout: self.input_layout,
        }
    }

    pub fn threshold_range(&self) -> ThresholdRange {
        ThresholdRange {
            start: self.threshold_start,
            stop: self.threshold_stop,
            step: self.threshold_step,
        }
    }

    pub fn knn(&self) -> KNearestNeighbors {
        KNearestNeighbors {
            k: self.knn_neighbors,
        }
    }

    pub fn svm(&self) -> LinearSvc {
        LinearSvc {
            c: self.svm_c,
            tol: self.svm_tol,
        }
    }
}

fn non_empty(v: String) -> Option<String> {
    (!v.trim().is_empty()).then_some(v)
}

fn env_parse<F, T>(env: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = env(key) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
        }
    }
}

/// Parse a snake_case enum override through its serde representation.
fn env_enum<F, T>(env: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: DeserializeOwned,
{
    if let Some(raw) = env(key) {
        let de: StrDeserializer<'_, ValueError> = raw.trim().into_deserializer();
        match T::deserialize(de) {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.crop_size, 96);
        assert_eq!(c.embedding_dim, 128);
        assert_eq!(c.landmarks, LandmarkSet::OuterEyesAndNose);
        assert_eq!(c.input_layout, InputLayout::Nhwc);
        assert_eq!(c.pair_iteration, PairIteration::Reference);
        assert_eq!(c.knn_neighbors, 1);
        assert_eq!(c.histogram_bins, 10);
        assert_eq!(c.threshold_range().candidates().unwrap().len(), 70);
        assert_eq!(c.threshold_range().candidates().unwrap().last().copied(), Some(0.99));
        assert_eq!(c.detector_options().confidence, 0.5);
        assert_eq!(c.detector_options().nms_iou, 0.4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c: Config = toml::from_str(
            r#"
            images_dir = "/data/lfw"
            landmarks = "five_point"
            pair_iteration = "unique_unordered"
            svm_c = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(c.images_dir, PathBuf::from("/data/lfw"));
        assert_eq!(c.landmarks, LandmarkSet::FivePoint);
        assert_eq!(c.pair_iteration, PairIteration::UniqueUnordered);
        assert_eq!(c.svm().c, 0.5);
        assert_eq!(c.crop_size, 96);
    }

    #[test]
    fn test_unknown_toml_enum_rejected() {
        assert!(toml::from_str::<Config>("input_layout = \"chw\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut c = Config::default();
        c.apply_env(env_of(&[
            ("FACEREC_MODEL_DIR", "/opt/models"),
            ("FACEREC_CROP_SIZE", "112"),
            ("FACEREC_INPUT_LAYOUT", "nchw"),
            ("FACEREC_THRESHOLD_STEP", "0.05"),
            ("FACEREC_KNN_NEIGHBORS", "3"),
            ("FACEREC_DETECTOR_URL", ""),
            ("FACEREC_DETECTOR_CONFIDENCE", "0.7"),
            ("FACEREC_DETECTOR_NMS_IOU", "0.3"),
        ]));
        assert_eq!(c.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(c.embedder_options().input_size, 112);
        assert_eq!(c.input_layout, InputLayout::Nchw);
        assert_eq!(c.threshold_step, 0.05);
        assert_eq!(c.knn().k, 3);
        assert_eq!(c.detector_url, None);
        assert_eq!(c.detector_options().confidence, 0.7);
        assert_eq!(c.detector_options().nms_iou, 0.3);
    }

    #[test]
    fn test_tiny_threshold_step_is_an_error() {
        let mut c = Config::default();
        c.apply_env(env_of(&[("FACEREC_THRESHOLD_STEP", "1e-30")]));
        assert_eq!(c.threshold_step, 1e-30);
        assert!(c.threshold_range().candidates().is_err());
    }

    #[test]
    fn test_bad_env_values_ignored() {
        let mut c = Config::default();
        c.apply_env(env_of(&[
            ("FACEREC_CROP_SIZE", "large"),
            ("FACEREC_LANDMARKS", "seven_point"),
        ]));
        assert_eq!(c.crop_size, 96);
        assert_eq!(c.landmarks, LandmarkSet::OuterEyesAndNose);
    }

    #[test]
    fn test_assets_resolve_under_model_dir() {
        let mut c = Config::default();
        c.model_dir = PathBuf::from("/m");
        c.embedder_sha256 = Some("ABCD".into());
        let det = c.detector_asset();
        assert_eq!(det.path, PathBuf::from("/m/scrfd_500m_bnkps.onnx"));
        assert!(det.url.is_some());
        let emb = c.embedder_asset();
        assert_eq!(emb.url, None);
        assert_eq!(emb.sha256.as_deref(), Some("abcd"));
    }

    #[test]
    fn test_from_file_errors_carry_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facerec.toml");
        std::fs::write(&path, "crop_size = \"big\"").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("facerec.toml"));

        let missing = Config::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
