//! End-to-end pipeline: dataset → aligned faces → embeddings → evaluation.

use crate::config::Config;
use crate::report::{DistanceHistograms, EvaluationReport};
use chrono::Utc;
use facerec_core::{
    embed_image, AlignError, Aligner, CacheError, DetectorError, Embedding, EmbeddingCache,
    FaceDetector, FaceEmbedder, RecognizerError, ScrfdAligner,
};
use facerec_data::{
    load_image, load_metadata, save_image, AssetError, ImageLoadError, MetadataError, Sample,
};
use facerec_eval::{
    confusion_matrix, fit_and_score, pairwise_distances, select_threshold, squared_euclidean,
    ClassificationReport, ClassifierError, EvalError, Histogram, LabelEncoder, ParitySplit,
    Predictor,
};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
    #[error("dataset error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("image error: {0}")]
    Image(#[from] ImageLoadError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("alignment error: {0}")]
    Align(#[from] AlignError),
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("{path}: {source}")]
    Sample {
        path: PathBuf,
        #[source]
        source: CacheError,
    },
    #[error("embedding matrix: {0}")]
    Matrix(#[from] CacheError),
    #[error("aligned crop could not be encoded")]
    EmptyCrop,
}

/// Detector-backed aligner plus embedder, loaded once per run.
pub struct Models {
    pub aligner: ScrfdAligner,
    pub embedder: FaceEmbedder,
}

impl Models {
    /// Make sure both model files exist, then load them. Fails fast.
    pub fn load(config: &Config) -> Result<Self, PipelineError> {
        let detector_path = config.detector_asset().ensure()?;
        let embedder_path = config.embedder_asset().ensure()?;

        let detector = FaceDetector::load_with(&detector_path, config.detector_options())?;
        let embedder = FaceEmbedder::load(&embedder_path, config.embedder_options())?;

        Ok(Self {
            aligner: ScrfdAligner::new(detector, config.crop_size, config.landmarks),
            embedder,
        })
    }

    pub fn embed_path(&mut self, path: &Path) -> Result<Embedding, PipelineError> {
        let image = load_image(path)?;
        embed_image(&mut self.aligner, &mut self.embedder, &image).map_err(|source| PipelineError::Sample {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Ensure both model assets are on disk, downloading as needed.
pub fn fetch_models(config: &Config) -> Result<Vec<PathBuf>, PipelineError> {
    let paths = vec![config.detector_asset().ensure()?, config.embedder_asset().ensure()?];
    for path in &paths {
        tracing::info!(path = %path.display(), "model ready");
    }
    Ok(paths)
}

fn progress_bar(len: usize) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    ProgressBar::new(len as u64).with_style(style)
}

/// Embed every sample in order. One row per sample; any failure aborts the run.
pub fn embed_samples(models: &mut Models, samples: &[Sample]) -> Result<EmbeddingCache, PipelineError> {
    let pb = progress_bar(samples.len());
    let mut embeddings = Vec::with_capacity(samples.len());
    for sample in samples {
        pb.set_message(sample.identity.clone());
        embeddings.push(models.embed_path(&sample.image_path())?);
        pb.inc(1);
    }
    pb.finish_and_clear();
    tracing::info!(count = embeddings.len(), "embeddings computed");
    Ok(EmbeddingCache::from_embeddings(embeddings)?)
}

/// Run the evaluation stages over precomputed embeddings.
pub fn evaluate_embeddings(
    config: &Config,
    images_dir: &Path,
    cache: &EmbeddingCache,
    identities: &[String],
) -> Result<EvaluationReport, PipelineError> {
    let pairs = pairwise_distances(cache.embeddings(), identities, config.pair_iteration)?;
    tracing::info!(pairs = pairs.len(), iteration = ?config.pair_iteration, "pair distances computed");

    let candidates = config.threshold_range().candidates()?;
    let threshold = select_threshold(&pairs, &candidates)?;

    let histograms = DistanceHistograms {
        positive: Histogram::new(&pairs.positive_distances(), config.histogram_bins),
        negative: Histogram::new(&pairs.negative_distances(), config.histogram_bins),
    };

    let encoder = LabelEncoder::fit(identities);
    let y = encoder.transform(identities)?;
    let x = cache.matrix()?;
    let split = ParitySplit.split(x.view(), &y)?;

    let (_, knn_accuracy) = fit_and_score(&config.knn(), &split)?;
    let (svm, svm_accuracy) = fit_and_score(&config.svm(), &split)?;
    tracing::info!(knn_accuracy, svm_accuracy, "classifiers scored");

    let predicted = svm.predict(split.x_test.view())?;
    let classification = ClassificationReport::new(&split.y_test, &predicted, encoder.classes());
    let confusion = confusion_matrix(&split.y_test, &predicted, encoder.len());

    Ok(EvaluationReport {
        generated_at: Utc::now(),
        images_dir: images_dir.to_path_buf(),
        samples: cache.len(),
        identities: encoder.len(),
        embedding_dim: cache.dim(),
        pair_iteration: config.pair_iteration,
        pairs: pairs.len(),
        threshold,
        histograms,
        knn_accuracy,
        svm_accuracy,
        classification,
        confusion_matrix: confusion.outer_iter().map(|row| row.to_vec()).collect(),
    })
}

/// Embed a whole dataset: samples, their identities, and the embedding cache.
pub fn embed_dataset(
    models: &mut Models,
    images_dir: &Path,
) -> Result<(Vec<Sample>, Vec<String>, EmbeddingCache), PipelineError> {
    let samples = load_metadata(images_dir)?;
    tracing::info!(
        samples = samples.len(),
        identities = facerec_data::metadata::count_identities(&samples),
        root = %images_dir.display(),
        "dataset loaded"
    );
    let cache = embed_samples(models, &samples)?;
    let identities = samples.iter().map(|s| s.identity.clone()).collect();
    Ok((samples, identities, cache))
}

/// Full run: load the dataset and models, embed everything, evaluate.
pub fn evaluate(config: &Config) -> Result<EvaluationReport, PipelineError> {
    let mut models = Models::load(config)?;
    let (_, identities, cache) = embed_dataset(&mut models, &config.images_dir)?;
    evaluate_embeddings(config, &config.images_dir, &cache, &identities)
}

/// Distance between two faces and whether it falls under `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    pub distance: f32,
    pub threshold: f32,
    pub matched: bool,
}

impl Verification {
    pub fn between(a: &Embedding, b: &Embedding, threshold: f32) -> Result<Self, PipelineError> {
        let distance = squared_euclidean(&a.values, &b.values)?;
        Ok(Self {
            distance,
            threshold,
            matched: distance < threshold,
        })
    }
}

pub fn verify(config: &Config, a: &Path, b: &Path, threshold: f32) -> Result<Verification, PipelineError> {
    let mut models = Models::load(config)?;
    let ea = models.embed_path(a)?;
    let eb = models.embed_path(b)?;
    let v = Verification::between(&ea, &eb, threshold)?;
    tracing::info!(distance = v.distance, threshold, matched = v.matched, "pair verified");
    Ok(v)
}

/// Train the SVC on the training partition and label a single probe embedding.
pub fn identify_embedding(
    config: &Config,
    cache: &EmbeddingCache,
    identities: &[String],
    probe: &Embedding,
) -> Result<String, PipelineError> {
    let encoder = LabelEncoder::fit(identities);
    let y = encoder.transform(identities)?;
    let x = cache.matrix()?;
    let split = ParitySplit.split(x.view(), &y)?;
    let (svm, _) = fit_and_score(&config.svm(), &split)?;

    let row = Array2::from_shape_vec((1, probe.dim()), probe.values.clone())
        .map_err(CacheError::from)?;
    let predicted = svm.predict(row.view())?;
    let label = predicted
        .first()
        .and_then(|&k| encoder.inverse(k))
        .ok_or(ClassifierError::EmptyTrainingSet)?;
    Ok(label.to_string())
}

pub fn identify(config: &Config, image: &Path) -> Result<String, PipelineError> {
    let mut models = Models::load(config)?;
    let (_, identities, cache) = embed_dataset(&mut models, &config.images_dir)?;
    let probe = models.embed_path(image)?;
    let label = identify_embedding(config, &cache, &identities, &probe)?;
    tracing::info!(image = %image.display(), identity = %label, "identified");
    Ok(label)
}

/// Detect, align and write the aligned crop of `image` to `output`.
pub fn align(config: &Config, image: &Path, output: &Path) -> Result<(), PipelineError> {
    let mut models = Models::load(config)?;
    let img = load_image(image)?;
    let face = models.aligner.largest_face(&img)?;
    tracing::info!(
        x = face.x,
        y = face.y,
        width = face.width,
        height = face.height,
        confidence = face.confidence,
        "largest face"
    );
    let aligned = models.aligner.align_box(&img, &face)?;
    let crop = aligned.to_image().ok_or(PipelineError::EmptyCrop)?;
    save_image(&crop, output)?;
    tracing::info!(output = %output.display(), size = aligned.size, "aligned crop written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered() -> (EmbeddingCache, Vec<String>) {
        let mut embeddings = Vec::new();
        let mut identities = Vec::new();
        for s in 0..4 {
            for (k, name) in ["ann", "ben", "cat"].iter().enumerate() {
                let mut v = vec![0.0f32; 3];
                v[k] = 1.0;
                v[(k + 1) % 3] = 0.02 * s as f32;
                embeddings.push(Embedding::new(v));
                identities.push(name.to_string());
            }
        }
        (EmbeddingCache::from_embeddings(embeddings).unwrap(), identities)
    }

    #[test]
    fn test_evaluate_embeddings_report() {
        let (cache, identities) = clustered();
        let config = Config::default();
        let report = evaluate_embeddings(&config, Path::new("images"), &cache, &identities).unwrap();
        assert_eq!(report.samples, 12);
        assert_eq!(report.identities, 3);
        assert_eq!(report.pairs, 11 * 11);
        assert_eq!(report.threshold.f1, 1.0);
        assert_eq!(report.knn_accuracy, 1.0);
        assert_eq!(report.svm_accuracy, 1.0);
        assert_eq!(report.confusion_matrix, vec![vec![2, 0, 0], vec![0, 2, 0], vec![0, 0, 2]]);
        assert_eq!(
            report.histograms.positive.total() + report.histograms.negative.total(),
            report.pairs
        );
    }

    #[test]
    fn test_evaluate_single_identity_is_insufficient() {
        let cache = EmbeddingCache::from_embeddings(vec![
            Embedding::new(vec![0.0, 1.0]),
            Embedding::new(vec![0.1, 1.0]),
            Embedding::new(vec![0.2, 1.0]),
        ])
        .unwrap();
        let ids = vec!["a".to_string(); 3];
        let err = evaluate_embeddings(&Config::default(), Path::new("."), &cache, &ids).unwrap_err();
        assert!(matches!(err, PipelineError::Eval(EvalError::InsufficientData(_))));
    }

    #[test]
    fn test_identify_embedding() {
        let (cache, identities) = clustered();
        let probe = Embedding::new(vec![0.03, 0.0, 0.98]);
        let label = identify_embedding(&Config::default(), &cache, &identities, &probe).unwrap();
        assert_eq!(label, "cat");
    }

    #[test]
    fn test_verification_decision() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![0.3, 0.4]);
        let v = Verification::between(&a, &b, 0.3).unwrap();
        assert!((v.distance - 0.25).abs() < 1e-6);
        assert!(v.matched);
        assert!(!Verification::between(&a, &b, 0.25).unwrap().matched);
        assert!(Verification::between(&a, &Embedding::new(vec![1.0]), 0.5).is_err());
    }

    #[test]
    fn test_fetch_models_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.model_dir = dir.path().to_path_buf();
        config.detector_url = None;
        let err = fetch_models(&config).unwrap_err();
        assert!(matches!(err, PipelineError::Asset(AssetError::Missing { .. })));
    }
}
