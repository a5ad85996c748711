//! Serializable evaluation report.

use chrono::{DateTime, Utc};
use facerec_eval::{ClassificationReport, Histogram, PairIteration, ThresholdSelection};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Distance histograms split by whether the pair shares an identity.
#[derive(Debug, Clone, Serialize)]
pub struct DistanceHistograms {
    pub positive: Histogram,
    pub negative: Histogram,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub images_dir: PathBuf,
    pub samples: usize,
    pub identities: usize,
    pub embedding_dim: usize,
    pub pair_iteration: PairIteration,
    pub pairs: usize,
    pub threshold: ThresholdSelection,
    pub histograms: DistanceHistograms,
    pub knn_accuracy: f64,
    pub svm_accuracy: f64,
    pub classification: ClassificationReport,
    /// Rows are true classes, columns predicted classes, both in
    /// `classification.classes` order.
    pub confusion_matrix: Vec<Vec<usize>>,
}

impl EvaluationReport {
    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        tracing::info!(path = %path.display(), "report written");
        Ok(())
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} samples, {} identities, {} pairs ({:?})",
            self.samples, self.identities, self.pairs, self.pair_iteration
        )?;
        writeln!(
            f,
            "Accuracy at threshold {:.2} = {:.4} (F1 = {:.4})",
            self.threshold.threshold, self.threshold.accuracy, self.threshold.f1
        )?;
        writeln!(
            f,
            "KNN accuracy = {}, SVM accuracy = {}",
            self.knn_accuracy, self.svm_accuracy
        )?;
        writeln!(f)?;
        write!(f, "{}", self.classification)
    }
}
