//! Classification metrics: binary counts, accuracy, confusion matrix and
//! per-class reports.
//!
//! Ill-defined ratios (zero denominators) score 0.0 rather than NaN.

use ndarray::Array2;
use serde::Serialize;
use std::fmt;

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Confusion counts of a binary predictor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BinaryCounts {
    pub true_pos: usize,
    pub false_pos: usize,
    pub false_neg: usize,
    pub true_neg: usize,
}

impl BinaryCounts {
    pub fn from_predictions<T, P>(truth: T, predicted: P) -> Self
    where
        T: IntoIterator<Item = bool>,
        P: IntoIterator<Item = bool>,
    {
        let mut c = Self::default();
        for (t, p) in truth.into_iter().zip(predicted) {
            match (t, p) {
                (true, true) => c.true_pos += 1,
                (false, true) => c.false_pos += 1,
                (true, false) => c.false_neg += 1,
                (false, false) => c.true_neg += 1,
            }
        }
        c
    }

    /// Rows the predictor labelled positive.
    pub fn predicted_positive(&self) -> usize {
        self.true_pos + self.false_pos
    }

    pub fn total(&self) -> usize {
        self.true_pos + self.false_pos + self.false_neg + self.true_neg
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_pos, self.true_pos + self.false_pos)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_pos, self.true_pos + self.false_neg)
    }

    /// `2·P·R / (P + R)`, computed as `2·TP / (2·TP + FP + FN)`.
    pub fn f1(&self) -> f64 {
        ratio(2 * self.true_pos, 2 * self.true_pos + self.false_pos + self.false_neg)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_pos + self.true_neg, self.total())
    }
}

/// Fraction of positions where `predicted` equals `truth`.
pub fn accuracy_score(truth: &[usize], predicted: &[usize]) -> f64 {
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    ratio(correct, truth.len().min(predicted.len()))
}

/// `n_classes × n_classes` matrix; rows are true classes, columns predictions.
/// Labels outside `0..n_classes` are ignored.
pub fn confusion_matrix(truth: &[usize], predicted: &[usize], n_classes: usize) -> Array2<usize> {
    let mut m = Array2::zeros((n_classes, n_classes));
    for (&t, &p) in truth.iter().zip(predicted) {
        if t < n_classes && p < n_classes {
            m[[t, p]] += 1;
        }
    }
    m
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 plus accuracy and macro/weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
}

impl ClassificationReport {
    /// Build a report for classes `0..names.len()`, named by `names`.
    pub fn new(truth: &[usize], predicted: &[usize], names: &[String]) -> Self {
        let m = confusion_matrix(truth, predicted, names.len());

        let classes: Vec<ClassMetrics> = names
            .iter()
            .enumerate()
            .map(|(k, name)| {
                let tp = m[[k, k]];
                let support: usize = m.row(k).sum();
                let predicted_k: usize = m.column(k).sum();
                let counts = BinaryCounts {
                    true_pos: tp,
                    false_pos: predicted_k - tp,
                    false_neg: support - tp,
                    true_neg: 0,
                };
                ClassMetrics {
                    name: name.clone(),
                    precision: counts.precision(),
                    recall: counts.recall(),
                    f1: counts.f1(),
                    support,
                }
            })
            .collect();

        let total: usize = classes.iter().map(|c| c.support).sum();
        let n = classes.len().max(1) as f64;
        let macro_avg = AveragedMetrics {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / n,
            support: total,
        };
        let weight = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / total as f64
            }
        };
        let weighted_avg = AveragedMetrics {
            precision: weight(|c| c.precision),
            recall: weight(|c| c.recall),
            f1: weight(|c| c.f1),
            support: total,
        };

        Self {
            accuracy: accuracy_score(truth, predicted),
            classes,
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.name.len())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(0);

        writeln!(f, "{:>width$} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (label, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, avg.precision, avg.recall, avg.f1, avg.support
            )?;
        }
        Ok(())
    }
}
