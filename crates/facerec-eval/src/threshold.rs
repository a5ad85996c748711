//! Verification threshold selection.
//!
//! Every candidate threshold `t` induces the predictor `distance < t`. Each
//! candidate is scored by F1 and accuracy against the identity-match labels,
//! and the first candidate with the highest F1 wins.

use crate::metrics::BinaryCounts;
use crate::pairs::{EvalError, PairSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD_START: f64 = 0.30;
pub const DEFAULT_THRESHOLD_STOP: f64 = 1.00;
pub const DEFAULT_THRESHOLD_STEP: f64 = 0.01;

/// Upper bound on the number of candidates a range may produce.
pub const MAX_THRESHOLD_CANDIDATES: usize = 1_000_000;

/// Arithmetic candidate sequence `start, start + step, …` strictly below `stop`.
///
/// Bounds are kept in `f64` so the candidate count matches `ceil((stop - start) / step)`
/// evaluated in double precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl Default for ThresholdRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_THRESHOLD_START,
            stop: DEFAULT_THRESHOLD_STOP,
            step: DEFAULT_THRESHOLD_STEP,
        }
    }
}

impl ThresholdRange {
    /// Number of candidates the range produces.
    pub fn count(&self) -> Result<usize, EvalError> {
        let Self { start, stop, step } = *self;
        if step.is_nan() || step <= 0.0 || !start.is_finite() || !stop.is_finite() {
            return Err(EvalError::InsufficientData(format!(
                "invalid threshold range {start}..{stop} step {step}"
            )));
        }
        let count = ((stop - start) / step).ceil().max(0.0);
        if count > MAX_THRESHOLD_CANDIDATES as f64 {
            return Err(EvalError::InsufficientData(format!(
                "threshold range {start}..{stop} step {step} yields more than {MAX_THRESHOLD_CANDIDATES} candidates"
            )));
        }
        Ok(count as usize)
    }

    /// Materialize the candidates. Yields nothing when `stop <= start`.
    pub fn candidates(&self) -> Result<Vec<f32>, EvalError> {
        let count = self.count()?;
        Ok((0..count).map(|i| (self.start + i as f64 * self.step) as f32).collect())
    }
}

/// F1 and accuracy of one candidate threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdScore {
    pub threshold: f32,
    pub f1: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub counts: BinaryCounts,
}

/// Outcome of a threshold sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdSelection {
    /// Candidate with maximal F1 (first one on ties).
    pub threshold: f32,
    pub accuracy: f64,
    pub f1: f64,
    /// Scores for every candidate, in candidate order.
    pub curve: Vec<ThresholdScore>,
}

/// Score the predictor `distance < threshold` against the ground-truth labels.
pub fn score_threshold(distances: &[f32], identical: &[u8], threshold: f32) -> ThresholdScore {
    let counts = BinaryCounts::from_predictions(
        identical.iter().map(|&l| l == 1),
        distances.iter().map(|&d| d < threshold),
    );
    ThresholdScore {
        threshold,
        f1: counts.f1(),
        accuracy: counts.accuracy(),
        precision: counts.precision(),
        recall: counts.recall(),
        counts,
    }
}

/// Pick the candidate maximizing F1 over `pairs`.
///
/// Fails with [`EvalError::InsufficientData`] when there are no candidates,
/// no pairs, or the labels contain only one class (F1 undefined).
pub fn select_threshold(pairs: &PairSet, candidates: &[f32]) -> Result<ThresholdSelection, EvalError> {
    if pairs.distances.len() != pairs.identical.len() {
        return Err(EvalError::InsufficientData(format!(
            "{} distances but {} labels",
            pairs.distances.len(),
            pairs.identical.len()
        )));
    }
    if candidates.is_empty() {
        return Err(EvalError::InsufficientData("no candidate thresholds".into()));
    }
    if pairs.is_empty() {
        return Err(EvalError::InsufficientData("no pairs to score".into()));
    }
    let positives = pairs.identical.iter().filter(|&&l| l == 1).count();
    if positives == 0 || positives == pairs.len() {
        return Err(EvalError::InsufficientData(format!(
            "all {} pairs share one label; F1 is undefined",
            pairs.len()
        )));
    }

    let curve: Vec<ThresholdScore> = candidates
        .par_iter()
        .map(|&t| score_threshold(&pairs.distances, &pairs.identical, t))
        .collect();

    let mut best = curve[0];
    for score in &curve[1..] {
        if score.f1 > best.f1 {
            best = *score;
        }
    }

    tracing::info!(
        threshold = best.threshold,
        f1 = best.f1,
        accuracy = best.accuracy,
        candidates = curve.len(),
        "verification threshold selected"
    );

    Ok(ThresholdSelection {
        threshold: best.threshold,
        accuracy: best.accuracy,
        f1: best.f1,
        curve,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_set(distances: &[f32], identical: &[u8]) -> PairSet {
        PairSet {
            distances: distances.to_vec(),
            identical: identical.to_vec(),
        }
    }

    #[test]
    fn test_default_candidates() {
        let c = ThresholdRange::default().candidates().unwrap();
        assert_eq!(c.len(), 70);
        assert!((c[0] - 0.30).abs() < 1e-6);
        assert!((c[69] - 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_candidates_empty_and_invalid() {
        let empty = ThresholdRange { start: 1.0, stop: 0.5, step: 0.1 };
        assert!(empty.candidates().unwrap().is_empty());

        let bad = ThresholdRange { start: 0.0, stop: 1.0, step: 0.0 };
        assert!(matches!(bad.candidates(), Err(EvalError::InsufficientData(_))));
    }

    #[test]
    fn test_scenario_perfect_at_one() {
        let pairs = pair_set(&[0.0, 25.0, 25.0], &[1, 0, 0]);
        let s = score_threshold(&pairs.distances, &pairs.identical, 1.0);
        assert_eq!(s.f1, 1.0);
        assert_eq!(s.accuracy, 1.0);

        let sel = select_threshold(&pairs, &[1.0]).unwrap();
        assert_eq!(sel.threshold, 1.0);
        assert_eq!(sel.accuracy, 1.0);
    }

    #[test]
    fn test_empty_candidates() {
        let pairs = pair_set(&[0.0, 25.0], &[1, 0]);
        assert!(matches!(select_threshold(&pairs, &[]), Err(EvalError::InsufficientData(_))));
    }

    #[test]
    fn test_single_class_labels() {
        let pairs = pair_set(&[0.1, 0.2], &[0, 0]);
        assert!(matches!(select_threshold(&pairs, &[0.5]), Err(EvalError::InsufficientData(_))));

        let pairs = pair_set(&[0.1, 0.2], &[1, 1]);
        assert!(matches!(select_threshold(&pairs, &[0.5]), Err(EvalError::InsufficientData(_))));
    }

    #[test]
    fn test_empty_pairs() {
        let pairs = pair_set(&[], &[]);
        assert!(matches!(select_threshold(&pairs, &[0.5]), Err(EvalError::InsufficientData(_))));
    }

    #[test]
    fn test_first_max_tie_break() {
        // Every threshold in (0.2, 0.8] separates the classes perfectly
        let pairs = pair_set(&[0.1, 0.2, 0.8, 0.9], &[1, 1, 0, 0]);
        let sel = select_threshold(&pairs, &[0.1, 0.3, 0.5, 0.7]).unwrap();
        assert_eq!(sel.threshold, 0.3);
        assert_eq!(sel.f1, 1.0);
    }

    #[test]
    fn test_no_predicted_positive_scores_zero() {
        let s = score_threshold(&[0.5, 0.6], &[1, 0], 0.1);
        assert_eq!(s.f1, 0.0);
        assert_eq!(s.precision, 0.0);
        assert_eq!(s.accuracy, 0.5);
    }

    #[test]
    fn test_selected_threshold_is_a_candidate() {
        let pairs = pair_set(&[0.05, 0.33, 0.41, 0.47, 0.52, 0.9, 1.3], &[1, 1, 0, 1, 0, 0, 0]);
        let candidates = ThresholdRange::default().candidates().unwrap();
        let sel = select_threshold(&pairs, &candidates).unwrap();
        assert!(candidates.contains(&sel.threshold));
        assert_eq!(sel.curve.len(), candidates.len());
        assert!(sel.curve.iter().all(|s| s.f1 <= sel.f1));
        assert!(!sel.f1.is_nan() && !sel.accuracy.is_nan());
    }

    #[test]
    fn test_selection_deterministic() {
        let pairs = pair_set(&[0.2, 0.4, 0.45, 0.6, 0.75], &[1, 0, 1, 0, 1]);
        let candidates = ThresholdRange::default().candidates().unwrap();
        let a = select_threshold(&pairs, &candidates).unwrap();
        let b = select_threshold(&pairs, &candidates).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_predicted_matches_monotonic_in_threshold() {
        let distances = [0.12, 0.5, 0.33, 0.9, 0.47, 0.05, 0.3, 0.99];
        let identical = [1, 0, 1, 0, 1, 1, 0, 0];
        let candidates = ThresholdRange::default().candidates().unwrap();
        let predicted: Vec<usize> = candidates
            .iter()
            .map(|&t| score_threshold(&distances, &identical, t).counts.predicted_positive())
            .collect();
        assert!(predicted.windows(2).all(|w| w[0] <= w[1]), "{predicted:?}");
        assert_eq!(predicted[0], 2);
        assert_eq!(*predicted.last().unwrap(), 7);
    }

    #[test]
    fn test_default_range_stops_below_one() {
        let range = ThresholdRange::default();
        assert_eq!(range.count().unwrap(), 70);
        let c = range.candidates().unwrap();
        assert!(c.iter().all(|&t| t < 1.0));
        assert_eq!(c.last().copied(), Some(0.99));
    }

    #[test]
    fn test_distance_just_below_one_is_never_matched() {
        // 0.995 falls between the last candidate and the stop bound
        let pairs = pair_set(&[0.995, 0.995, 2.0, 3.0], &[1, 1, 0, 0]);
        let candidates = ThresholdRange::default().candidates().unwrap();
        let sel = select_threshold(&pairs, &candidates).unwrap();
        assert!(sel.threshold < 1.0);
        assert_eq!(sel.f1, 0.0);
        assert_eq!(sel.threshold, candidates[0]);
    }

    #[test]
    fn test_tiny_step_rejected_without_allocating() {
        let tiny = ThresholdRange { start: 0.3, stop: 1.0, step: 1e-30 };
        assert!(matches!(tiny.count(), Err(EvalError::InsufficientData(_))));
        assert!(matches!(tiny.candidates(), Err(EvalError::InsufficientData(_))));

        let at_cap = ThresholdRange {
            start: 0.0,
            stop: MAX_THRESHOLD_CANDIDATES as f64,
            step: 1.0,
        };
        assert_eq!(at_cap.count().unwrap(), MAX_THRESHOLD_CANDIDATES);
    }
}
