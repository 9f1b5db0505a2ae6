//! Confusion-matrix counts and the binarization rule shared by all metrics.

use serde::Serialize;

/// Errors raised when feeding a batch into a metric.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MetricsError {
    /// Labels and predictions have different element counts.
    #[error("Length mismatch: {labels} labels vs {predictions} predictions")]
    LengthMismatch { labels: usize, predictions: usize },

    /// A tensor could not be read back as `f32` values.
    #[error("Tensor conversion failed: {0}")]
    Tensor(String),
}

/// Clip to `[0, 1]` and round half to even, returning `true` for the positive class.
///
/// Ties go to the negative class (`0.5 → 0`), matching TensorFlow's `round`.
/// NaN is treated as negative.
pub fn binarize(value: f32) -> bool {
    value.clamp(0.0, 1.0).round_ties_even() >= 1.0
}

/// Running true/false positive/negative counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounts {
    pub tp: u64,
    pub tn: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
}

impl ConfusionCounts {
    pub fn new(tp: u64, tn: u64, fp: u64, fn_: u64) -> Self {
        Self { tp, tn, fp, fn_ }
    }

    /// Count one batch. Each element lands in exactly one of the four cells.
    pub fn from_batch(y_true: &[f32], y_pred: &[f32]) -> Result<Self, MetricsError> {
        check_lengths(y_true, y_pred)?;
        let mut counts = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (binarize(t), binarize(p)) {
                (true, true) => counts.tp += 1,
                (false, false) => counts.tn += 1,
                (false, true) => counts.fp += 1,
                (true, false) => counts.fn_ += 1,
            }
        }
        Ok(counts)
    }

    /// Add another set of counts into this one.
    pub fn merge(&mut self, other: &ConfusionCounts) {
        self.tp += other.tp;
        self.tn += other.tn;
        self.fp += other.fp;
        self.fn_ += other.fn_;
    }

    /// Total number of classified elements.
    pub fn total(&self) -> u64 {
        self.tp + self.tn + self.fp + self.fn_
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

pub(crate) fn check_lengths(y_true: &[f32], y_pred: &[f32]) -> Result<(), MetricsError> {
    if y_true.len() != y_pred.len() {
        return Err(MetricsError::LengthMismatch {
            labels: y_true.len(),
            predictions: y_pred.len(),
        });
    }
    Ok(())
}

/// `num / den`, or 0 when the denominator is 0.
pub(crate) fn divide_no_nan(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
