//! Epoch-correct Matthews correlation coefficient.
//!
//! MCC is a non-linear function of the four confusion counts, so the mean of
//! per-batch MCC values is not the MCC of the epoch. [`Mcc`] keeps only the
//! running counts and evaluates the ratio once, when asked.
//!
//! The caller must [`Mcc::reset`] at the start of every epoch; otherwise
//! counts silently carry over.

use burn::prelude::*;

use crate::confusion::{ConfusionCounts, MetricsError};
use crate::set::StreamingMetric;

/// Added under the square root so all-zero marginals give a finite result.
pub const MCC_EPSILON: f64 = 1e-7;

/// Lifecycle state of an [`Mcc`] aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    /// All counts are zero (fresh or just reset).
    Idle,
    /// At least one element has been counted this epoch.
    Accumulating,
}

/// Resettable MCC accumulator. The four counts are its only state.
#[derive(Debug, Clone, Default)]
pub struct Mcc {
    counts: ConfusionCounts,
}

impl Mcc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one batch of labels and predictions into the running totals.
    ///
    /// On a length mismatch nothing is counted.
    pub fn update(&mut self, y_true: &[f32], y_pred: &[f32]) -> Result<(), MetricsError> {
        let batch = ConfusionCounts::from_batch(y_true, y_pred)?;
        self.counts.merge(&batch);
        Ok(())
    }

    /// Count one batch given as burn tensors of any matching rank.
    pub fn update_tensors<B: Backend, const D: usize>(
        &mut self,
        y_true: Tensor<B, D>,
        y_pred: Tensor<B, D>,
    ) -> Result<(), MetricsError> {
        let y_true = tensor_values(y_true)?;
        let y_pred = tensor_values(y_pred)?;
        self.update(&y_true, &y_pred)
    }

    /// MCC of everything counted since the last reset. No side effects.
    pub fn result(&self) -> f64 {
        mcc_from_counts(&self.counts)
    }

    /// Zero all counts.
    pub fn reset(&mut self) {
        self.counts = ConfusionCounts::default();
    }

    /// Current running counts.
    pub fn counts(&self) -> ConfusionCounts {
        self.counts
    }

    pub fn state(&self) -> AggregatorState {
        if self.counts.is_zero() {
            AggregatorState::Idle
        } else {
            AggregatorState::Accumulating
        }
    }
}

impl From<ConfusionCounts> for Mcc {
    fn from(counts: ConfusionCounts) -> Self {
        Self { counts }
    }
}

impl StreamingMetric for Mcc {
    fn name(&self) -> &str {
        "mcc"
    }

    fn update(&mut self, y_true: &[f32], y_pred: &[f32]) -> Result<(), MetricsError> {
        Mcc::update(self, y_true, y_pred)
    }

    fn result(&self) -> f64 {
        Mcc::result(self)
    }

    fn reset(&mut self) {
        Mcc::reset(self)
    }
}

/// `(tp*tn - fp*fn) / sqrt((tp+fp)(tp+fn)(tn+fp)(tn+fn) + ε)`.
pub(crate) fn mcc_from_counts(c: &ConfusionCounts) -> f64 {
    let (tp, tn, fp, fn_) = (c.tp as f64, c.tn as f64, c.fp as f64, c.fn_ as f64);
    let num = tp * tn - fp * fn_;
    let den = (tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_);
    num / (den + MCC_EPSILON).sqrt()
}

/// MCC of a single batch, with no running state.
///
/// Averaging these over batches does not give the epoch MCC; use [`Mcc`].
pub fn batch_mcc(y_true: &[f32], y_pred: &[f32]) -> Result<f64, MetricsError> {
    Ok(mcc_from_counts(&ConfusionCounts::from_batch(y_true, y_pred)?))
}

pub(crate) fn tensor_values<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> Result<Vec<f32>, MetricsError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| MetricsError::Tensor(format!("{e:?}")))
}
