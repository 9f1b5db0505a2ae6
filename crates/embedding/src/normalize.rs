//! Per-feature standardization of embeddings.
//!
//! Statistics are adapted once from a reference corpus (see
//! [`StatsAccumulator`]) and applied to every embedding afterwards as the
//! fixed affine transform `(x - mean) / max(sqrt(variance), 1e-7)`.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use crate::ragged::RaggedBatch;
use crate::types::EmbeddingError;

/// Lower bound on the standard deviation used as a divisor.
pub const STD_EPSILON: f32 = 1e-7;

/// Per-feature mean and variance over the hidden axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizationStats {
    mean: Vec<f32>,
    variance: Vec<f32>,
}

#[derive(Deserialize)]
struct StatsFile {
    mean: Vec<f32>,
    variance: Vec<f32>,
}

impl NormalizationStats {
    /// Validate and wrap adapted statistics.
    pub fn new(mean: Vec<f32>, variance: Vec<f32>) -> Result<Self, EmbeddingError> {
        if mean.is_empty() {
            return Err(EmbeddingError::Stats("empty statistics".to_string()));
        }
        if mean.len() != variance.len() {
            return Err(EmbeddingError::Stats(format!(
                "mean has {} features but variance has {}",
                mean.len(),
                variance.len()
            )));
        }
        if let Some(i) = mean.iter().position(|m| !m.is_finite()) {
            return Err(EmbeddingError::Stats(format!("mean[{i}] is not finite")));
        }
        if let Some(i) = variance.iter().position(|v| !v.is_finite() || *v < 0.0) {
            return Err(EmbeddingError::Stats(format!(
                "variance[{i}] must be finite and non-negative"
            )));
        }
        Ok(Self { mean, variance })
    }

    /// Zero mean and unit variance: normalization becomes a no-op.
    pub fn identity(hidden: usize) -> Self {
        Self {
            mean: vec![0.0; hidden],
            variance: vec![1.0; hidden],
        }
    }

    /// Load `{"mean": [...], "variance": [...]}` from a JSON file.
    pub fn from_json(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: StatsFile = serde_json::from_str(&content)?;
        let stats = Self::new(file.mean, file.variance)?;
        tracing::info!(
            hidden = stats.hidden(),
            path = %path.display(),
            "Loaded normalization statistics"
        );
        Ok(stats)
    }

    pub fn save_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(
            hidden = self.hidden(),
            path = %path.display(),
            "Saved normalization statistics"
        );
        Ok(())
    }

    pub fn hidden(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn variance(&self) -> &[f32] {
        &self.variance
    }

    /// `max(sqrt(variance), ε)` per feature.
    pub fn std_dev(&self) -> Vec<f32> {
        self.variance
            .iter()
            .map(|v| v.sqrt().max(STD_EPSILON))
            .collect()
    }
}

/// Standardize `tensor` along its last axis.
///
/// Works for any rank: a single `[length, hidden]` sample or a
/// `[batch, length, hidden]` stack.
pub fn normalize<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    stats: &NormalizationStats,
) -> Result<Tensor<B, D>, EmbeddingError> {
    let dims = tensor.dims();
    let hidden = dims.last().copied().unwrap_or(0);
    if hidden != stats.hidden() {
        return Err(EmbeddingError::HiddenSizeMismatch {
            expected: stats.hidden(),
            actual: hidden,
        });
    }

    let device = tensor.device();
    let mut shape = vec![1usize; D];
    shape[D - 1] = hidden;

    let mean = Tensor::<B, D>::from_data(TensorData::new(stats.mean.clone(), shape.clone()), &device);
    let std_dev = Tensor::<B, D>::from_data(TensorData::new(stats.std_dev(), shape), &device);

    Ok(tensor.sub(mean).div(std_dev))
}

/// Streaming mean and population variance over every position of a corpus.
///
/// Batches are merged with the parallel-variance update, so feeding the
/// corpus in any chunking gives the same statistics up to rounding.
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    hidden: usize,
    count: u64,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl StatsAccumulator {
    pub fn new(hidden: usize) -> Self {
        Self {
            hidden,
            count: 0,
            mean: vec![0.0; hidden],
            m2: vec![0.0; hidden],
        }
    }

    /// Positions folded in so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn update(&mut self, batch: &RaggedBatch) -> Result<(), EmbeddingError> {
        if batch.hidden() != self.hidden {
            return Err(EmbeddingError::HiddenSizeMismatch {
                expected: self.hidden,
                actual: batch.hidden(),
            });
        }
        let n = batch.total_positions();
        if n == 0 {
            return Ok(());
        }

        // Moments of this batch alone, then merged into the running ones.
        let mut batch_mean = vec![0.0_f64; self.hidden];
        for position in batch.values().chunks_exact(self.hidden) {
            for (acc, &v) in batch_mean.iter_mut().zip(position) {
                *acc += v as f64;
            }
        }
        batch_mean.iter_mut().for_each(|m| *m /= n as f64);

        let mut batch_m2 = vec![0.0_f64; self.hidden];
        for position in batch.values().chunks_exact(self.hidden) {
            for ((acc, &v), m) in batch_m2.iter_mut().zip(position).zip(&batch_mean) {
                let d = v as f64 - m;
                *acc += d * d;
            }
        }

        let n_a = self.count as f64;
        let n_b = n as f64;
        let total = n_a + n_b;
        for i in 0..self.hidden {
            let delta = batch_mean[i] - self.mean[i];
            self.mean[i] += delta * n_b / total;
            self.m2[i] += batch_m2[i] + delta * delta * n_a * n_b / total;
        }
        self.count += n as u64;
        Ok(())
    }

    /// Final statistics; fails if nothing was accumulated.
    pub fn finish(&self) -> Result<NormalizationStats, EmbeddingError> {
        if self.count == 0 {
            return Err(EmbeddingError::Stats(
                "no positions were accumulated".to_string(),
            ));
        }
        let mean = self.mean.iter().map(|&m| m as f32).collect();
        let variance = self
            .m2
            .iter()
            .map(|&m2| (m2 / self.count as f64) as f32)
            .collect();
        NormalizationStats::new(mean, variance)
    }
}
