//! Epoch-level scoring of stored predictions.
//!
//! Predictions are read from a Parquet file with numeric `label` and
//! `prediction` columns and fed batch by batch through the streaming
//! metrics, exactly as an evaluation loop would.

use std::path::Path;

use arrow::array::{Array, Float32Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use metrics::{batch_mcc, MetricSet, MetricValue};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Serialize;

/// Labels and predictions in file order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Predictions {
    pub labels: Vec<f32>,
    pub predictions: Vec<f32>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Result of one scoring epoch.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub samples: usize,
    pub batches: u64,
    pub metrics: Vec<MetricValue>,
    /// Mean of per-batch MCC, reported only to show how far it drifts from
    /// the epoch value.
    pub mean_batch_mcc: f64,
}

impl ScoreReport {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.name == name).map(|m| m.value)
    }
}

/// Read `label` and `prediction` columns (Float32 or Float64).
pub fn read_predictions(path: &Path) -> anyhow::Result<Predictions> {
    let file = std::fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut out = Predictions::default();
    for batch_result in reader {
        let batch = batch_result?;
        out.labels.extend(float_column(&batch, "label")?);
        out.predictions.extend(float_column(&batch, "prediction")?);
    }

    tracing::debug!(count = out.len(), path = %path.display(), "Read predictions");
    Ok(out)
}

fn float_column(batch: &RecordBatch, name: &str) -> anyhow::Result<Vec<f32>> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| anyhow::anyhow!("Missing column '{name}'"))?;
    match column.data_type() {
        DataType::Float32 | DataType::Float64 => {}
        other => anyhow::bail!("Column '{name}' must be Float32 or Float64, got {other}"),
    }
    if column.null_count() > 0 {
        anyhow::bail!("Column '{name}' contains {} nulls", column.null_count());
    }

    let column = cast(column, &DataType::Float32)?;
    let values = column
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| anyhow::anyhow!("Column '{name}' did not cast to Float32"))?;
    Ok(values.values().to_vec())
}

/// Stream `predictions` through the standard metric set in chunks of `batch_size`.
pub fn score(predictions: &Predictions, batch_size: usize) -> anyhow::Result<ScoreReport> {
    if batch_size == 0 {
        anyhow::bail!("batch size must be at least 1");
    }

    if predictions.labels.len() != predictions.predictions.len() {
        anyhow::bail!(
            "{} labels but {} predictions",
            predictions.labels.len(),
            predictions.predictions.len()
        );
    }

    let mut set = MetricSet::standard();
    let mut batch_mccs = Vec::new();
    for (labels, preds) in predictions
        .labels
        .chunks(batch_size)
        .zip(predictions.predictions.chunks(batch_size))
    {
        set.update(labels, preds)?;
        batch_mccs.push(batch_mcc(labels, preds)?);
        tracing::debug!(batch = set.batches(), "{}", set.display());
    }

    let mean_batch_mcc = if batch_mccs.is_empty() {
        0.0
    } else {
        batch_mccs.iter().sum::<f64>() / batch_mccs.len() as f64
    };

    Ok(ScoreReport {
        samples: predictions.len(),
        batches: set.batches(),
        metrics: set.results(),
        mean_batch_mcc,
    })
}
