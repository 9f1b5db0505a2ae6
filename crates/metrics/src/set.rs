//! The streaming metric contract and the standard evaluation bundle.

use serde::Serialize;

use crate::auc::{Auc, AucCurve};
use crate::binary::{BinaryAccuracy, CountKind, CountMetric, Precision, Recall};
use crate::confusion::{check_lengths, MetricsError};
use crate::mcc::Mcc;

/// A metric that accumulates state across batches and is read once per epoch.
///
/// `result` must not change state. `reset` must be called by the owner at
/// the start of every epoch.
pub trait StreamingMetric: Send {
    /// Short name used as the report key.
    fn name(&self) -> &str;

    /// Fold one batch into the running state.
    fn update(&mut self, y_true: &[f32], y_pred: &[f32]) -> Result<(), MetricsError>;

    /// Value over everything seen since the last reset.
    fn result(&self) -> f64;

    /// Return to the empty state.
    fn reset(&mut self);
}

/// One named metric reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub name: String,
    pub value: f64,
}

/// An ordered collection of metrics updated together.
pub struct MetricSet {
    metrics: Vec<Box<dyn StreamingMetric>>,
    batches: u64,
}

impl MetricSet {
    /// Empty set; add metrics with [`MetricSet::with`].
    pub fn new() -> Self {
        Self {
            metrics: Vec::new(),
            batches: 0,
        }
    }

    /// tp, fp, tn, fn, accuracy, precision, recall, auc, prauc, mcc.
    pub fn standard() -> Self {
        Self::new()
            .with(CountMetric::new(CountKind::TruePositives))
            .with(CountMetric::new(CountKind::FalsePositives))
            .with(CountMetric::new(CountKind::TrueNegatives))
            .with(CountMetric::new(CountKind::FalseNegatives))
            .with(BinaryAccuracy::default())
            .with(Precision::default())
            .with(Recall::default())
            .with(Auc::new("auc", AucCurve::Roc))
            .with(Auc::new("prauc", AucCurve::Pr))
            .with(Mcc::new())
    }

    pub fn with(mut self, metric: impl StreamingMetric + 'static) -> Self {
        self.metrics.push(Box::new(metric));
        self
    }

    /// Feed one batch to every metric.
    ///
    /// Lengths are checked once up front, so a bad batch leaves every
    /// metric untouched.
    pub fn update(&mut self, y_true: &[f32], y_pred: &[f32]) -> Result<(), MetricsError> {
        check_lengths(y_true, y_pred)?;
        for metric in &mut self.metrics {
            metric.update(y_true, y_pred)?;
        }
        self.batches += 1;
        Ok(())
    }

    /// Current readings in insertion order.
    pub fn results(&self) -> Vec<MetricValue> {
        self.metrics
            .iter()
            .map(|m| MetricValue {
                name: m.name().to_string(),
                value: m.result(),
            })
            .collect()
    }

    /// Reading of a single metric by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.result())
    }

    /// Reset every metric; call at the start of each epoch.
    pub fn reset(&mut self) {
        for metric in &mut self.metrics {
            metric.reset();
        }
        self.batches = 0;
        tracing::debug!(metrics = self.metrics.len(), "Reset metric set");
    }

    /// Batches folded in since the last reset.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// One-line `name=value` rendering for logs.
    pub fn display(&self) -> String {
        self.results()
            .iter()
            .map(|m| format!("{}={:.4}", m.name, m.value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for MetricSet {
    fn default() -> Self {
        Self::standard()
    }
}
