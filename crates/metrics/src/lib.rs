//! Streaming binary-classification metrics for evaluation loops.
//!
//! Metrics accumulate raw counts across mini-batches and compute their
//! value once from the cumulative counts. This matters for non-linear
//! metrics such as the Matthews correlation coefficient, where averaging
//! per-batch values over an epoch gives the wrong answer.
//!
//! # Key types
//!
//! - [`Mcc`]: resettable MCC aggregator over [`ConfusionCounts`]
//! - [`StreamingMetric`]: `update` / `result` / `reset` contract
//! - [`MetricSet`]: the standard bundle (tp, fp, tn, fn, accuracy,
//!   precision, recall, auc, prauc, mcc)

pub mod auc;
pub mod binary;
pub mod confusion;
pub mod mcc;
pub mod set;

pub use auc::{Auc, AucCurve};
pub use binary::{BinaryAccuracy, CountKind, CountMetric, Precision, Recall};
pub use confusion::{binarize, ConfusionCounts, MetricsError};
pub use mcc::{batch_mcc, AggregatorState, Mcc, MCC_EPSILON};
pub use set::{MetricSet, MetricValue, StreamingMetric};
