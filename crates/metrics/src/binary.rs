//! Count-based companion metrics: raw counts, accuracy, precision, recall.
//!
//! All of them accumulate [`ConfusionCounts`] and derive their value at
//! read time, so they are epoch-correct for the same reason [`crate::Mcc`] is.

use crate::confusion::{divide_no_nan, ConfusionCounts, MetricsError};
use crate::set::StreamingMetric;

/// Which confusion cell a [`CountMetric`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    TruePositives,
    TrueNegatives,
    FalsePositives,
    FalseNegatives,
}

impl CountKind {
    fn name(self) -> &'static str {
        match self {
            Self::TruePositives => "tp",
            Self::TrueNegatives => "tn",
            Self::FalsePositives => "fp",
            Self::FalseNegatives => "fn",
        }
    }
}

/// Running total of one confusion cell.
#[derive(Debug, Clone)]
pub struct CountMetric {
    kind: CountKind,
    counts: ConfusionCounts,
}

impl CountMetric {
    pub fn new(kind: CountKind) -> Self {
        Self {
            kind,
            counts: ConfusionCounts::default(),
        }
    }
}

impl StreamingMetric for CountMetric {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn update(&mut self, y_true: &[f32], y_pred: &[f32]) -> Result<(), MetricsError> {
        self.counts.merge(&ConfusionCounts::from_batch(y_true, y_pred)?);
        Ok(())
    }

    fn result(&self) -> f64 {
        let c = &self.counts;
        let value = match self.kind {
            CountKind::TruePositives => c.tp,
            CountKind::TrueNegatives => c.tn,
            CountKind::FalsePositives => c.fp,
            CountKind::FalseNegatives => c.fn_,
        };
        value as f64
    }

    fn reset(&mut self) {
        self.counts = ConfusionCounts::default();
    }
}

/// Fraction of elements whose binarized prediction equals the binarized label.
#[derive(Debug, Clone, Default)]
pub struct BinaryAccuracy {
    counts: ConfusionCounts,
}

impl StreamingMetric for BinaryAccuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn update(&mut self, y_true: &[f32], y_pred: &[f32]) -> Result<(), MetricsError> {
        self.counts.merge(&ConfusionCounts::from_batch(y_true, y_pred)?);
        Ok(())
    }

    fn result(&self) -> f64 {
        let c = &self.counts;
        divide_no_nan((c.tp + c.tn) as f64, c.total() as f64)
    }

    fn reset(&mut self) {
        self.counts = ConfusionCounts::default();
    }
}

/// `tp / (tp + fp)`, 0 when nothing was predicted positive.
#[derive(Debug, Clone, Default)]
pub struct Precision {
    counts: ConfusionCounts,
}

impl StreamingMetric for Precision {
    fn name(&self) -> &str {
        "precision"
    }

    fn update(&mut self, y_true: &[f32], y_pred: &[f32]) -> Result<(), MetricsError> {
        self.counts.merge(&ConfusionCounts::from_batch(y_true, y_pred)?);
        Ok(())
    }

    fn result(&self) -> f64 {
        let c = &self.counts;
        divide_no_nan(c.tp as f64, (c.tp + c.fp) as f64)
    }

    fn reset(&mut self) {
        self.counts = ConfusionCounts::default();
    }
}

/// `tp / (tp + fn)`, 0 when there were no positive labels.
#[derive(Debug, Clone, Default)]
pub struct Recall {
    counts: ConfusionCounts,
}

impl StreamingMetric for Recall {
    fn name(&self) -> &str {
        "recall"
    }

    fn update(&mut self, y_true: &[f32], y_pred: &[f32]) -> Result<(), MetricsError> {
        self.counts.merge(&ConfusionCounts::from_batch(y_true, y_pred)?);
        Ok(())
    }

    fn result(&self) -> f64 {
        let c = &self.counts;
        divide_no_nan(c.tp as f64, (c.tp + c.fn_) as f64)
    }

    fn reset(&mut self) {
        self.counts = ConfusionCounts::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // tp=2 tn=1 fp=1 fn=1
    const Y_TRUE: [f32; 5] = [1.0, 1.0, 0.0, 0.0, 1.0];
    const Y_PRED: [f32; 5] = [0.9, 0.1, 0.2, 0.8, 0.7];

    #[test]
    fn test_count_metrics() {
        let kinds = [
            (CountKind::TruePositives, "tp", 2.0),
            (CountKind::TrueNegatives, "tn", 1.0),
            (CountKind::FalsePositives, "fp", 1.0),
            (CountKind::FalseNegatives, "fn", 1.0),
        ];
        for (kind, name, expected) in kinds {
            let mut m = CountMetric::new(kind);
            m.update(&Y_TRUE, &Y_PRED).unwrap();
            assert_eq!(m.name(), name);
            assert_eq!(m.result(), expected, "{name}");
            m.reset();
            assert_eq!(m.result(), 0.0);
        }
    }

    #[test]
    fn test_accuracy_precision_recall() {
        let mut acc = BinaryAccuracy::default();
        let mut prec = Precision::default();
        let mut rec = Recall::default();
        let metrics: [&mut dyn StreamingMetric; 3] = [&mut acc, &mut prec, &mut rec];
        for m in metrics {
            m.update(&Y_TRUE, &Y_PRED).unwrap();
        }
        assert!((acc.result() - 0.6).abs() < 1e-9);
        assert!((prec.result() - 2.0 / 3.0).abs() < 1e-9);
        assert!((rec.result() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_results_are_zero() {
        assert_eq!(BinaryAccuracy::default().result(), 0.0);
        assert_eq!(Precision::default().result(), 0.0);
        assert_eq!(Recall::default().result(), 0.0);
    }

    #[test]
    fn test_precision_accumulates_across_batches() {
        let mut prec = Precision::default();
        prec.update(&[1.0, 0.0], &[1.0, 1.0]).unwrap();
        prec.update(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]).unwrap();
        // 4 tp, 1 fp overall; per-batch mean would be (0.5 + 1.0) / 2.
        assert!((prec.result() - 0.8).abs() < 1e-9);
    }
}
