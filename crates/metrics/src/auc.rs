//! Streaming ROC and precision-recall AUC over fixed thresholds.
//!
//! Counts are kept per threshold and the area is summed at read time:
//! trapezoids for ROC, and the Davis & Goadrich interpolation for PR, which
//! avoids the optimistic bias of linear interpolation in precision.

use crate::confusion::{check_lengths, divide_no_nan, MetricsError};
use crate::set::StreamingMetric;

const DEFAULT_NUM_THRESHOLDS: usize = 200;
const THRESHOLD_EPSILON: f32 = 1e-7;

/// Curve whose area is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AucCurve {
    /// True positive rate against false positive rate.
    Roc,
    /// Precision against recall.
    Pr,
}

/// Approximate AUC from confusion counts at evenly spaced thresholds.
#[derive(Debug, Clone)]
pub struct Auc {
    name: String,
    curve: AucCurve,
    thresholds: Vec<f32>,
    tp: Vec<u64>,
    tn: Vec<u64>,
    fp: Vec<u64>,
    fn_: Vec<u64>,
}

impl Auc {
    /// 200 thresholds spanning `[0 - ε, 1 + ε]`.
    pub fn new(name: impl Into<String>, curve: AucCurve) -> Self {
        Self::with_thresholds(name, curve, DEFAULT_NUM_THRESHOLDS)
    }

    /// `num_thresholds` must be at least 2 (the two end points).
    pub fn with_thresholds(name: impl Into<String>, curve: AucCurve, num_thresholds: usize) -> Self {
        let n = num_thresholds.max(2);
        let mut thresholds = Vec::with_capacity(n);
        thresholds.push(-THRESHOLD_EPSILON);
        for i in 1..n - 1 {
            thresholds.push(i as f32 / (n - 1) as f32);
        }
        thresholds.push(1.0 + THRESHOLD_EPSILON);

        Self {
            name: name.into(),
            curve,
            thresholds,
            tp: vec![0; n],
            tn: vec![0; n],
            fp: vec![0; n],
            fn_: vec![0; n],
        }
    }

    pub fn curve(&self) -> AucCurve {
        self.curve
    }

    fn roc_area(&self) -> f64 {
        let n = self.thresholds.len();
        let tpr: Vec<f64> = (0..n)
            .map(|i| divide_no_nan(self.tp[i] as f64, (self.tp[i] + self.fn_[i]) as f64))
            .collect();
        let fpr: Vec<f64> = (0..n)
            .map(|i| divide_no_nan(self.fp[i] as f64, (self.fp[i] + self.tn[i]) as f64))
            .collect();

        // Thresholds increase, so both rates decrease along the index.
        (0..n - 1)
            .map(|i| (fpr[i] - fpr[i + 1]) * (tpr[i] + tpr[i + 1]) / 2.0)
            .sum()
    }

    fn pr_area(&self) -> f64 {
        let n = self.thresholds.len();
        let tp: Vec<f64> = self.tp.iter().map(|&v| v as f64).collect();
        let p: Vec<f64> = (0..n).map(|i| (self.tp[i] + self.fp[i]) as f64).collect();

        (0..n - 1)
            .map(|i| {
                let dtp = tp[i] - tp[i + 1];
                let dp = p[i] - p[i + 1];
                let slope = divide_no_nan(dtp, dp.max(0.0));
                let intercept = tp[i + 1] - slope * p[i + 1];
                let p_ratio = if p[i] > 0.0 && p[i + 1] > 0.0 {
                    divide_no_nan(p[i], p[i + 1])
                } else {
                    1.0
                };
                let positives = (self.tp[i + 1] + self.fn_[i + 1]) as f64;
                divide_no_nan(slope * (dtp + intercept * p_ratio.ln()), positives)
            })
            .sum()
    }
}

impl StreamingMetric for Auc {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, y_true: &[f32], y_pred: &[f32]) -> Result<(), MetricsError> {
        check_lengths(y_true, y_pred)?;
        for (&label, &pred) in y_true.iter().zip(y_pred) {
            let positive = label.clamp(0.0, 1.0) >= 0.5;
            let pred = pred.clamp(0.0, 1.0);
            for (i, &threshold) in self.thresholds.iter().enumerate() {
                match (positive, pred > threshold) {
                    (true, true) => self.tp[i] += 1,
                    (false, false) => self.tn[i] += 1,
                    (false, true) => self.fp[i] += 1,
                    (true, false) => self.fn_[i] += 1,
                }
            }
        }
        Ok(())
    }

    fn result(&self) -> f64 {
        match self.curve {
            AucCurve::Roc => self.roc_area(),
            AucCurve::Pr => self.pr_area(),
        }
    }

    fn reset(&mut self) {
        for counts in [&mut self.tp, &mut self.tn, &mut self.fp, &mut self.fn_] {
            counts.iter_mut().for_each(|c| *c = 0);
        }
    }
}
