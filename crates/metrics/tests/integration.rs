//! Integration tests for the metrics crate.
//!
//! These simulate evaluation epochs: many batches folded into streaming
//! metrics, compared against whole-epoch and per-batch computations.

use metrics::{batch_mcc, ConfusionCounts, Mcc, MetricSet, StreamingMetric};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_known_counts() {
    let cases = [
        (ConfusionCounts::new(5, 5, 0, 0), 1.0),
        (ConfusionCounts::new(0, 0, 5, 5), -1.0),
        (ConfusionCounts::new(0, 0, 0, 0), 0.0),
    ];
    for (counts, expected) in cases {
        let value = Mcc::from(counts).result();
        assert!(value.is_finite(), "{counts:?} gave {value}");
        assert!(
            (value - expected).abs() < 1e-6,
            "{counts:?}: expected {expected}, got {value}"
        );
    }
}

#[test]
fn test_epoch_mcc_differs_from_mean_of_batch_mcc() {
    // Batch 1: tp=4 tn=1 → MCC 1.0
    let b1_true = [1.0, 1.0, 1.0, 1.0, 0.0];
    let b1_pred = [1.0, 1.0, 1.0, 1.0, 0.0];
    // Batch 2: tp=0 tn=3 fp=1 fn=1 → MCC -0.25
    let b2_true = [1.0, 0.0, 0.0, 0.0, 0.0];
    let b2_pred = [0.0, 1.0, 0.0, 0.0, 0.0];

    let mean_of_batches =
        (batch_mcc(&b1_true, &b1_pred).unwrap() + batch_mcc(&b2_true, &b2_pred).unwrap()) / 2.0;

    let mut mcc = Mcc::new();
    mcc.update(&b1_true, &b1_pred).unwrap();
    mcc.update(&b2_true, &b2_pred).unwrap();

    // Combined: tp=4 tn=4 fp=1 fn=1 → 15 / 25
    assert_eq!(mcc.counts(), ConfusionCounts::new(4, 4, 1, 1));
    assert!((mcc.result() - 0.6).abs() < 1e-6, "got {}", mcc.result());
    assert!((mean_of_batches - 0.375).abs() < 1e-6);
    assert!((mcc.result() - mean_of_batches).abs() > 0.1);
}

#[test]
fn test_streaming_equals_single_pass() {
    let mut rng = StdRng::seed_from_u64(11);
    let n = 1000;
    let y_true: Vec<f32> = (0..n).map(|_| if rng.gen_bool(0.3) { 1.0 } else { 0.0 }).collect();
    let y_pred: Vec<f32> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();

    let mut streamed = MetricSet::standard();
    for (t, p) in y_true.chunks(37).zip(y_pred.chunks(37)) {
        streamed.update(t, p).unwrap();
    }

    let mut single = MetricSet::standard();
    single.update(&y_true, &y_pred).unwrap();

    for (a, b) in streamed.results().iter().zip(single.results()) {
        assert_eq!(a.name, b.name);
        assert!((a.value - b.value).abs() < 1e-12, "{}: {} vs {}", a.name, a.value, b.value);
    }
    assert_eq!(streamed.batches(), 28);
}

#[test]
fn test_reset_between_epochs() {
    let mut mcc = Mcc::new();

    // Epoch 1: perfect.
    mcc.update(&[1.0, 0.0, 1.0, 0.0], &[1.0, 0.0, 1.0, 0.0]).unwrap();
    assert!((mcc.result() - 1.0).abs() < 1e-6);

    // Epoch 2: inverted. Reset makes it independent of epoch 1.
    mcc.reset();
    mcc.update(&[1.0, 0.0, 1.0, 0.0], &[0.0, 1.0, 0.0, 1.0]).unwrap();
    assert!((mcc.result() + 1.0).abs() < 1e-6);
}

#[test]
fn test_metric_set_as_trait_objects() {
    let mut metrics: Vec<Box<dyn StreamingMetric>> = vec![Box::new(Mcc::new())];
    for m in &mut metrics {
        m.update(&[1.0, 0.0], &[0.7, 0.2]).unwrap();
    }
    assert_eq!(metrics[0].name(), "mcc");
    assert!((metrics[0].result() - 1.0).abs() < 1e-6);
}

#[test]
fn test_results_serialize() {
    let mut set = MetricSet::standard();
    set.update(&[1.0, 0.0], &[0.9, 0.1]).unwrap();
    let json = serde_json::to_string(&set.results()).unwrap();
    assert!(json.contains("\"name\":\"mcc\""));
}
