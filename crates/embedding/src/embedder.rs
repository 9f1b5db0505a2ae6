//! Sequence → `[length, hidden]` embedding tensor.
//!
//! The embedding model itself is an external capability injected as an
//! [`EmbeddingModel`]. It returns raw per-layer hidden states of shape
//! `[layers, length, hidden]` in any float dtype; [`SequenceEmbedder`] casts
//! them to `f32` and sums over the layer axis.

use std::sync::Arc;

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::types::EmbeddingError;

/// Capability that turns one residue string into per-layer hidden states.
///
/// Implementations must be callable from several threads at once.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, sequence: &str) -> anyhow::Result<TensorData>;
}

impl<F> EmbeddingModel for F
where
    F: Fn(&str) -> anyhow::Result<TensorData> + Send + Sync,
{
    fn embed(&self, sequence: &str) -> anyhow::Result<TensorData> {
        self(sequence)
    }
}

/// Wraps an [`EmbeddingModel`] and a burn device.
pub struct SequenceEmbedder<B: Backend> {
    model: Arc<dyn EmbeddingModel>,
    device: B::Device,
    expected_hidden: Option<usize>,
}

impl<B: Backend> Clone for SequenceEmbedder<B> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            device: self.device.clone(),
            expected_hidden: self.expected_hidden,
        }
    }
}

impl<B: Backend> SequenceEmbedder<B> {
    pub fn new(model: Arc<dyn EmbeddingModel>, device: B::Device) -> Self {
        Self {
            model,
            device,
            expected_hidden: None,
        }
    }

    /// Reject model outputs whose hidden size differs from `hidden`.
    pub fn with_expected_hidden(mut self, hidden: Option<usize>) -> Self {
        self.expected_hidden = hidden;
        self
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn expected_hidden(&self) -> Option<usize> {
        self.expected_hidden
    }

    /// Embed one sequence into a `[length, hidden]` tensor.
    ///
    /// A zero-length output whose hidden axis was lost (`[layers, 0, 0]`, as
    /// nested JSON arrays decode) takes the expected hidden size when one is
    /// configured.
    pub fn embed_one(&self, sequence: &str) -> Result<Tensor<B, 2>, EmbeddingError> {
        let data = self.model.embed(sequence)?;
        let restored = match (data.shape.as_slice(), self.expected_hidden) {
            (&[layers, 0, 0], Some(hidden)) => Some([layers, 0, hidden]),
            _ => None,
        };
        let data = match restored {
            Some(shape) => TensorData::new(Vec::<f32>::new(), shape),
            None => data,
        };
        check_raw_shape(&data.shape, self.expected_hidden)?;

        let tensor = Tensor::<B, 3>::from_data(data.convert::<f32>(), &self.device);
        Ok(tensor.sum_dim(0).squeeze::<2>(0))
    }

    /// Decode `bytes` as UTF-8, then [`embed_one`](Self::embed_one).
    pub fn embed_bytes(&self, bytes: &[u8]) -> Result<Tensor<B, 2>, EmbeddingError> {
        let sequence = std::str::from_utf8(bytes)?;
        self.embed_one(sequence)
    }
}

fn check_raw_shape(shape: &[usize], expected_hidden: Option<usize>) -> Result<(), EmbeddingError> {
    let [layers, length, hidden] = shape else {
        return Err(EmbeddingError::Shape(format!(
            "model output must be [layers, length, hidden], got {shape:?}"
        )));
    };
    if *layers == 0 {
        return Err(EmbeddingError::Shape("model output has no layers".to_string()));
    }
    if *hidden == 0 && *length == 0 {
        return Err(EmbeddingError::Shape(
            "zero-length model output carries no hidden size; set an expected hidden size".to_string(),
        ));
    }
    if *hidden == 0 {
        return Err(EmbeddingError::Shape("model output has zero hidden size".to_string()));
    }
    match expected_hidden {
        Some(expected) if expected != *hidden => Err(EmbeddingError::HiddenSizeMismatch {
            expected,
            actual: *hidden,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn embedder(model: impl EmbeddingModel + 'static) -> SequenceEmbedder<TestBackend> {
        SequenceEmbedder::new(Arc::new(model), Default::default())
    }

    /// Two layers, one position per residue, hidden 3. Layer `l` holds
    /// `l + 1` everywhere, so the layer sum is 3.0.
    fn two_layer_model(sequence: &str) -> anyhow::Result<TensorData> {
        let len = sequence.len();
        let mut values = vec![1.0_f64; len * 3];
        values.extend(vec![2.0_f64; len * 3]);
        Ok(TensorData::new(values, [2, len, 3]))
    }

    #[test]
    fn test_sums_layers_and_casts() {
        let embedder = embedder(two_layer_model);
        let out = embedder.embed_one("ACDE").unwrap();
        assert_eq!(out.dims(), [4, 3]);

        let values: Vec<f32> = out.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| (v - 3.0).abs() < 1e-6));
    }

    #[test]
    fn test_embed_bytes() {
        let embedder = embedder(two_layer_model);
        let out = embedder.embed_bytes(b"MK").unwrap();
        assert_eq!(out.dims(), [2, 3]);

        let err = embedder.embed_bytes(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, EmbeddingError::Utf8(_)));
    }

    #[test]
    fn test_rank_error() {
        let embedder = embedder(|_: &str| -> anyhow::Result<TensorData> {
            Ok(TensorData::new(vec![0.0_f32; 6], [2, 3]))
        });
        let err = embedder.embed_one("AC").unwrap_err();
        assert!(matches!(err, EmbeddingError::Shape(_)), "got {err:?}");
    }

    #[test]
    fn test_zero_hidden_rejected() {
        let embedder = embedder(|_: &str| -> anyhow::Result<TensorData> {
            Ok(TensorData::new(Vec::<f32>::new(), [1, 2, 0]))
        });
        assert!(matches!(
            embedder.embed_one("AC").unwrap_err(),
            EmbeddingError::Shape(_)
        ));
    }

    /// Three layers of hidden size 4, except that an empty sequence comes
    /// back as `[3, 0, 0]`, the way nested arrays decode.
    fn decoded_model(sequence: &str) -> anyhow::Result<TensorData> {
        let len = sequence.len();
        let hidden = if len == 0 { 0 } else { 4 };
        Ok(TensorData::new(vec![0.25_f64; 3 * len * hidden], [3, len, hidden]))
    }

    #[test]
    fn test_empty_output_takes_expected_hidden() {
        let err = embedder(decoded_model).embed_one("").unwrap_err();
        assert!(err.to_string().contains("expected hidden size"), "got {err}");

        let embedder = embedder(decoded_model).with_expected_hidden(Some(4));
        assert_eq!(embedder.embed_one("").unwrap().dims(), [0, 4]);
        assert_eq!(embedder.embed_one("MK").unwrap().dims(), [2, 4]);
    }

    #[test]
    fn test_expected_hidden() {
        let embedder = embedder(two_layer_model).with_expected_hidden(Some(8));
        let err = embedder.embed_one("A").unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::HiddenSizeMismatch {
                expected: 8,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_model_error_passes_through() {
        let embedder = embedder(|_: &str| -> anyhow::Result<TensorData> {
            Err(anyhow::anyhow!("server unavailable"))
        });
        let err = embedder.embed_one("A").unwrap_err();
        assert_eq!(err.to_string(), "server unavailable");
        assert!(matches!(err, EmbeddingError::Model(_)));
    }
}
