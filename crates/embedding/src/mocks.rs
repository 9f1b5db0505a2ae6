//! Deterministic stand-in for a real embedding model.

use burn::tensor::TensorData;

use crate::embedder::EmbeddingModel;

/// Emits `[layers, len, hidden]` f64 hidden states computed from residue
/// bytes alone, so the same sequence always embeds the same way.
#[derive(Debug, Clone, Copy)]
pub struct ResidueEmbedder {
    layers: usize,
    hidden: usize,
}

impl ResidueEmbedder {
    pub fn new(layers: usize, hidden: usize) -> Self {
        Self { layers, hidden }
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }
}

impl EmbeddingModel for ResidueEmbedder {
    fn embed(&self, sequence: &str) -> anyhow::Result<TensorData> {
        let len = sequence.len();
        let mut values = Vec::with_capacity(self.layers * len * self.hidden);
        for layer in 0..self.layers {
            for byte in sequence.bytes() {
                for feature in 0..self.hidden {
                    let v = (byte as f64 - 64.0) * (feature + 1) as f64 / 32.0 + layer as f64;
                    values.push(v);
                }
            }
        }
        Ok(TensorData::new(values, [self.layers, len, self.hidden]))
    }
}
