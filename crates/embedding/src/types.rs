//! Shared types for the embedding crate.

use crate::ragged::RaggedBatch;

/// Errors raised while embedding, normalizing, or assembling sequences.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Failure inside the embedding capability, passed through unchanged.
    #[error(transparent)]
    Model(#[from] anyhow::Error),

    #[error("invalid shape: {0}")]
    Shape(String),

    #[error("hidden size mismatch: expected {expected}, got {actual}")]
    HiddenSizeMismatch { expected: usize, actual: usize },

    #[error("sequence is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("tensor data: {0}")]
    Tensor(String),

    #[error("invalid normalization statistics: {0}")]
    Stats(String),

    #[error("number of workers must be at least 1")]
    InvalidWorkers,

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("arrow: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

/// One record after embedding and normalization.
///
/// `embedding` always holds exactly one row: the positions of this sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedRecord {
    pub identifier: String,
    pub sequence: String,
    pub embedding: RaggedBatch,
}

impl EmbeddedRecord {
    /// Number of embedded positions.
    pub fn len(&self) -> usize {
        self.embedding.total_positions()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hidden(&self) -> usize {
        self.embedding.hidden()
    }
}
