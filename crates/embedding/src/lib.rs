//! Sequence embedding pipeline.
//!
//! Turns [`fasta::Record`]s into normalized, variable-length embeddings:
//!
//! 1. [`SequenceEmbedder`] calls an injected [`EmbeddingModel`] and sums its
//!    per-layer hidden states into a `[length, hidden]` burn tensor.
//! 2. [`normalize`] applies fixed per-feature statistics.
//! 3. [`to_ragged`] stores the result in a [`RaggedBatch`] without padding.
//!
//! [`EmbeddingPipeline`] runs the three steps per record, lazily or on a
//! rayon pool, and [`RaggedBatcher`] groups the results into batches.
//! Embedded datasets persist to Parquet via [`EmbeddingWriter`] and
//! [`EmbeddingReader`].

pub mod batcher;
pub mod embedder;
pub mod mocks;
pub mod normalize;
pub mod pipeline;
pub mod ragged;
pub mod reader;
pub mod types;
pub mod writer;

pub use batcher::{BatchShape, EmbeddedBatch, RaggedBatcher};
pub use embedder::{EmbeddingModel, SequenceEmbedder};
pub use normalize::{normalize, NormalizationStats, StatsAccumulator, STD_EPSILON};
pub use pipeline::{EmbeddingPipeline, PipelineConfig};
pub use ragged::{to_ragged, RaggedBatch};
pub use reader::EmbeddingReader;
pub use types::{EmbeddedRecord, EmbeddingError};
pub use writer::{embedding_schema, EmbeddingWriter};
