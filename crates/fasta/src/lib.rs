//! FASTA parsing and length-ordered datasets for the embedding pipeline.
//!
//! Raw text is split on `>` into entries, each entry is parsed into a
//! [`Record`] on a scoped rayon pool, and the records are stably sorted by
//! sequence length so a downstream batcher pads as little as possible.
//!
//! # Key types
//!
//! - [`RecordParser`]: parallel entry parser configured by [`ParserConfig`]
//! - [`DatasetBuilder`]: stable length sort into an immutable [`Dataset`]
//! - [`load_dataset`]: read a file and run parse + build in one call

pub mod dataset;
pub mod parser;
pub mod types;

pub use dataset::{load_dataset, DatasetBuilder};
pub use parser::{parse_entry, split_entries, EmptySequencePolicy, ParserConfig, RecordParser};
pub use types::{Dataset, DatasetSummary, FastaError, Record};
