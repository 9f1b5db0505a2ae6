//! Groups embedded records into fixed-size ragged batches.

use serde::Serialize;

use crate::ragged::RaggedBatch;
use crate::types::{EmbeddedRecord, EmbeddingError};

/// `N` records sharing one `N`-row ragged embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedBatch {
    pub identifiers: Vec<String>,
    pub sequences: Vec<String>,
    pub embeddings: RaggedBatch,
}

/// Lengths of a batch, for logs and JSON reports.
#[derive(Debug, Clone, Serialize)]
pub struct BatchShape {
    pub rows: usize,
    pub max_len: usize,
    pub positions: usize,
    pub hidden: usize,
}

impl EmbeddedBatch {
    /// Stack records row by row. Every record must have one row and the
    /// same hidden size.
    pub fn from_records(records: Vec<EmbeddedRecord>) -> Result<Self, EmbeddingError> {
        let mut identifiers = Vec::with_capacity(records.len());
        let mut sequences = Vec::with_capacity(records.len());
        let mut embeddings = Vec::with_capacity(records.len());
        for record in records {
            if record.embedding.num_rows() != 1 {
                return Err(EmbeddingError::Shape(format!(
                    "record '{}' has {} embedding rows, expected 1",
                    record.identifier,
                    record.embedding.num_rows()
                )));
            }
            identifiers.push(record.identifier);
            sequences.push(record.sequence);
            embeddings.push(record.embedding);
        }
        Ok(Self {
            identifiers,
            sequences,
            embeddings: RaggedBatch::concat(&embeddings)?,
        })
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn shape(&self) -> BatchShape {
        BatchShape {
            rows: self.embeddings.num_rows(),
            max_len: self.embeddings.max_row_len(),
            positions: self.embeddings.total_positions(),
            hidden: self.embeddings.hidden(),
        }
    }

    /// Split back into per-record form.
    pub fn into_records(self) -> Vec<EmbeddedRecord> {
        self.identifiers
            .into_iter()
            .zip(self.sequences)
            .zip(self.embeddings.split_rows())
            .map(|((identifier, sequence), embedding)| EmbeddedRecord {
                identifier,
                sequence,
                embedding,
            })
            .collect()
    }
}

/// Iterator adapter yielding [`EmbeddedBatch`]es of `batch_size` records.
///
/// An upstream error is yielded once and ends the iteration.
pub struct RaggedBatcher<I> {
    inner: I,
    batch_size: usize,
    drop_remainder: bool,
    done: bool,
}

impl<I> RaggedBatcher<I>
where
    I: Iterator<Item = Result<EmbeddedRecord, EmbeddingError>>,
{
    pub fn new(inner: I, batch_size: usize) -> Result<Self, EmbeddingError> {
        if batch_size == 0 {
            return Err(EmbeddingError::InvalidBatchSize);
        }
        Ok(Self {
            inner,
            batch_size,
            drop_remainder: false,
            done: false,
        })
    }

    /// Discard a trailing batch with fewer than `batch_size` records.
    pub fn drop_remainder(mut self, drop: bool) -> Self {
        self.drop_remainder = drop;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<I> Iterator for RaggedBatcher<I>
where
    I: Iterator<Item = Result<EmbeddedRecord, EmbeddingError>>,
{
    type Item = Result<EmbeddedBatch, EmbeddingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut pending = Vec::with_capacity(self.batch_size);
        while pending.len() < self.batch_size {
            match self.inner.next() {
                Some(Ok(record)) => pending.push(record),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if pending.is_empty() || (self.drop_remainder && pending.len() < self.batch_size) {
            if !pending.is_empty() {
                tracing::debug!(dropped = pending.len(), "Dropped remainder batch");
            }
            return None;
        }
        Some(EmbeddedBatch::from_records(pending))
    }
}
