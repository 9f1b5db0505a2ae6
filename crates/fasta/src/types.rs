//! Record, dataset, and error types.

use std::collections::HashMap;

use serde::Serialize;

/// Errors that can occur while loading or parsing sequence collections.
#[derive(Debug, thiserror::Error)]
pub enum FastaError {
    /// Reading the input file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The worker pool could not be created.
    #[error("Failed to build parser thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A worker count of zero was requested.
    #[error("num_workers must be at least 1")]
    InvalidWorkers,

    /// An entry had an identifier but no residues and the policy rejects it.
    #[error("Record '{identifier}' has an empty sequence")]
    EmptySequence { identifier: String },
}

/// One parsed entry of a sequence collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// First line of the entry, without the `>` delimiter.
    pub identifier: String,
    /// All remaining lines of the entry joined with line breaks removed.
    pub sequence: String,
}

impl Record {
    pub fn new(identifier: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            sequence: sequence.into(),
        }
    }

    /// Sequence length in residues.
    ///
    /// Residue symbols are ASCII, so the byte length is the residue count.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether the sequence has no residues (a degenerate parse).
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// Records ordered non-decreasing by sequence length.
///
/// Built once by [`crate::DatasetBuilder`] and never mutated afterwards;
/// consumers iterate it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    /// Wrap records that are already length-ordered.
    pub(crate) fn from_sorted(records: Vec<Record>) -> Self {
        debug_assert!(records.windows(2).all(|w| w[0].len() <= w[1].len()));
        Self { records }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at position `index` in length order.
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Iterate records in length order.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Borrow the ordered records as a slice.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Identifiers that occur more than once, with their occurrence counts.
    ///
    /// Duplicates are kept in the dataset; this only reports them.
    pub fn duplicate_identifiers(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in &self.records {
            *counts.entry(record.identifier.as_str()).or_default() += 1;
        }
        let mut dups: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, n)| (id.to_string(), n))
            .collect();
        dups.sort();
        dups
    }

    /// Compute length statistics over the dataset.
    pub fn summary(&self) -> DatasetSummary {
        let total_residues: usize = self.records.iter().map(Record::len).sum();
        let mean_length = if self.records.is_empty() {
            0.0
        } else {
            total_residues as f64 / self.records.len() as f64
        };

        DatasetSummary {
            records: self.records.len(),
            empty_sequences: self.records.iter().filter(|r| r.is_empty()).count(),
            // Sorted, so the extremes are at the ends.
            min_length: self.records.first().map(Record::len).unwrap_or(0),
            max_length: self.records.last().map(Record::len).unwrap_or(0),
            mean_length,
            total_residues,
            duplicate_identifiers: self.duplicate_identifiers().len(),
        }
    }
}

impl IntoIterator for Dataset {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Quick statistics from a parsed dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    /// Total number of records.
    pub records: usize,
    /// Number of records whose sequence is empty.
    pub empty_sequences: usize,
    /// Shortest sequence length (0 for an empty dataset).
    pub min_length: usize,
    /// Longest sequence length (0 for an empty dataset).
    pub max_length: usize,
    /// Mean sequence length.
    pub mean_length: f64,
    /// Sum of all sequence lengths.
    pub total_residues: usize,
    /// Number of distinct identifiers that occur more than once.
    pub duplicate_identifiers: usize,
}
