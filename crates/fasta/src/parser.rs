//! Parallel parsing of `>`-delimited sequence collections.
//!
//! Entries have no data dependency on each other, so they are parsed on a
//! rayon pool sized to the available cores. The pool is built for a single
//! [`RecordParser::parse`] call and dropped when the call returns.

use rayon::prelude::*;
use serde::Deserialize;

use crate::types::{FastaError, Record};

/// Record delimiter that starts every entry.
pub const DELIMITER: char = '>';

/// What to do with entries that have an identifier but no residues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptySequencePolicy {
    /// Keep the degenerate record; downstream must tolerate length 0.
    #[default]
    Keep,
    /// Drop the record and log how many were dropped.
    Skip,
    /// Fail the parse on the first empty record.
    Reject,
}

/// Parser configuration, loaded from the `[parser]` TOML section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParserConfig {
    /// Number of parser threads. `None` uses all available cores.
    #[serde(default)]
    pub num_workers: Option<usize>,

    /// Handling of entries with an empty sequence.
    #[serde(default)]
    pub empty_sequences: EmptySequencePolicy,
}

impl ParserConfig {
    /// Resolve the worker count, defaulting to the number of available cores.
    pub fn resolved_workers(&self) -> usize {
        self.num_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Split raw text into entries, dropping empty and whitespace-only fragments.
pub fn split_entries(text: &str) -> Vec<&str> {
    text.split(DELIMITER)
        .filter(|fragment| !fragment.trim().is_empty())
        .collect()
}

/// Parse one entry (without its leading `>`) into a [`Record`].
///
/// The first line is the identifier; every later line is a run of residues.
/// An entry with only an identifier line yields an empty sequence.
pub fn parse_entry(entry: &str) -> Record {
    let mut lines = entry.lines();
    let identifier = lines.next().unwrap_or_default().trim_end_matches('\r').to_string();
    let sequence: String = lines.map(|line| line.trim_end_matches('\r')).collect();
    Record {
        identifier,
        sequence,
    }
}

/// Parses raw sequence-collection text on a scoped worker pool.
#[derive(Debug, Clone)]
pub struct RecordParser {
    num_workers: usize,
    empty_sequences: EmptySequencePolicy,
}

impl RecordParser {
    /// Create a parser with an explicit worker count.
    pub fn new(num_workers: usize) -> Result<Self, FastaError> {
        if num_workers == 0 {
            return Err(FastaError::InvalidWorkers);
        }
        Ok(Self {
            num_workers,
            empty_sequences: EmptySequencePolicy::default(),
        })
    }

    /// Create a parser from configuration.
    pub fn from_config(config: &ParserConfig) -> Result<Self, FastaError> {
        Ok(Self::new(config.resolved_workers())?.with_empty_policy(config.empty_sequences))
    }

    /// Set the empty-sequence policy.
    pub fn with_empty_policy(mut self, policy: EmptySequencePolicy) -> Self {
        self.empty_sequences = policy;
        self
    }

    /// Number of worker threads used per parse.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Parse every entry of `text` into records.
    ///
    /// Records come back in encounter order, which keeps the later length
    /// sort deterministic.
    pub fn parse(&self, text: &str) -> Result<Vec<Record>, FastaError> {
        let entries = split_entries(text);
        if entries.is_empty() {
            tracing::debug!("No entries found in input");
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_workers)
            .thread_name(|i| format!("fasta-parse-{i}"))
            .build()?;
        let records: Vec<Record> =
            pool.install(|| entries.par_iter().map(|entry| parse_entry(entry)).collect());
        drop(pool);

        let records = self.apply_empty_policy(records)?;

        tracing::debug!(
            entries = entries.len(),
            records = records.len(),
            workers = self.num_workers,
            "Parsed sequence records"
        );
        Ok(records)
    }

    fn apply_empty_policy(&self, records: Vec<Record>) -> Result<Vec<Record>, FastaError> {
        let empty = records.iter().filter(|r| r.is_empty()).count();
        if empty == 0 {
            return Ok(records);
        }

        match self.empty_sequences {
            EmptySequencePolicy::Keep => {
                tracing::warn!(empty, "Keeping records with empty sequences");
                Ok(records)
            }
            EmptySequencePolicy::Skip => {
                tracing::warn!(empty, "Skipping records with empty sequences");
                Ok(records.into_iter().filter(|r| !r.is_empty()).collect())
            }
            EmptySequencePolicy::Reject => {
                let identifier = records
                    .into_iter()
                    .find(|r| r.is_empty())
                    .map(|r| r.identifier)
                    .unwrap_or_default();
                Err(FastaError::EmptySequence { identifier })
            }
        }
    }
}
