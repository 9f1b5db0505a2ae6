//! Length-ordered dataset construction.
//!
//! The embedding model's cost grows with sequence length, and batching
//! backends pad to the longest sequence in a batch. Presenting records
//! shortest-first keeps batches uniform and padding small.

use std::path::Path;

use crate::parser::{ParserConfig, RecordParser};
use crate::types::{Dataset, FastaError, Record};

/// Builds an ordered [`Dataset`] from an unordered collection of records.
pub struct DatasetBuilder;

impl DatasetBuilder {
    /// Stable sort by sequence length; equal lengths keep encounter order.
    pub fn build(mut records: Vec<Record>) -> Dataset {
        records.sort_by_key(Record::len);
        Dataset::from_sorted(records)
    }
}

/// Read a FASTA file, parse it in parallel, and return the length-ordered dataset.
pub fn load_dataset(path: &Path, config: &ParserConfig) -> Result<Dataset, FastaError> {
    let text = std::fs::read_to_string(path)?;
    let parser = RecordParser::from_config(config)?;
    let dataset = DatasetBuilder::build(parser.parse(&text)?);

    tracing::info!(
        records = dataset.len(),
        workers = parser.num_workers(),
        path = %path.display(),
        "Loaded sequence dataset"
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sorts_ascending() {
        let ds = DatasetBuilder::build(vec![
            Record::new("long", "MKVLAAG"),
            Record::new("short", "M"),
            Record::new("mid", "MKV"),
        ]);
        let ids: Vec<&str> = ds.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["short", "mid", "long"]);
    }

    #[test]
    fn test_build_is_stable_for_equal_lengths() {
        let ds = DatasetBuilder::build(vec![
            Record::new("b1", "MKV"),
            Record::new("a", "M"),
            Record::new("b2", "AAA"),
            Record::new("b3", "GGG"),
        ]);
        let ids: Vec<&str> = ds.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b1", "b2", "b3"]);
    }

    #[test]
    fn test_build_empty() {
        let ds = DatasetBuilder::build(Vec::new());
        assert!(ds.is_empty());
        assert_eq!(ds.iter().count(), 0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_dataset(Path::new("/nonexistent/input.fasta"), &ParserConfig::default())
            .unwrap_err();
        assert!(matches!(err, FastaError::Io(_)));
    }
}
