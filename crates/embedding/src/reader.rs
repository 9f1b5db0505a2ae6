//! Reads embedded records from Parquet files.

use std::path::Path;

use arrow::array::{Array, ListArray, StringArray};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::ragged::RaggedBatch;
use crate::types::EmbeddedRecord;

/// Static methods for reading embedded datasets.
pub struct EmbeddingReader;

impl EmbeddingReader {
    /// Read every record in file order.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<EmbeddedRecord>> {
        let file = std::fs::File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut records = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            records.extend(extract_records_from_batch(&batch)?);
        }

        tracing::debug!(
            count = records.len(),
            path = %path.display(),
            "Read embedded records"
        );

        Ok(records)
    }

    /// Read every embedding as one ragged batch, one row per record.
    pub fn read_ragged(path: &Path) -> anyhow::Result<Option<RaggedBatch>> {
        let rows: Vec<RaggedBatch> = Self::read_all(path)?
            .into_iter()
            .map(|r| r.embedding)
            .collect();
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(RaggedBatch::concat(&rows)?))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow::anyhow!("Missing column '{name}'"))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow::anyhow!("Column '{name}' is not StringArray"))
}

fn extract_records_from_batch(batch: &RecordBatch) -> anyhow::Result<Vec<EmbeddedRecord>> {
    let identifiers = string_column(batch, "identifier")?;
    let sequences = string_column(batch, "sequence")?;
    let embeddings = batch
        .column_by_name("embedding")
        .ok_or_else(|| anyhow::anyhow!("Missing column 'embedding'"))?
        .as_any()
        .downcast_ref::<ListArray>()
        .ok_or_else(|| anyhow::anyhow!("Column 'embedding' is not ListArray"))?;

    let rows = RaggedBatch::from_list_array(embeddings)?.split_rows();
    if rows.len() != batch.num_rows() {
        anyhow::bail!(
            "embedding column has {} rows but batch has {}",
            rows.len(),
            batch.num_rows()
        );
    }

    let records = rows
        .into_iter()
        .enumerate()
        .map(|(i, embedding)| EmbeddedRecord {
            identifier: identifiers.value(i).to_string(),
            sequence: sequences.value(i).to_string(),
            embedding,
        })
        .collect();
    Ok(records)
}
