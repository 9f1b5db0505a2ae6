//! Writes embedded records to Parquet files using Arrow.

use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::ragged::RaggedBatch;
use crate::types::{EmbeddedRecord, EmbeddingError};

/// Arrow schema for embedded datasets with the given hidden size.
pub fn embedding_schema(hidden: usize) -> Schema {
    let item = Arc::new(Field::new("item", DataType::Float32, false));
    let position = Field::new("item", DataType::FixedSizeList(item, hidden as i32), false);
    Schema::new(vec![
        Field::new("identifier", DataType::Utf8, false),
        Field::new("sequence", DataType::Utf8, false),
        Field::new("embedding", DataType::List(Arc::new(position)), false),
    ])
}

/// Buffers embedded records and writes them to one Parquet file.
pub struct EmbeddingWriter {
    records: Vec<EmbeddedRecord>,
    output_path: PathBuf,
    hidden: usize,
}

impl EmbeddingWriter {
    pub fn new(output_path: PathBuf, hidden: usize) -> Self {
        Self {
            records: Vec::new(),
            output_path,
            hidden,
        }
    }

    /// Buffer one record; its embedding must be a single row of `hidden` features.
    pub fn record(&mut self, record: EmbeddedRecord) -> Result<(), EmbeddingError> {
        if record.hidden() != self.hidden {
            return Err(EmbeddingError::HiddenSizeMismatch {
                expected: self.hidden,
                actual: record.hidden(),
            });
        }
        if record.embedding.num_rows() != 1 {
            return Err(EmbeddingError::Shape(format!(
                "record '{}' has {} embedding rows, expected 1",
                record.identifier,
                record.embedding.num_rows()
            )));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn record_all(&mut self, records: Vec<EmbeddedRecord>) -> Result<(), EmbeddingError> {
        for record in records {
            self.record(record)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write all buffered records and return the output path.
    pub fn finish(self) -> anyhow::Result<PathBuf> {
        let schema = Arc::new(embedding_schema(self.hidden));

        let batch = if self.records.is_empty() {
            RecordBatch::new_empty(schema.clone())
        } else {
            build_record_batch(schema.clone(), &self.records)?
        };

        let file = std::fs::File::create(&self.output_path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::info!(
            records = self.records.len(),
            hidden = self.hidden,
            path = %self.output_path.display(),
            "Wrote embedding Parquet file"
        );

        Ok(self.output_path)
    }
}

fn build_record_batch(schema: Arc<Schema>, records: &[EmbeddedRecord]) -> anyhow::Result<RecordBatch> {
    let identifiers: StringArray = records.iter().map(|r| Some(r.identifier.as_str())).collect();
    let sequences: StringArray = records.iter().map(|r| Some(r.sequence.as_str())).collect();

    let rows: Vec<RaggedBatch> = records.iter().map(|r| r.embedding.clone()).collect();
    let embeddings = RaggedBatch::concat(&rows)?.to_list_array()?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(identifiers),
        Arc::new(sequences),
        Arc::new(embeddings),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}
