//! Variable-length batches without padding.
//!
//! A [`RaggedBatch`] stores every position of every row back to back in one
//! flat `values` buffer of `positions × hidden` floats. Row `i` occupies
//! positions `row_splits[i]..row_splits[i + 1]`.

use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, Float32Array, ListArray};
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{DataType, Field};
use burn::prelude::*;
use burn::tensor::TensorData;

use crate::types::EmbeddingError;

#[derive(Debug, Clone, PartialEq)]
pub struct RaggedBatch {
    values: Vec<f32>,
    row_splits: Vec<usize>,
    hidden: usize,
}

impl RaggedBatch {
    /// Build a batch from raw parts, checking every invariant.
    pub fn new(values: Vec<f32>, row_splits: Vec<usize>, hidden: usize) -> Result<Self, EmbeddingError> {
        let batch = Self {
            values,
            row_splits,
            hidden,
        };
        batch.validate()?;
        Ok(batch)
    }

    /// A batch with no rows.
    pub fn empty(hidden: usize) -> Self {
        Self {
            values: Vec::new(),
            row_splits: vec![0],
            hidden,
        }
    }

    /// Check the row-split invariants.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.hidden == 0 {
            return Err(EmbeddingError::Shape("hidden size must be positive".to_string()));
        }
        match self.row_splits.first() {
            Some(0) => {}
            _ => {
                return Err(EmbeddingError::Shape(
                    "row splits must start at 0".to_string(),
                ))
            }
        }
        if self.row_splits.windows(2).any(|w| w[0] > w[1]) {
            return Err(EmbeddingError::Shape(
                "row splits must be non-decreasing".to_string(),
            ));
        }
        let positions = self.total_positions();
        if positions * self.hidden != self.values.len() {
            return Err(EmbeddingError::Shape(format!(
                "{positions} positions × {} hidden != {} values",
                self.hidden,
                self.values.len()
            )));
        }
        Ok(())
    }

    /// Concatenate rows of several batches, in order.
    pub fn concat(batches: &[RaggedBatch]) -> Result<Self, EmbeddingError> {
        let Some(first) = batches.first() else {
            return Err(EmbeddingError::Shape("nothing to concatenate".to_string()));
        };
        let hidden = first.hidden;

        let total_values = batches.iter().map(|b| b.values.len()).sum();
        let mut values = Vec::with_capacity(total_values);
        let mut row_splits = vec![0];

        for batch in batches {
            if batch.hidden != hidden {
                return Err(EmbeddingError::HiddenSizeMismatch {
                    expected: hidden,
                    actual: batch.hidden,
                });
            }
            let base = *row_splits.last().unwrap_or(&0);
            row_splits.extend(batch.row_splits[1..].iter().map(|s| base + s));
            values.extend_from_slice(&batch.values);
        }

        Ok(Self {
            values,
            row_splits,
            hidden,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.row_splits.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Positions in row `i`.
    pub fn row_len(&self, i: usize) -> Option<usize> {
        (i < self.num_rows()).then(|| self.row_splits[i + 1] - self.row_splits[i])
    }

    pub fn row_lengths(&self) -> Vec<usize> {
        self.row_splits.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Flat `[row_len × hidden]` values of row `i`.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.num_rows() {
            return None;
        }
        let start = self.row_splits[i] * self.hidden;
        let end = self.row_splits[i + 1] * self.hidden;
        Some(&self.values[start..end])
    }

    pub fn total_positions(&self) -> usize {
        self.row_splits.last().copied().unwrap_or(0)
    }

    pub fn max_row_len(&self) -> usize {
        self.row_lengths().into_iter().max().unwrap_or(0)
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    pub fn row_splits(&self) -> &[usize] {
        &self.row_splits
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// One single-row batch per row.
    pub fn split_rows(&self) -> Vec<RaggedBatch> {
        (0..self.num_rows())
            .filter_map(|i| {
                let row = self.row(i)?;
                Some(Self {
                    values: row.to_vec(),
                    row_splits: vec![0, row.len() / self.hidden],
                    hidden: self.hidden,
                })
            })
            .collect()
    }

    /// Row `i` as a `[row_len, hidden]` tensor.
    pub fn row_tensor<B: Backend>(&self, i: usize, device: &B::Device) -> Result<Tensor<B, 2>, EmbeddingError> {
        let row = self.row(i).ok_or_else(|| {
            EmbeddingError::Shape(format!("row {i} out of range for {} rows", self.num_rows()))
        })?;
        let len = row.len() / self.hidden;
        Ok(Tensor::from_data(TensorData::new(row.to_vec(), [len, self.hidden]), device))
    }

    /// Zero-padded `[rows, max_len, hidden]` tensor plus a `[rows, max_len]`
    /// mask holding 1.0 at real positions and 0.0 at padding.
    pub fn to_padded<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 3>, Tensor<B, 2>) {
        let rows = self.num_rows();
        let max_len = self.max_row_len();

        let mut padded = vec![0.0_f32; rows * max_len * self.hidden];
        let mut mask = vec![0.0_f32; rows * max_len];
        for (i, len) in self.row_lengths().into_iter().enumerate() {
            if let Some(row) = self.row(i) {
                let start = i * max_len * self.hidden;
                padded[start..start + row.len()].copy_from_slice(row);
            }
            mask[i * max_len..i * max_len + len].fill(1.0);
        }

        (
            Tensor::from_data(TensorData::new(padded, [rows, max_len, self.hidden]), device),
            Tensor::from_data(TensorData::new(mask, [rows, max_len]), device),
        )
    }

    /// Arrow `List<FixedSizeList<Float32, hidden>>` with one list per row.
    pub fn to_list_array(&self) -> Result<ListArray, EmbeddingError> {
        let hidden = i32::try_from(self.hidden)
            .map_err(|_| EmbeddingError::Shape(format!("hidden size {} too large", self.hidden)))?;
        let offsets = self
            .row_splits
            .iter()
            .map(|&s| i32::try_from(s))
            .collect::<Result<Vec<i32>, _>>()
            .map_err(|_| EmbeddingError::Shape("too many positions for i32 offsets".to_string()))?;

        let item = Arc::new(Field::new("item", DataType::Float32, false));
        let positions = FixedSizeListArray::try_new(
            item.clone(),
            hidden,
            Arc::new(Float32Array::from(self.values.clone())),
            None,
        )?;
        let list = ListArray::try_new(
            Arc::new(Field::new("item", DataType::FixedSizeList(item, hidden), false)),
            OffsetBuffer::new(offsets.into()),
            Arc::new(positions),
            None,
        )?;
        Ok(list)
    }

    /// Inverse of [`to_list_array`](Self::to_list_array).
    pub fn from_list_array(list: &ListArray) -> Result<Self, EmbeddingError> {
        let positions = list
            .values()
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| EmbeddingError::Shape("list items are not fixed-size lists".to_string()))?;
        let hidden = usize::try_from(positions.value_length())
            .map_err(|_| EmbeddingError::Shape("negative fixed-size list length".to_string()))?;
        let floats = positions
            .values()
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| EmbeddingError::Shape("positions are not Float32".to_string()))?;

        let offsets = list.value_offsets();
        let first = offsets.first().copied().unwrap_or(0) as usize;
        let last = offsets.last().copied().unwrap_or(0) as usize;
        let values = floats
            .values()
            .get(first * hidden..last * hidden)
            .ok_or_else(|| EmbeddingError::Shape("offsets exceed stored positions".to_string()))?
            .to_vec();
        let row_splits = offsets.iter().map(|&o| o as usize - first).collect();

        Self::new(values, row_splits, hidden)
    }
}

/// Dense `[n, len, hidden]` tensor to a ragged batch of `n` rows of `len`
/// positions each.
pub fn to_ragged<B: Backend>(tensor: Tensor<B, 3>) -> Result<RaggedBatch, EmbeddingError> {
    let [rows, len, hidden] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| EmbeddingError::Tensor(format!("{e:?}")))?;
    let row_splits = (0..=rows).map(|i| i * len).collect();
    RaggedBatch::new(values, row_splits, hidden)
}
