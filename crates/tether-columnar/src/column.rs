#![forbid(unsafe_code)]

use crate::error::{ColumnarError, ColumnarResult};
use arrow_array::cast::AsArray;
use arrow_array::types::Float64Type;
use arrow_array::{new_empty_array, Array, ArrayRef, Float64Array, StringArray};
use arrow_schema::DataType;
use std::sync::Arc;

/// A logical column of values stored as a sequence of Arrow arrays.
///
/// Chunks share one data type; row order runs through the chunks in order.
#[derive(Clone, Debug)]
pub struct ChunkedColumn {
    data_type: DataType,
    chunks: Vec<ArrayRef>,
    len: usize,
}

impl ChunkedColumn {
    pub fn try_new(data_type: DataType, chunks: Vec<ArrayRef>) -> ColumnarResult<Self> {
        if let Some(bad) = chunks.iter().find(|c| c.data_type() != &data_type) {
            return Err(ColumnarError::TypeMismatch {
                expected: data_type,
                actual: bad.data_type().clone(),
            });
        }
        let len = chunks.iter().map(|c| c.len()).sum();
        Ok(Self {
            data_type,
            chunks,
            len,
        })
    }

    pub fn from_array(array: ArrayRef) -> Self {
        Self {
            data_type: array.data_type().clone(),
            len: array.len(),
            chunks: vec![array],
        }
    }

    pub fn empty(data_type: DataType) -> Self {
        Self {
            data_type,
            chunks: Vec::new(),
            len: 0,
        }
    }

    pub fn from_f64(values: Vec<f64>) -> Self {
        Self::from_array(Arc::new(Float64Array::from(values)))
    }

    pub fn from_opt_f64(values: Vec<Option<f64>>) -> Self {
        Self::from_array(Arc::new(Float64Array::from(values)))
    }

    pub fn from_strs<S: AsRef<str>>(values: &[S]) -> Self {
        Self::from_array(Arc::new(StringArray::from_iter_values(
            values.iter().map(|s| s.as_ref()),
        )))
    }

    /// A Float64 column of `len` zeros in a single chunk.
    pub fn zeros(len: usize) -> Self {
        Self::from_f64(vec![0.0; len])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, idx: usize) -> Option<&ArrayRef> {
        self.chunks.get(idx)
    }

    pub fn chunks(&self) -> &[ArrayRef] {
        &self.chunks
    }

    pub fn null_count(&self) -> usize {
        self.chunks.iter().map(|c| c.null_count()).sum()
    }

    fn expect_type(&self, expected: &DataType) -> ColumnarResult<()> {
        if &self.data_type != expected {
            return Err(ColumnarError::TypeMismatch {
                expected: expected.clone(),
                actual: self.data_type.clone(),
            });
        }
        Ok(())
    }

    /// Iterate a Float64 column in row order; nulls are `None`.
    pub fn iter_f64(&self) -> ColumnarResult<impl Iterator<Item = Option<f64>> + '_> {
        self.expect_type(&DataType::Float64)?;
        Ok(self
            .chunks
            .iter()
            .flat_map(|c| c.as_primitive::<Float64Type>().iter()))
    }

    /// Iterate a Utf8 column in row order; nulls are `None`.
    pub fn iter_str(&self) -> ColumnarResult<impl Iterator<Item = Option<&str>> + '_> {
        self.expect_type(&DataType::Utf8)?;
        Ok(self.chunks.iter().flat_map(|c| c.as_string::<i32>().iter()))
    }

    pub fn to_f64_vec(&self) -> ColumnarResult<Vec<Option<f64>>> {
        Ok(self.to_float64()?.iter_f64()?.collect())
    }

    /// Cast every chunk to Float64. Float64 columns are returned as-is.
    pub fn to_float64(&self) -> ColumnarResult<Self> {
        if self.data_type == DataType::Float64 {
            return Ok(self.clone());
        }
        let chunks = self
            .chunks
            .iter()
            .map(|c| arrow_cast::cast::cast(c.as_ref(), &DataType::Float64))
            .collect::<Result<Vec<_>, _>>()?;
        Self::try_new(DataType::Float64, chunks)
    }

    /// Zero-copy view of rows `[offset, offset + length)`.
    pub fn slice(&self, offset: usize, length: usize) -> ColumnarResult<Self> {
        let end = offset.saturating_add(length);
        if end > self.len {
            return Err(ColumnarError::LengthMismatch {
                expected: self.len,
                actual: end,
            });
        }

        let mut chunks = Vec::new();
        let mut chunk_start = 0usize;
        for chunk in &self.chunks {
            let chunk_end = chunk_start + chunk.len();
            let lo = offset.max(chunk_start);
            let hi = end.min(chunk_end);
            if lo < hi {
                chunks.push(chunk.slice(lo - chunk_start, hi - lo));
            }
            chunk_start = chunk_end;
            if chunk_start >= end {
                break;
            }
        }

        Ok(Self {
            data_type: self.data_type.clone(),
            chunks,
            len: length,
        })
    }

    /// Concatenate all chunks into one array.
    pub fn combine_chunks(&self) -> ColumnarResult<ArrayRef> {
        match self.chunks.as_slice() {
            [] => Ok(new_empty_array(&self.data_type)),
            [only] => Ok(only.clone()),
            chunks => {
                let refs: Vec<&dyn Array> = chunks.iter().map(|c| c.as_ref()).collect();
                Ok(arrow_select::concat::concat(&refs)?)
            }
        }
    }

    /// The same column backed by a single chunk.
    pub fn compacted(&self) -> ColumnarResult<Self> {
        if self.chunks.len() == 1 {
            return Ok(self.clone());
        }
        Ok(Self::from_array(self.combine_chunks()?))
    }

    /// Exclusive end offsets of each chunk, in row order.
    pub fn chunk_ends(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .scan(0usize, |end, c| {
                *end += c.len();
                Some(*end)
            })
            .collect()
    }

    pub(crate) fn append_chunks(&mut self, other: &ChunkedColumn) -> ColumnarResult<()> {
        other.expect_type(&self.data_type)?;
        self.chunks.extend(other.chunks.iter().cloned());
        self.len += other.len;
        Ok(())
    }
}

/// Columns compare by type and logical values; chunk layout is ignored.
impl PartialEq for ChunkedColumn {
    fn eq(&self, other: &Self) -> bool {
        if self.data_type != other.data_type || self.len != other.len {
            return false;
        }
        match (self.combine_chunks(), other.combine_chunks()) {
            (Ok(a), Ok(b)) => a.to_data() == b.to_data(),
            _ => false,
        }
    }
}
