#![forbid(unsafe_code)]

use crate::column::ChunkedColumn;
use crate::error::{ColumnarError, ColumnarResult};
use arrow_array::{ArrayRef, RecordBatch, UInt64Array};
use arrow_schema::{Schema, SchemaRef};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// An ordered set of named, equal-length [`ChunkedColumn`]s.
///
/// Column 0 conventionally holds the row key (e.g. a gene id) and the remaining
/// columns hold numeric observations.
#[derive(Clone, Debug)]
pub struct Table {
    schema: SchemaRef,
    columns: Vec<ChunkedColumn>,
    rows: usize,
}

impl Table {
    pub fn try_new(schema: SchemaRef, columns: Vec<ChunkedColumn>) -> ColumnarResult<Self> {
        if schema.fields().len() != columns.len() {
            return Err(ColumnarError::SchemaMismatch(format!(
                "schema has {} fields but {} columns were given",
                schema.fields().len(),
                columns.len()
            )));
        }

        for (field, column) in schema.fields().iter().zip(&columns) {
            if field.data_type() != column.data_type() {
                return Err(ColumnarError::TypeMismatch {
                    expected: field.data_type().clone(),
                    actual: column.data_type().clone(),
                });
            }
        }

        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != rows) {
            return Err(ColumnarError::LengthMismatch {
                expected: rows,
                actual: bad.len(),
            });
        }

        Ok(Self {
            schema,
            columns,
            rows,
        })
    }

    /// Build a table whose columns are chunked by `batches`.
    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> ColumnarResult<Self> {
        let width = schema.fields().len();
        if let Some(bad) = batches.iter().find(|b| b.num_columns() != width) {
            return Err(ColumnarError::SchemaMismatch(format!(
                "record batch has {} columns, schema has {width}",
                bad.num_columns()
            )));
        }

        let columns = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let chunks = batches.iter().map(|b| b.column(idx).clone()).collect();
                ChunkedColumn::try_new(field.data_type().clone(), chunks)
            })
            .collect::<ColumnarResult<Vec<_>>>()?;

        Self::try_new(schema, columns)
    }

    pub fn from_batch(batch: &RecordBatch) -> ColumnarResult<Self> {
        Self::from_batches(batch.schema(), std::slice::from_ref(batch))
    }

    pub fn empty(schema: SchemaRef) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| ChunkedColumn::empty(f.data_type().clone()))
            .collect();
        Self {
            schema,
            columns,
            rows: 0,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        self.schema.metadata()
    }

    /// Replace the schema-level key/value metadata.
    pub fn with_metadata(self, metadata: HashMap<String, String>) -> Self {
        let schema = Arc::new(self.schema.as_ref().clone().with_metadata(metadata));
        Self { schema, ..self }
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ChunkedColumn] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> ColumnarResult<&ChunkedColumn> {
        self.columns
            .get(idx)
            .ok_or(ColumnarError::ColumnOutOfBounds {
                index: idx,
                count: self.columns.len(),
            })
    }

    pub fn column_by_name(&self, name: &str) -> ColumnarResult<&ChunkedColumn> {
        let idx = self
            .schema
            .index_of(name)
            .map_err(|_| ColumnarError::UnknownColumn(name.to_string()))?;
        self.column(idx)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields().iter().map(|f| f.name().as_str()).collect()
    }

    /// Zero-copy view of rows `[offset, offset + length)`.
    pub fn slice(&self, offset: usize, length: usize) -> ColumnarResult<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.slice(offset, length))
            .collect::<ColumnarResult<Vec<_>>>()?;
        Ok(Self {
            schema: self.schema.clone(),
            columns,
            rows: length,
        })
    }

    /// Rewrite every column into a single chunk.
    pub fn combine_chunks(&self) -> ColumnarResult<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.compacted())
            .collect::<ColumnarResult<Vec<_>>>()?;
        Ok(Self {
            schema: self.schema.clone(),
            columns,
            rows: self.rows,
        })
    }

    /// Select rows by index, in the order given.
    pub fn take_rows(&self, indices: &UInt64Array) -> ColumnarResult<Vec<ArrayRef>> {
        self.columns
            .iter()
            .map(|c| {
                let values = c.combine_chunks()?;
                Ok(arrow_select::take::take(values.as_ref(), indices, None)?)
            })
            .collect()
    }

    /// Record batches whose boundaries are the union of every column's chunk
    /// boundaries, so no batch straddles a chunk of any column.
    pub fn to_batches(&self) -> ColumnarResult<Vec<RecordBatch>> {
        self.to_batches_with_max_rows(None)
    }

    /// Like [`Table::to_batches`], additionally splitting batches longer than `max_rows`.
    pub fn to_batches_with_max_rows(
        &self,
        max_rows: Option<usize>,
    ) -> ColumnarResult<Vec<RecordBatch>> {
        if self.columns.is_empty() || self.rows == 0 {
            return Ok(Vec::new());
        }

        let mut cuts: BTreeSet<usize> = self.columns.iter().flat_map(|c| c.chunk_ends()).collect();
        cuts.insert(self.rows);
        if let Some(max_rows) = max_rows.filter(|&m| m > 0) {
            cuts.extend((max_rows..self.rows).step_by(max_rows));
        }

        let mut batches = Vec::with_capacity(cuts.len());
        let mut start = 0usize;
        for end in cuts {
            if end == start {
                continue;
            }
            let arrays = self
                .columns
                .iter()
                .map(|c| c.slice(start, end - start)?.combine_chunks())
                .collect::<ColumnarResult<Vec<_>>>()?;
            batches.push(RecordBatch::try_new(self.schema.clone(), arrays)?);
            start = end;
        }
        Ok(batches)
    }

    pub(crate) fn append(&mut self, other: &Table) -> ColumnarResult<()> {
        if !same_fields(&self.schema, &other.schema) {
            return Err(ColumnarError::SchemaMismatch(
                "cannot append tables with different fields".to_string(),
            ));
        }
        for (column, extra) in self.columns.iter_mut().zip(other.columns()) {
            column.append_chunks(extra)?;
        }
        self.rows += other.rows;
        Ok(())
    }
}

pub(crate) fn same_fields(a: &Schema, b: &Schema) -> bool {
    a.fields() == b.fields()
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.columns == other.columns
    }
}
