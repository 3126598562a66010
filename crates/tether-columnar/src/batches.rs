use crate::error::{ColumnarError, ColumnarResult};
use crate::table::Table;
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;

/// Splits a table into successive slices of `batch_count` record batches each.
///
/// Every slice is compacted into single-chunk columns before it is handed out, so a
/// consumer sees one contiguous block per column. The final slice may hold fewer
/// batches.
#[derive(Debug)]
pub struct TableSlicer {
    schema: SchemaRef,
    batches: std::vec::IntoIter<RecordBatch>,
    batch_count: usize,
}

impl TableSlicer {
    pub fn new(table: &Table, batch_count: usize) -> ColumnarResult<Self> {
        Self::with_max_rows(table, batch_count, None)
    }

    /// Like [`TableSlicer::new`], but first re-chunks the table so no record batch
    /// holds more than `max_rows` rows. Useful when the source has a single batch.
    pub fn with_max_rows(
        table: &Table,
        batch_count: usize,
        max_rows: Option<usize>,
    ) -> ColumnarResult<Self> {
        Ok(Self {
            schema: table.schema().clone(),
            batches: table.to_batches_with_max_rows(max_rows)?.into_iter(),
            batch_count: batch_count.max(1),
        })
    }
}

impl Iterator for TableSlicer {
    type Item = ColumnarResult<Table>;

    fn next(&mut self) -> Option<Self::Item> {
        let slice: Vec<RecordBatch> = self.batches.by_ref().take(self.batch_count).collect();
        if slice.is_empty() {
            return None;
        }
        Some(Table::from_batches(self.schema.clone(), &slice).and_then(|t| t.combine_chunks()))
    }
}

/// Concatenate tables with identical fields. The chunks are shared, not copied.
pub fn concat_tables(tables: &[Table]) -> ColumnarResult<Table> {
    let (first, rest) = tables
        .split_first()
        .ok_or_else(|| ColumnarError::SchemaMismatch("no tables to concatenate".to_string()))?;
    let mut out = first.clone();
    for table in rest {
        out.append(table)?;
    }
    Ok(out)
}
