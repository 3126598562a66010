//! Align a partial table to a canonical key order.
//!
//! Partial datasets may miss entities or list them in a different order. The
//! functions here produce a table with exactly one row per canonical key, in
//! canonical order: matched keys copy the source row, missing keys get a row
//! filled with a default value.

use crate::column::ChunkedColumn;
use crate::error::ColumnarResult;
use crate::table::Table;
use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Schema, SchemaRef};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct ReindexOptions {
    /// Index of the Utf8 key column in the source table.
    pub key_column: usize,
    /// Value written to every non-key column of a row whose key is missing.
    pub fill_value: f64,
}

impl Default for ReindexOptions {
    fn default() -> Self {
        Self {
            key_column: 0,
            fill_value: 0.0,
        }
    }
}

/// Reorder and gap-fill `src` so its rows follow `ordered_ids`.
///
/// If a key occurs more than once in `src`, the first occurrence is used. A null
/// entry in `ordered_ids` yields a fill row with a null key, so the output key field
/// is marked nullable when `ordered_ids` contains nulls.
pub fn copy_matched_rows(ordered_ids: &ChunkedColumn, src: &Table) -> ColumnarResult<Table> {
    copy_matched_rows_with(ordered_ids, src, &ReindexOptions::default())
}

pub fn copy_matched_rows_with(
    ordered_ids: &ChunkedColumn,
    src: &Table,
    options: &ReindexOptions,
) -> ColumnarResult<Table> {
    let src_keys = src.column(options.key_column)?;

    // Row indices count every source row (null keys included) so they line up with `take`.
    let mut keymap: HashMap<&str, u64> = HashMap::with_capacity(src_keys.len());
    for (row, key) in src_keys.iter_str()?.enumerate() {
        if let Some(key) = key {
            keymap.entry(key).or_insert(row as u64);
        }
    }

    let schema = output_schema(src.schema(), options.key_column, ordered_ids.null_count() > 0);
    let compacted = src.combine_chunks()?;
    let mut runs = RunWriter::new(&compacted, schema.clone(), options);
    for id in ordered_ids.iter_str()? {
        match id.and_then(|k| keymap.get(k)) {
            Some(&row) => {
                runs.flush_missing()?;
                runs.matched.push(row);
            }
            None => {
                runs.flush_matched()?;
                runs.missing.push(id);
            }
        }
    }
    runs.flush_missing()?;
    runs.flush_matched()?;

    log::debug!(
        "aligned {} source rows to {} keys: {} matched, {} filled, {} batches",
        src.num_rows(),
        ordered_ids.len(),
        runs.matched_rows,
        runs.filled_rows,
        runs.batches.len()
    );

    Table::from_batches(schema, &runs.batches)
}

fn output_schema(schema: &SchemaRef, key_column: usize, null_ids: bool) -> SchemaRef {
    match schema.fields().get(key_column) {
        Some(key) if null_ids && !key.is_nullable() => {
            let fields: Vec<_> = schema
                .fields()
                .iter()
                .enumerate()
                .map(|(idx, field)| {
                    if idx == key_column {
                        Arc::new(field.as_ref().clone().with_nullable(true))
                    } else {
                        field.clone()
                    }
                })
                .collect();
            Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()))
        }
        _ => schema.clone(),
    }
}

/// Accumulates pending runs of matched row indices and missing keys, emitting one
/// record batch per run.
struct RunWriter<'a> {
    src: &'a Table,
    schema: SchemaRef,
    options: &'a ReindexOptions,
    matched: Vec<u64>,
    missing: Vec<Option<&'a str>>,
    batches: Vec<RecordBatch>,
    matched_rows: usize,
    filled_rows: usize,
}

impl<'a> RunWriter<'a> {
    fn new(src: &'a Table, schema: SchemaRef, options: &'a ReindexOptions) -> Self {
        Self {
            src,
            schema,
            options,
            matched: Vec::new(),
            missing: Vec::new(),
            batches: Vec::new(),
            matched_rows: 0,
            filled_rows: 0,
        }
    }

    fn flush_matched(&mut self) -> ColumnarResult<()> {
        if self.matched.is_empty() {
            return Ok(());
        }
        let indices = UInt64Array::from(std::mem::take(&mut self.matched));
        let columns = self.src.take_rows(&indices)?;
        self.batches
            .push(RecordBatch::try_new(self.schema.clone(), columns)?);
        self.matched_rows += indices.len();
        Ok(())
    }

    fn flush_missing(&mut self) -> ColumnarResult<()> {
        if self.missing.is_empty() {
            return Ok(());
        }
        let ids = std::mem::take(&mut self.missing);
        self.filled_rows += ids.len();
        let batch = fill_batch(
            &self.schema,
            self.options.key_column,
            &ids,
            self.options.fill_value,
        )?;
        self.batches.push(batch);
        Ok(())
    }
}

fn fill_batch(
    schema: &SchemaRef,
    key_column: usize,
    ids: &[Option<&str>],
    fill_value: f64,
) -> ColumnarResult<RecordBatch> {
    let fill: ArrayRef = Arc::new(Float64Array::from(vec![fill_value; ids.len()]));
    let columns = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            if idx == key_column {
                return Ok(Arc::new(StringArray::from(ids.to_vec())) as ArrayRef);
            }
            match field.data_type() {
                DataType::Float64 => Ok(fill.clone()),
                other => Ok(arrow_cast::cast::cast(fill.as_ref(), other)?),
            }
        })
        .collect::<ColumnarResult<Vec<_>>>()?;
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}
