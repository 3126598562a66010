//! Chunked columnar tables for streaming statistics.
//!
//! This crate focuses on:
//! - Chunked columns and tables over Arrow arrays (Arrow itself has no chunked table type).
//! - A vectorized elementwise compute adapter that returns explicit results instead of nulls.
//! - Row alignment of partial tables against a canonical key order.
//! - Slicing tables into batch-sized pieces and moving tables through Arrow IPC.

#![forbid(unsafe_code)]

mod batches;
mod column;
pub mod compute;
mod error;
pub mod ipc;
mod reindex;
mod table;

pub use crate::batches::{concat_tables, TableSlicer};
pub use crate::column::ChunkedColumn;
pub use crate::compute::Datum;
pub use crate::error::{ColumnarError, ColumnarResult};
pub use crate::reindex::{copy_matched_rows, copy_matched_rows_with, ReindexOptions};
pub use crate::table::Table;
