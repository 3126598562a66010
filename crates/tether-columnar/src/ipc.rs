//! Arrow IPC reading and writing for [`Table`]s.
//!
//! Partition files are usually IPC *file* format (Feather v2); buffers handed to a
//! key/value store are IPC *stream* format. [`read_ipc_bytes`] accepts either.

use crate::error::ColumnarResult;
use crate::table::Table;
use arrow_ipc::reader::{FileReader, StreamReader};
use arrow_ipc::writer::{FileWriter, StreamWriter};
use arrow_schema::ArrowError;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;

const FILE_MAGIC: &[u8] = b"ARROW1";

pub fn read_ipc_file(path: impl AsRef<Path>) -> ColumnarResult<Table> {
    let file = File::open(path.as_ref())?;
    read_ipc_file_from(BufReader::new(file))
}

pub fn read_ipc_file_from<R: Read + Seek>(reader: R) -> ColumnarResult<Table> {
    let reader = FileReader::try_new(reader, None)?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, ArrowError>>()?;
    Table::from_batches(schema, &batches)
}

pub fn read_ipc_stream_from<R: Read>(reader: R) -> ColumnarResult<Table> {
    let reader = StreamReader::try_new(reader, None)?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, ArrowError>>()?;
    Table::from_batches(schema, &batches)
}

/// Read a table from an in-memory IPC buffer in either file or stream format.
pub fn read_ipc_bytes(bytes: &[u8]) -> ColumnarResult<Table> {
    if bytes.starts_with(FILE_MAGIC) {
        read_ipc_file_from(Cursor::new(bytes))
    } else {
        read_ipc_stream_from(bytes)
    }
}

/// Serialize a table into an IPC stream buffer (schema metadata included).
pub fn write_ipc_stream(table: &Table) -> ColumnarResult<Vec<u8>> {
    let mut writer = StreamWriter::try_new(Vec::new(), table.schema())?;
    for batch in table.to_batches()? {
        writer.write(&batch)?;
    }
    writer.finish()?;
    Ok(writer.into_inner()?)
}

pub fn write_ipc_file(table: &Table, path: impl AsRef<Path>) -> ColumnarResult<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = FileWriter::try_new(BufWriter::new(file), table.schema())?;
    for batch in table.to_batches()? {
        writer.write(&batch)?;
    }
    writer.finish()?;
    writer.into_inner()?.flush()?;
    Ok(())
}
