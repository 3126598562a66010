use arrow_schema::{ArrowError, DataType};

#[derive(Debug, thiserror::Error)]
pub enum ColumnarError {
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An operand of a compute call was absent.
    #[error("null operand")]
    NullOperand,

    #[error("length mismatch: expected {expected} rows, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: DataType, actual: DataType },

    #[error("column index {index} out of bounds for table with {count} columns")]
    ColumnOutOfBounds { index: usize, count: usize },

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

pub type ColumnarResult<T> = Result<T, ColumnarError>;
