use tether_columnar::ColumnarError;

#[derive(Debug, thiserror::Error)]
pub enum AggrError {
    #[error(transparent)]
    Columnar(#[from] ColumnarError),

    #[error("aggregate has not been initialized")]
    Uninitialized,

    #[error("aggregate is already initialized")]
    AlreadyInitialized,

    #[error("empty column range [{start}, {stop})")]
    EmptyColumnRange { start: usize, stop: usize },

    #[error("column index {index} out of range for table with {count} columns")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("length mismatch: aggregate has {expected} rows, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("schema metadata has no `{0}` entry")]
    MissingCount(&'static str),

    #[error("invalid aggregate count: {0}")]
    InvalidCount(String),

    #[error("merged count overflows: {left} + {right}")]
    CountOverflow { left: u64, right: u64 },

    #[error("unknown aggregate mode: {0}")]
    InvalidMode(String),
}

pub type AggrResult<T> = Result<T, AggrError>;
