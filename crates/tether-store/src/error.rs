use std::path::PathBuf;
use tether_columnar::ColumnarError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("partition not found: {0}")]
    NotFound(String),
    #[error("invalid partition key: {0:?}")]
    InvalidKey(String),
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Columnar(#[from] ColumnarError),
    #[error("invalid store config: {0}")]
    Config(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to start slice readers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
