use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Where partitions live and how many slices may be fetched at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the partition tree.
    pub root: PathBuf,
    /// Optional key prefix for dataset partitions (see [`StoreConfig::domain_key`]).
    #[serde(default)]
    pub domain: Option<String>,
    /// Maximum number of slices read concurrently by a mapped fetch (default: 16).
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            domain: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 {
            return Err(StoreError::Config("queue_depth must be at least 1".to_string()));
        }
        if self.root.as_os_str().is_empty() {
            return Err(StoreError::Config("root must not be empty".to_string()));
        }
        Ok(())
    }

    /// `name` prefixed with the configured domain, if any.
    pub fn domain_key(&self, name: &str) -> String {
        match self.domain.as_deref().map(|d| d.trim_matches('/')) {
            Some(domain) if !domain.is_empty() => format!("{domain}/{name}"),
            _ => name.to_string(),
        }
    }
}
