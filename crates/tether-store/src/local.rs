//! Partitions stored as Arrow IPC files under a directory tree.
//!
//! A key `a/b` resolves to `<root>/a/b.arrow`. A partition too large for one file
//! is stored as a directory `<root>/a/b/` of slice files, concatenated in file name
//! order when read. Files may hold either IPC file or IPC stream format; results
//! written through [`ResultSink::put_key`] are streams.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::source::{PartitionSource, ResultSink};
use rayon::prelude::*;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tether_columnar::ipc::read_ipc_bytes;
use tether_columnar::{concat_tables, Table};

const PARTITION_EXT: &str = "arrow";

/// Cumulative counters since the store was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub partitions_read: u64,
    pub slices_read: u64,
    pub bytes_read: u64,
    pub keys_written: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Default)]
struct Counters {
    partitions_read: AtomicU64,
    slices_read: AtomicU64,
    bytes_read: AtomicU64,
    keys_written: AtomicU64,
    bytes_written: AtomicU64,
}

#[derive(Debug)]
pub struct LocalPartitionStore {
    config: StoreConfig,
    counters: Counters,
}

enum Layout {
    File(PathBuf),
    Slices(Vec<PathBuf>),
}

impl LocalPartitionStore {
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        if !config.root.is_dir() {
            return Err(StoreError::Config(format!(
                "store root {} is not a directory",
                config.root.display()
            )));
        }
        Ok(Self {
            config,
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn stats(&self) -> StoreStats {
        let c = &self.counters;
        StoreStats {
            partitions_read: c.partitions_read.load(Ordering::Relaxed),
            slices_read: c.slices_read.load(Ordering::Relaxed),
            bytes_read: c.bytes_read.load(Ordering::Relaxed),
            keys_written: c.keys_written.load(Ordering::Relaxed),
            bytes_written: c.bytes_written.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let s = self.stats();
        log::info!(
            "store {}: {} partitions ({} slices, {} bytes) read, {} keys ({} bytes) written",
            self.config.root.display(),
            s.partitions_read,
            s.slices_read,
            s.bytes_read,
            s.keys_written,
            s.bytes_written
        );
    }

    /// Path of `key` below the root, without extension. Keys are `/`-separated and
    /// may not escape the root.
    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let trimmed = key.trim_matches('/');
        if trimmed.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let mut path = self.config.root.clone();
        for part in trimmed.split('/') {
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => path.push(part),
                _ => return Err(StoreError::InvalidKey(key.to_string())),
            }
        }
        Ok(path)
    }

    fn layout(&self, key: &str) -> Result<Layout> {
        let base = self.key_path(key)?;
        let file = partition_file(&base);
        if file.is_file() {
            return Ok(Layout::File(file));
        }
        if base.is_dir() {
            return Ok(Layout::Slices(list_slices(&base)?));
        }
        Err(StoreError::NotFound(key.to_string()))
    }

    fn read_slice(&self, path: &Path) -> Result<Table> {
        let bytes = std::fs::read(path).map_err(|e| StoreError::io(path, e))?;
        let table = read_ipc_bytes(&bytes)?;
        self.counters.slices_read.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_read
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(table)
    }

    fn finish_read(&self, key: &str, slices: Vec<Table>) -> Result<Table> {
        if slices.is_empty() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        if let Some(first) = slices.first() {
            if slices.iter().any(|s| s.metadata() != first.metadata()) {
                log::warn!("slices of {key} disagree on schema metadata; keeping the first");
            }
        }
        let table = concat_tables(&slices)?;
        self.counters.partitions_read.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "read partition {key}: {} slices, {} rows",
            slices.len(),
            table.num_rows()
        );
        Ok(table)
    }
}

/// `base` with the partition extension appended (not substituted, keys may contain dots).
fn partition_file(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTITION_EXT);
    PathBuf::from(name)
}

fn list_slices(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    let mut slices = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == PARTITION_EXT) {
            slices.push(path);
        }
    }
    slices.sort();
    Ok(slices)
}

impl PartitionSource for LocalPartitionStore {
    fn get_partition(&self, key: &str) -> Result<Table> {
        let slices = match self.layout(key)? {
            Layout::File(path) => vec![self.read_slice(&path)?],
            Layout::Slices(paths) => paths
                .iter()
                .map(|p| self.read_slice(p))
                .collect::<Result<Vec<_>>>()?,
        };
        self.finish_read(key, slices)
    }

    fn map_partition(&self, key: &str, queue_depth: usize) -> Result<Table> {
        let paths = match self.layout(key)? {
            Layout::File(path) => vec![path],
            Layout::Slices(paths) => paths,
        };
        let depth = if queue_depth == 0 {
            self.config.queue_depth
        } else {
            queue_depth
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(depth.min(paths.len()).max(1))
            .build()?;
        let slices = pool.install(|| {
            paths
                .par_iter()
                .map(|p| self.read_slice(p))
                .collect::<Result<Vec<_>>>()
        })?;
        self.finish_read(key, slices)
    }
}

impl ResultSink for LocalPartitionStore {
    fn put_key(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = partition_file(&self.key_path(key)?);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        std::fs::write(&path, bytes).map_err(|e| StoreError::io(&path, e))?;
        self.counters.keys_written.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_written
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        log::debug!("wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path) -> LocalPartitionStore {
        LocalPartitionStore::open(StoreConfig::new(root)).unwrap()
    }

    #[test]
    fn keys_resolve_below_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(
            store.key_path("/annotations/genes").unwrap(),
            dir.path().join("annotations").join("genes")
        );
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for key in ["", "/", "../etc", "a/../../b", "a//b", "a/./b"] {
            assert!(
                matches!(store.key_path(key), Err(StoreError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn missing_root_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalPartitionStore::open(StoreConfig::new(dir.path().join("nope"))).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
