use crate::error::{Result, StoreError};
use crate::source::{PartitionSource, ResultSink};
use std::collections::HashMap;
use std::sync::Mutex;
use tether_columnar::ipc::{read_ipc_bytes, write_ipc_stream};
use tether_columnar::Table;

/// Partitions held as IPC buffers in memory.
#[derive(Debug, Default)]
pub struct InMemoryPartitionStore {
    partitions: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryPartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&self, key: &str, table: &Table) -> Result<()> {
        let bytes = write_ipc_stream(table)?;
        self.put_key(key, &bytes)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(normalize(key))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A poisoned map is still structurally valid.
        self.partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn normalize(key: &str) -> &str {
    key.trim_matches('/')
}

impl PartitionSource for InMemoryPartitionStore {
    fn get_partition(&self, key: &str) -> Result<Table> {
        let partitions = self.lock();
        let bytes = partitions
            .get(normalize(key))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(read_ipc_bytes(bytes)?)
    }
}

impl ResultSink for InMemoryPartitionStore {
    fn put_key(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let normalized = normalize(key);
        if normalized.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        self.lock().insert(normalized.to_string(), bytes.to_vec());
        Ok(())
    }
}
