//! Partition sources and result sinks for aggregation experiments.
//!
//! This crate exposes:
//! - The [`PartitionSource`] / [`ResultSink`] seams used by the experiment drivers
//! - A directory-backed store of Arrow IPC partitions with parallel slice reads
//! - An in-memory store for tests and embedding
//! - JSON store configuration

mod config;
mod error;
mod local;
mod memory;
mod source;

pub use config::{StoreConfig, DEFAULT_QUEUE_DEPTH};
pub use error::{Result, StoreError};
pub use local::{LocalPartitionStore, StoreStats};
pub use memory::InMemoryPartitionStore;
pub use source::{PartitionSource, ResultSink};
