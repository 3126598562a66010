use crate::error::Result;
use tether_columnar::Table;

/// Something that can hand out partitions (tables) by key.
pub trait PartitionSource {
    fn get_partition(&self, key: &str) -> Result<Table>;

    /// Fetch a partition whose slices may be read concurrently, up to
    /// `queue_depth` at a time. Schema metadata (e.g. the observation count of a
    /// partial aggregate) is carried through.
    fn map_partition(&self, key: &str, queue_depth: usize) -> Result<Table> {
        let _ = queue_depth;
        self.get_partition(key)
    }
}

/// Destination for serialized results.
pub trait ResultSink {
    fn put_key(&self, key: &str, bytes: &[u8]) -> Result<()>;
}
