//! Partition and graph metadata
//!
//! - `store`: durable ordered key-value access (RocksDB or in-memory)
//! - `cache`: in-memory index for point and routing-code lookups
//! - `partition`: the service that keeps both consistent

pub mod cache;
pub mod partition;
pub mod store;
pub mod types;

pub use cache::PartitionCache;
pub use partition::PartitionMeta;
pub use store::{MemStore, MetadataStore, RecordStore, RocksStore};
pub use types::{Graph, Partition, PartitionState, PartitionStats, Shard, ShardGroup, ShardRole};
