//! Persisted metadata records
//!
//! Stored with bincode under the keys built in [`crate::common::keys`].

use serde::{Deserialize, Serialize};

/// Lifecycle state shared by graphs, partitions and shard groups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionState {
    #[default]
    Unknown,
    Normal,
    Warn,
    Offline,
    Tombstone,
}

/// A named logical dataset split into partitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub graph_name: String,
    pub partition_count: u32,
    pub state: PartitionState,
}

impl Graph {
    pub fn new(graph_name: impl Into<String>, partition_count: u32) -> Self {
        Self {
            graph_name: graph_name.into(),
            partition_count,
            state: PartitionState::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardRole {
    #[default]
    Follower,
    Leader,
    Learner,
}

/// One replica placement on a physical store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub store_id: u64,
    pub role: ShardRole,
}

impl Shard {
    pub fn leader(store_id: u64) -> Self {
        Self {
            store_id,
            role: ShardRole::Leader,
        }
    }

    pub fn follower(store_id: u64) -> Self {
        Self {
            store_id,
            role: ShardRole::Follower,
        }
    }
}

/// Contiguous routing-range slice of one graph
///
/// `[start_key, end_key)` is the half-open interval of routing codes this
/// partition owns. The backing shard group has the same id as the partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub graph_name: String,
    pub id: u32,
    pub version: u64,
    pub conf_ver: u64,
    pub start_key: u64,
    pub end_key: u64,
    pub shards: Vec<Shard>,
    pub state: PartitionState,
}

impl Partition {
    pub fn new(graph_name: impl Into<String>, id: u32, start_key: u64, end_key: u64) -> Self {
        Self {
            graph_name: graph_name.into(),
            id,
            version: 0,
            conf_ver: 0,
            start_key,
            end_key,
            shards: Vec::new(),
            state: PartitionState::Normal,
        }
    }

    /// Does this partition's routing interval contain `code`?
    pub fn contains(&self, code: u64) -> bool {
        self.start_key <= code && code < self.end_key
    }
}

/// Set of physical store placements backing one partition id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardGroup {
    pub id: u32,
    pub version: u64,
    pub conf_ver: u64,
    pub shards: Vec<Shard>,
    pub state: PartitionState,
}

impl ShardGroup {
    pub fn new(id: u32, shards: Vec<Shard>) -> Self {
        Self {
            id,
            version: 0,
            conf_ver: 0,
            shards,
            state: PartitionState::Normal,
        }
    }

    pub fn leader(&self) -> Option<&Shard> {
        self.shards.iter().find(|s| s.role == ShardRole::Leader)
    }
}

/// Runtime metrics reported for one partition id
///
/// A partition can serve several logical graphs; one copy is stored per
/// entry in `graph_names`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub id: u32,
    pub graph_names: Vec<String>,
    pub leader: Option<Shard>,
    pub approximate_size: u64,
    pub approximate_keys: u64,
    pub state: PartitionState,
    pub timestamp: u64,
}
