//! In-memory partition index
//!
//! Authoritative view of graphs, partitions and shard groups for one
//! process. Point lookups by `(graph, id)` and by routing code; every
//! mutation happens under one write guard so a reader never sees a
//! half-applied update.

use crate::meta::types::{Graph, Partition, Shard, ShardGroup};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct GraphPartitions {
    by_id: BTreeMap<u32, Partition>,
    /// start_key -> partition id
    by_start: BTreeMap<u64, u32>,
}

impl GraphPartitions {
    fn insert(&mut self, partition: Partition) {
        if let Some(old) = self.by_id.get(&partition.id) {
            if self.by_start.get(&old.start_key) == Some(&old.id) {
                self.by_start.remove(&old.start_key);
            }
        }
        self.by_start.insert(partition.start_key, partition.id);
        self.by_id.insert(partition.id, partition);
    }

    fn remove(&mut self, id: u32) -> Option<Partition> {
        let removed = self.by_id.remove(&id)?;
        if self.by_start.get(&removed.start_key) == Some(&id) {
            self.by_start.remove(&removed.start_key);
        }
        Some(removed)
    }

    fn find_by_code(&self, code: u64) -> Option<&Partition> {
        let (_, id) = self.by_start.range(..=code).next_back()?;
        self.by_id.get(id).filter(|p| p.contains(code))
    }
}

#[derive(Default)]
struct Index {
    graphs: HashMap<String, Graph>,
    partitions: HashMap<String, GraphPartitions>,
    shard_groups: HashMap<u32, ShardGroup>,
}

/// Partition cache shared by all readers and writers of one process
#[derive(Default)]
pub struct PartitionCache {
    index: RwLock<Index>,
}

impl PartitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    // === Writes ===

    pub fn update_graph(&self, graph: Graph) {
        self.index.write().graphs.insert(graph.graph_name.clone(), graph);
    }

    pub fn update_partition(&self, partition: Partition) {
        self.index
            .write()
            .partitions
            .entry(partition.graph_name.clone())
            .or_default()
            .insert(partition);
    }

    pub fn update_shard_group(&self, group: ShardGroup) {
        self.index.write().shard_groups.insert(group.id, group);
    }

    pub fn remove(&self, graph_name: &str, id: u32) -> Option<Partition> {
        self.index
            .write()
            .partitions
            .get_mut(graph_name)
            .and_then(|parts| parts.remove(id))
    }

    /// Drop every partition of a graph; the graph record stays.
    pub fn remove_all(&self, graph_name: &str) -> usize {
        self.index
            .write()
            .partitions
            .remove(graph_name)
            .map_or(0, |parts| parts.by_id.len())
    }

    pub fn remove_graph(&self, graph_name: &str) -> Option<Graph> {
        self.index.write().graphs.remove(graph_name)
    }

    pub fn remove_shard_group(&self, id: u32) -> Option<ShardGroup> {
        self.index.write().shard_groups.remove(&id)
    }

    pub fn clear(&self) {
        *self.index.write() = Index::default();
    }

    // === Reads ===

    pub fn get_partition_by_id(&self, graph_name: &str, id: u32) -> Option<Partition> {
        self.index
            .read()
            .partitions
            .get(graph_name)
            .and_then(|parts| parts.by_id.get(&id).cloned())
    }

    /// Partition whose `[start_key, end_key)` contains `code`.
    pub fn get_partition_by_code(&self, graph_name: &str, code: u64) -> Option<Partition> {
        self.index
            .read()
            .partitions
            .get(graph_name)
            .and_then(|parts| parts.find_by_code(code).cloned())
    }

    /// Partitions of a graph ordered by id.
    pub fn get_partitions(&self, graph_name: &str) -> Vec<Partition> {
        self.index
            .read()
            .partitions
            .get(graph_name)
            .map(|parts| parts.by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Graphs ordered by name.
    pub fn get_graphs(&self) -> Vec<Graph> {
        let mut graphs: Vec<Graph> = self.index.read().graphs.values().cloned().collect();
        graphs.sort_by(|a, b| a.graph_name.cmp(&b.graph_name));
        graphs
    }

    pub fn get_graph(&self, graph_name: &str) -> Option<Graph> {
        self.index.read().graphs.get(graph_name).cloned()
    }

    pub fn has_graph(&self, graph_name: &str) -> bool {
        self.index.read().graphs.contains_key(graph_name)
    }

    pub fn get_shard_group(&self, id: u32) -> Option<ShardGroup> {
        self.index.read().shard_groups.get(&id).cloned()
    }

    pub fn has_shard_group(&self, id: u32) -> bool {
        self.index.read().shard_groups.contains_key(&id)
    }

    /// Shard groups ordered by id.
    pub fn get_shard_groups(&self) -> Vec<ShardGroup> {
        let mut groups: Vec<ShardGroup> =
            self.index.read().shard_groups.values().cloned().collect();
        groups.sort_by_key(|g| g.id);
        groups
    }

    /// Leader replica of the shard group backing `partition_id`.
    pub fn get_leader_shard(&self, partition_id: u32) -> Option<Shard> {
        self.index
            .read()
            .shard_groups
            .get(&partition_id)
            .and_then(|g| g.leader().cloned())
    }
}
