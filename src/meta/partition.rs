//! Partition metadata service
//!
//! The only writer of both the [`PartitionCache`] and the [`MetadataStore`].
//! Writes hit the store first and the cache second; the cache is a derived
//! projection that [`PartitionMeta::reload`] can always rebuild.

use crate::common::keys;
use crate::common::utils::validate_graph_name;
use crate::common::{PartitionConfig, Result};
use crate::meta::cache::PartitionCache;
use crate::meta::store::{MetadataStore, RecordStore};
use crate::meta::types::{Graph, Partition, PartitionStats, ShardGroup};
use crate::proto::ErrorType;
use crate::watch::{ChangeType, PartitionEvent, WatchSubject};
use crate::Error;
use std::sync::Arc;

/// Graph name suffixes reserved for administrative graphs.
const SYSTEM_GRAPH_SUFFIXES: [&str; 2] = ["/s", "/m"];

/// Administrative graphs always have exactly one partition.
pub fn is_system_graph(graph_name: &str) -> bool {
    SYSTEM_GRAPH_SUFFIXES
        .iter()
        .any(|suffix| graph_name.ends_with(suffix))
}

pub struct PartitionMeta {
    store: Arc<dyn MetadataStore>,
    cache: PartitionCache,
    config: PartitionConfig,
    watch: Option<Arc<WatchSubject>>,
}

impl PartitionMeta {
    pub fn new(store: Arc<dyn MetadataStore>, config: PartitionConfig) -> Self {
        Self {
            store,
            cache: PartitionCache::new(),
            config,
            watch: None,
        }
    }

    /// Publish partition changes to a watch subject.
    pub fn with_watch(mut self, watch: Arc<WatchSubject>) -> Self {
        self.watch = Some(watch);
        self
    }

    pub fn cache(&self) -> &PartitionCache {
        &self.cache
    }

    // === Loading ===

    /// Load shard groups, then graphs, then every graph's partitions.
    ///
    /// Must complete before any other call is considered valid.
    pub fn init(&self) -> Result<()> {
        let groups: Vec<ShardGroup> = self.store.scan_records(&keys::shard_group_prefix())?;
        let group_count = groups.len();
        for group in groups {
            self.cache.update_shard_group(group);
        }

        let graphs: Vec<Graph> = self.store.scan_records(&keys::graph_prefix())?;
        let graph_count = graphs.len();
        let mut partition_count = 0;
        for graph in graphs {
            let partitions: Vec<Partition> = self
                .store
                .scan_records(&keys::partition_prefix(&graph.graph_name))?;
            self.cache.update_graph(graph);
            partition_count += partitions.len();
            for partition in partitions {
                self.cache.update_partition(partition);
            }
        }

        tracing::info!(
            "Partition metadata loaded: {} shard groups, {} graphs, {} partitions",
            group_count,
            graph_count,
            partition_count
        );
        Ok(())
    }

    /// Drop the cache and rebuild it from the store.
    pub fn reload(&self) -> Result<()> {
        tracing::info!("Reloading partition metadata");
        self.cache.clear();
        self.init()
    }

    // === Partitions ===

    /// Cache first, then the store; a store hit is cached before returning.
    pub fn get_partition_by_id(&self, graph_name: &str, id: u32) -> Result<Option<Partition>> {
        if let Some(partition) = self.cache.get_partition_by_id(graph_name, id) {
            return Ok(Some(partition));
        }

        let partition: Option<Partition> = self
            .store
            .get_record(&keys::partition_key(graph_name, id))?;
        if let Some(partition) = &partition {
            self.cache.update_partition(partition.clone());
        }
        Ok(partition)
    }

    /// Every cached partition with this id, across all graphs.
    pub fn get_partitions_by_id(&self, id: u32) -> Vec<Partition> {
        self.cache
            .get_graphs()
            .iter()
            .filter_map(|g| self.cache.get_partition_by_id(&g.graph_name, id))
            .collect()
    }

    /// Routing lookup; served from the cache only.
    pub fn get_partition_by_code(&self, graph_name: &str, code: u64) -> Option<Partition> {
        self.cache.get_partition_by_code(graph_name, code)
    }

    pub fn get_partitions(&self, graph_name: &str) -> Vec<Partition> {
        self.cache.get_partitions(graph_name)
    }

    pub fn get_all_partitions(&self) -> Vec<Partition> {
        self.cache
            .get_graphs()
            .iter()
            .flat_map(|g| self.cache.get_partitions(&g.graph_name))
            .collect()
    }

    /// Persist a partition, creating its graph with the default partition
    /// count when the graph record does not exist yet.
    pub fn update_partition(&self, partition: Partition) -> Result<Partition> {
        let graph = self.get_and_create_default_graph(&partition.graph_name)?;
        self.check_partition(&graph, &partition)?;

        let existed = self
            .cache
            .get_partition_by_id(&partition.graph_name, partition.id)
            .is_some();
        self.store.put_record(
            &keys::partition_key(&partition.graph_name, partition.id),
            &partition,
        )?;
        self.cache.update_partition(partition.clone());

        let change = if existed {
            ChangeType::Alter
        } else {
            ChangeType::Add
        };
        self.publish(&partition.graph_name, partition.id, change);
        Ok(partition)
    }

    /// Re-read the persisted partition, overlay `version`, `conf_ver` and
    /// `shards` from `partition`, and write it back. Last write wins.
    pub fn update_shard_list(&self, partition: &Partition) -> Result<Partition> {
        let graph = self.get_and_create_default_graph(&partition.graph_name)?;

        let mut current = self
            .get_partition_by_id(&partition.graph_name, partition.id)?
            .ok_or_else(|| {
                Error::business(
                    ErrorType::PartitionNotFound,
                    format!(
                        "partition {}/{} not found",
                        partition.graph_name, partition.id
                    ),
                )
            })?;
        current.version = partition.version;
        current.conf_ver = partition.conf_ver;
        current.shards = partition.shards.clone();
        self.check_partition(&graph, &current)?;

        self.store.put_record(
            &keys::partition_key(&current.graph_name, current.id),
            &current,
        )?;
        self.cache.update_partition(current.clone());
        self.publish(&current.graph_name, current.id, ChangeType::Alter);
        Ok(current)
    }

    /// Cache first so no reader sees the entry once store deletion begins.
    pub fn remove_partition(&self, graph_name: &str, id: u32) -> Result<u64> {
        self.cache.remove(graph_name, id);
        let removed = self.store.remove(&keys::partition_key(graph_name, id))?;
        if removed > 0 {
            self.publish(graph_name, id, ChangeType::Del);
        }
        Ok(removed)
    }

    /// Remove every partition of a graph; the graph record is untouched.
    pub fn remove_all_partitions(&self, graph_name: &str) -> Result<u64> {
        let cached = self.cache.get_partitions(graph_name);
        self.cache.remove_all(graph_name);
        let removed = self
            .store
            .remove_by_prefix(&keys::partition_prefix(graph_name))?;
        for partition in cached {
            self.publish(graph_name, partition.id, ChangeType::Del);
        }
        tracing::info!("Removed {} partitions of graph {}", removed, graph_name);
        Ok(removed)
    }

    fn check_partition(&self, graph: &Graph, partition: &Partition) -> Result<()> {
        if partition.id >= graph.partition_count {
            return Err(Error::business(
                ErrorType::InvalidPartitionId,
                format!(
                    "partition id {} out of range for graph {} ({} partitions)",
                    partition.id, graph.graph_name, graph.partition_count
                ),
            ));
        }
        if !partition.shards.is_empty() && !self.cache.has_shard_group(partition.id) {
            return Err(Error::business(
                ErrorType::ShardGroupNotFound,
                format!("shard group {} not found", partition.id),
            ));
        }
        Ok(())
    }

    fn publish(&self, graph_name: &str, id: u32, change: ChangeType) {
        if let Some(watch) = &self.watch {
            watch.notify_partition_change(PartitionEvent::new(graph_name, id, change));
        }
    }

    // === Partition stats ===

    /// One copy per associated graph, so per-graph lookups stay point reads.
    pub fn update_partition_stats(&self, stats: &PartitionStats) -> Result<()> {
        for graph_name in &stats.graph_names {
            self.store
                .put_record(&keys::partition_status_key(graph_name, stats.id), stats)?;
        }
        Ok(())
    }

    pub fn get_partition_stats(&self, graph_name: &str, id: u32) -> Result<Option<PartitionStats>> {
        self.store
            .get_record(&keys::partition_status_key(graph_name, id))
    }

    pub fn get_partition_stats_by_graph(&self, graph_name: &str) -> Result<Vec<PartitionStats>> {
        self.store
            .scan_records(&keys::partition_status_prefix(graph_name))
    }

    // === Graphs ===

    pub fn get_and_create_default_graph(&self, graph_name: &str) -> Result<Graph> {
        self.get_and_create_graph(graph_name, self.config.total_count)
    }

    /// Existing graph, or a new one with `partition_count` clamped to the
    /// configured maximum (1 for system graphs).
    pub fn get_and_create_graph(&self, graph_name: &str, partition_count: u32) -> Result<Graph> {
        if let Some(graph) = self.cache.get_graph(graph_name) {
            return Ok(graph);
        }
        validate_graph_name(graph_name)?;

        let mut count = match partition_count {
            0 => self.config.total_count,
            n => n.min(self.config.total_count),
        };
        if is_system_graph(graph_name) {
            count = 1;
        }

        self.update_graph(Graph::new(graph_name, count))
    }

    pub fn update_graph(&self, graph: Graph) -> Result<Graph> {
        tracing::info!("Update graph {} ({} partitions)", graph.graph_name, graph.partition_count);
        self.store
            .put_record(&keys::graph_key(&graph.graph_name), &graph)?;
        self.cache.update_graph(graph.clone());
        Ok(graph)
    }

    pub fn get_graph(&self, graph_name: &str) -> Result<Option<Graph>> {
        self.store.get_record(&keys::graph_key(graph_name))
    }

    pub fn get_graphs(&self) -> Result<Vec<Graph>> {
        self.store.scan_records(&keys::graph_prefix())
    }

    /// Delete the graph record. Its partitions are left to
    /// [`Self::remove_all_partitions`].
    pub fn remove_graph(&self, graph_name: &str) -> Result<u64> {
        let removed = self.store.remove(&keys::graph_key(graph_name))?;
        self.cache.remove_graph(graph_name);
        Ok(removed)
    }

    // === Shard groups ===

    pub fn update_shard_group(&self, group: ShardGroup) -> Result<ShardGroup> {
        self.store
            .put_record(&keys::shard_group_key(group.id), &group)?;
        self.cache.update_shard_group(group.clone());
        Ok(group)
    }

    pub fn get_shard_group(&self, id: u32) -> Result<Option<ShardGroup>> {
        if let Some(group) = self.cache.get_shard_group(id) {
            return Ok(Some(group));
        }
        self.store.get_record(&keys::shard_group_key(id))
    }

    pub fn get_shard_groups(&self) -> Vec<ShardGroup> {
        self.cache.get_shard_groups()
    }

    pub fn remove_shard_group(&self, id: u32) -> Result<u64> {
        self.cache.remove_shard_group(id);
        self.store.remove(&keys::shard_group_key(id))
    }
}
