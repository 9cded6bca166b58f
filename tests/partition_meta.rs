//! Partition metadata against a real RocksDB store: persistence, reload,
//! routing lookups and graph creation rules

use graphpd::common::PartitionConfig;
use graphpd::meta::{
    MetadataStore, Partition, PartitionMeta, PartitionStats, PartitionState, RocksStore, Shard,
    ShardGroup,
};
use graphpd::proto::ErrorType;
use graphpd::watch::{ChangeType, PartitionEvent, WatchEvent, WatchSubject};
use graphpd::Error;
use std::sync::Arc;
use tempfile::TempDir;

fn config(total_count: u32) -> PartitionConfig {
    PartitionConfig {
        total_count,
        shard_count: 3,
    }
}

fn open(dir: &TempDir, total_count: u32) -> PartitionMeta {
    let store: Arc<dyn MetadataStore> = Arc::new(RocksStore::open(dir.path()).unwrap());
    let meta = PartitionMeta::new(store, config(total_count));
    meta.init().unwrap();
    meta
}

#[test]
fn test_metadata_survives_restart() {
    let dir = TempDir::new().unwrap();

    {
        let meta = open(&dir, 10);
        meta.update_shard_group(ShardGroup::new(0, vec![Shard::leader(1), Shard::follower(2)]))
            .unwrap();
        let mut p0 = Partition::new("g", 0, 0, 1000);
        p0.shards = vec![Shard::leader(1), Shard::follower(2)];
        meta.update_partition(p0).unwrap();
        meta.update_partition(Partition::new("g", 1, 1000, 2000)).unwrap();
        meta.get_and_create_graph("ns/s", 10).unwrap();
    }

    // Reopen: everything comes back through init()
    let meta = open(&dir, 10);
    assert_eq!(meta.get_partitions("g").len(), 2);
    assert_eq!(meta.cache().get_graph("g").unwrap().partition_count, 10);
    assert_eq!(meta.cache().get_graph("ns/s").unwrap().partition_count, 1);
    assert_eq!(meta.get_shard_groups().len(), 1);
    assert_eq!(
        meta.cache().get_leader_shard(0).map(|s| s.store_id),
        Some(1)
    );
    assert_eq!(meta.get_partition_by_code("g", 1500).unwrap().id, 1);
}

#[test]
fn test_nested_graph_names_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let meta = open(&dir, 10);

    meta.update_partition(Partition::new("a", 0, 0, 10)).unwrap();
    meta.update_partition(Partition::new("a/b", 0, 0, 10)).unwrap();

    assert_eq!(meta.remove_all_partitions("a").unwrap(), 1);
    assert!(meta.get_partitions("a").is_empty());
    assert_eq!(meta.get_partitions("a/b").len(), 1);
    assert!(meta.get_partition_by_id("a/b", 0).unwrap().is_some());
}

#[test]
fn test_graph_creation_rules() {
    let dir = TempDir::new().unwrap();
    let meta = open(&dir, 10);

    assert_eq!(meta.get_and_create_graph("big", 9999).unwrap().partition_count, 10);
    assert_eq!(meta.get_and_create_graph("small", 4).unwrap().partition_count, 4);
    assert_eq!(meta.get_and_create_graph("default", 0).unwrap().partition_count, 10);
    assert_eq!(meta.get_and_create_graph("ns/s", 10).unwrap().partition_count, 1);
    assert_eq!(meta.get_and_create_graph("ns/m", 10).unwrap().partition_count, 1);

    // Existing graphs are returned untouched
    assert_eq!(meta.get_and_create_graph("small", 8).unwrap().partition_count, 4);
    assert_eq!(meta.get_graphs().unwrap().len(), 5);
}

#[test]
fn test_partition_rules() {
    let dir = TempDir::new().unwrap();
    let meta = open(&dir, 4);

    let err = meta.update_partition(Partition::new("g", 4, 0, 10)).unwrap_err();
    assert_eq!(err.error_code(), ErrorType::InvalidPartitionId as i32);

    let mut p = Partition::new("g", 2, 0, 10);
    p.shards = vec![Shard::leader(7)];
    let err = meta.update_partition(p.clone()).unwrap_err();
    assert_eq!(err.error_code(), ErrorType::ShardGroupNotFound as i32);

    meta.update_shard_group(ShardGroup::new(2, vec![Shard::leader(7)])).unwrap();
    meta.update_partition(p).unwrap();
}

#[test]
fn test_update_shard_list_overlays_fields() {
    let dir = TempDir::new().unwrap();
    let meta = open(&dir, 4);
    meta.update_shard_group(ShardGroup::new(0, vec![Shard::leader(1)])).unwrap();

    let mut original = Partition::new("g", 0, 0, 100);
    original.state = PartitionState::Warn;
    meta.update_partition(original).unwrap();

    let mut change = Partition::new("g", 0, 555, 666);
    change.version = 3;
    change.conf_ver = 2;
    change.shards = vec![Shard::leader(1), Shard::follower(2)];
    let updated = meta.update_shard_list(&change).unwrap();

    assert_eq!(updated.version, 3);
    assert_eq!(updated.conf_ver, 2);
    assert_eq!(updated.shards.len(), 2);
    // Range and state come from the persisted record
    assert_eq!((updated.start_key, updated.end_key), (0, 100));
    assert_eq!(updated.state, PartitionState::Warn);

    let missing = meta
        .update_shard_list(&Partition::new("g", 3, 0, 1))
        .unwrap_err();
    assert!(matches!(missing, Error::Business { code, .. } if code == ErrorType::PartitionNotFound as i32));
}

#[test]
fn test_update_shard_list_requires_shard_group() {
    let dir = TempDir::new().unwrap();
    let meta = open(&dir, 4);
    meta.update_partition(Partition::new("g", 1, 0, 10)).unwrap();

    let mut change = Partition::new("g", 1, 0, 10);
    change.shards = vec![Shard::leader(42)];
    let err = meta.update_shard_list(&change).unwrap_err();
    assert_eq!(err.error_code(), ErrorType::ShardGroupNotFound as i32);

    // Nothing was written
    let stored = meta.get_partition_by_id("g", 1).unwrap().unwrap();
    assert!(stored.shards.is_empty());

    meta.update_shard_group(ShardGroup::new(1, vec![Shard::leader(42)])).unwrap();
    assert_eq!(meta.update_shard_list(&change).unwrap().shards.len(), 1);
}

#[test]
fn test_read_through_after_external_write() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn MetadataStore> = Arc::new(RocksStore::open(dir.path()).unwrap());
    let writer = PartitionMeta::new(store.clone(), config(10));
    let reader = PartitionMeta::new(store, config(10));
    reader.init().unwrap();

    writer.update_partition(Partition::new("g", 5, 0, 10)).unwrap();
    assert!(reader.cache().get_partition_by_id("g", 5).is_none());

    // Read-through populates the cache
    assert!(reader.get_partition_by_id("g", 5).unwrap().is_some());
    assert!(reader.cache().get_partition_by_id("g", 5).is_some());

    // Routing is cache-only until a reload
    writer.update_partition(Partition::new("g", 6, 10, 20)).unwrap();
    assert!(reader.get_partition_by_code("g", 15).is_none());
    reader.reload().unwrap();
    assert_eq!(reader.get_partition_by_code("g", 15).unwrap().id, 6);
}

#[test]
fn test_partition_stats_per_graph() {
    let dir = TempDir::new().unwrap();
    let meta = open(&dir, 10);

    let stats = PartitionStats {
        id: 3,
        graph_names: vec!["g1".into(), "g2".into()],
        leader: Some(Shard::leader(9)),
        approximate_size: 4096,
        approximate_keys: 12,
        state: PartitionState::Normal,
        timestamp: 1,
    };
    meta.update_partition_stats(&stats).unwrap();

    assert_eq!(meta.get_partition_stats("g1", 3).unwrap(), Some(stats.clone()));
    assert_eq!(meta.get_partition_stats("g2", 3).unwrap(), Some(stats));
    assert_eq!(meta.get_partition_stats_by_graph("g1").unwrap().len(), 1);
    assert!(meta.get_partition_stats("g3", 3).unwrap().is_none());
}

#[test]
fn test_changes_are_published() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn MetadataStore> = Arc::new(RocksStore::open(dir.path()).unwrap());
    let watch = Arc::new(WatchSubject::default());
    let meta = PartitionMeta::new(store, config(10)).with_watch(watch.clone());
    meta.init().unwrap();
    let mut rx = watch.subscribe();

    meta.update_partition(Partition::new("g", 0, 0, 10)).unwrap();
    meta.update_partition(Partition::new("g", 0, 0, 20)).unwrap();
    meta.remove_partition("g", 0).unwrap();

    let expected = [ChangeType::Add, ChangeType::Alter, ChangeType::Del];
    for change in expected {
        assert_eq!(
            rx.try_recv().unwrap(),
            WatchEvent::Partition(PartitionEvent::new("g", 0, change))
        );
    }
}
