//! Persisted key layout
//!
//! Every key is a `/`-delimited byte string. Graph names are percent-encoded
//! before they become a segment, so a prefix scan over `PARTITION/<graph>/`
//! yields exactly that graph's partitions even when another graph's name
//! extends this one with a `/` (e.g. `ns` and `ns/s`).

use crate::common::utils::encode_key;

const DELIMITER: char = '/';

const GRAPH: &str = "GRAPH";
const PARTITION: &str = "PARTITION";
const PARTITION_STATUS: &str = "PARTITION_STATUS";
const SHARD_GROUP: &str = "SHARDGROUP";

pub fn delimiter() -> char {
    DELIMITER
}

fn join(segments: &[&str], trailing: bool) -> Vec<u8> {
    let mut key = segments.join("/");
    if trailing {
        key.push(DELIMITER);
    }
    key.into_bytes()
}

pub fn graph_key(graph_name: &str) -> Vec<u8> {
    join(&[GRAPH, &encode_key(graph_name)], false)
}

pub fn graph_prefix() -> Vec<u8> {
    join(&[GRAPH], true)
}

pub fn partition_key(graph_name: &str, id: u32) -> Vec<u8> {
    join(&[PARTITION, &encode_key(graph_name), &id.to_string()], false)
}

pub fn partition_prefix(graph_name: &str) -> Vec<u8> {
    join(&[PARTITION, &encode_key(graph_name)], true)
}

pub fn partition_status_key(graph_name: &str, id: u32) -> Vec<u8> {
    join(
        &[PARTITION_STATUS, &encode_key(graph_name), &id.to_string()],
        false,
    )
}

pub fn partition_status_prefix(graph_name: &str) -> Vec<u8> {
    join(&[PARTITION_STATUS, &encode_key(graph_name)], true)
}

pub fn shard_group_key(id: u32) -> Vec<u8> {
    join(&[SHARD_GROUP, &id.to_string()], false)
}

pub fn shard_group_prefix() -> Vec<u8> {
    join(&[SHARD_GROUP], true)
}
