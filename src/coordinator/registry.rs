//! Node registry
//!
//! Liveness bookkeeping for discovered nodes. A registration stays visible
//! for `interval × heartbeat_out_times` after its last renewal.

use crate::common::timestamp_now_millis;
use crate::proto::{NodeInfo, NodeInfos, Query};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    app_name: String,
    version: String,
    address: String,
}

#[derive(Debug, Clone)]
struct Registration {
    info: NodeInfo,
    expires_at_ms: u64,
}

pub struct NodeRegistry {
    nodes: RwLock<HashMap<NodeKey, Registration>>,
    /// Used when a node announces no interval of its own
    default_interval: Duration,
}

impl NodeRegistry {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            default_interval,
        }
    }

    /// Register or renew a node.
    pub fn register(&self, info: &NodeInfo, out_times: u32) {
        let interval_ms = if info.interval > 0 {
            info.interval as u64
        } else {
            self.default_interval.as_millis() as u64
        };
        let ttl_ms = interval_ms.saturating_mul(out_times.max(1) as u64);
        let key = NodeKey {
            app_name: info.app_name.clone(),
            version: info.version.clone(),
            address: info.address.clone(),
        };

        tracing::debug!(
            "Register node {} ({}:{}) ttl {}ms",
            info.address,
            info.app_name,
            info.version,
            ttl_ms
        );
        self.nodes.write().insert(
            key,
            Registration {
                info: info.clone(),
                expires_at_ms: timestamp_now_millis().saturating_add(ttl_ms),
            },
        );
    }

    /// Live nodes matching the query. Empty query fields match everything;
    /// every query label must be present with the same value.
    pub fn get_nodes(&self, query: &Query) -> NodeInfos {
        let now = timestamp_now_millis();
        let mut info: Vec<NodeInfo> = self
            .nodes
            .read()
            .values()
            .filter(|r| r.expires_at_ms > now)
            .filter(|r| query.app_name.is_empty() || r.info.app_name == query.app_name)
            .filter(|r| query.version.is_empty() || r.info.version == query.version)
            .filter(|r| {
                query
                    .labels
                    .iter()
                    .all(|(k, v)| r.info.labels.get(k) == Some(v))
            })
            .map(|r| r.info.clone())
            .collect();
        info.sort_by(|a, b| a.address.cmp(&b.address));

        NodeInfos { header: None, info }
    }

    /// Drop expired registrations, returning how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = timestamp_now_millis();
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|_, r| r.expires_at_ms > now);
        before - nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}
