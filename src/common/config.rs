//! Configuration for graphpd components

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix, e.g. `GRAPHPD_CLUSTER_ID=7` or
/// `GRAPHPD_PARTITION__TOTAL_COUNT=24`.
pub const ENV_PREFIX: &str = "GRAPHPD";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cluster identifier echoed in response headers
    pub cluster_id: u64,

    /// Node ID (unique identifier)
    pub node_id: String,

    /// Bind address for the discovery gRPC service
    pub grpc_addr: SocketAddr,

    /// Bind address for the admin HTTP API
    pub http_addr: SocketAddr,

    /// RocksDB path for partition metadata
    pub data_path: PathBuf,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    pub raft: RaftConfig,
    pub discovery: DiscoveryConfig,
    pub partition: PartitionConfig,
    pub store: StoreConfig,
    pub license: LicenseConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_id: 0,
            node_id: "pd-1".to_string(),
            grpc_addr: default_grpc_addr(),
            http_addr: default_http_addr(),
            data_path: PathBuf::from("./pd-data"),
            log_level: default_log_level(),
            raft: RaftConfig::default(),
            discovery: DiscoveryConfig::default(),
            partition: PartitionConfig::default(),
            store: StoreConfig::default(),
            license: LicenseConfig::default(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8686))
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8620))
}

impl Config {
    /// Load configuration from an optional TOML file, then environment.
    ///
    /// Missing keys fall back to their defaults; a missing file is not an error.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.partition.total_count == 0 {
            return Err(crate::Error::InvalidConfig(
                "partition.total_count must be at least 1".into(),
            ));
        }
        if self.discovery.heartbeat_interval_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "discovery.heartbeat_interval_ms must be positive".into(),
            ));
        }
        if self.discovery.request_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "discovery.request_timeout_ms must be positive".into(),
            ));
        }
        if self.discovery.heartbeat_out_times == 0 {
            return Err(crate::Error::InvalidConfig(
                "discovery.heartbeat_out_times must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Leadership settings for the local consensus wrapper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// gRPC address other members use to reach this node when it leads
    pub grpc_address: Option<String>,

    /// Other coordinators; empty means a single-node deployment
    pub peers: Vec<String>,

    /// Leader to follow on startup when peers are configured
    pub leader: Option<String>,
}

/// Discovery / registration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Heartbeat period assumed for nodes that do not announce one
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Missed heartbeats before a registration expires
    #[serde(default = "default_heartbeat_out_times")]
    pub heartbeat_out_times: u32,

    /// Application namespace whose registrations are license-checked
    #[serde(default = "default_licensed_app_name")]
    pub licensed_app_name: String,

    /// Deadline for a discovery call relayed to the leader
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_heartbeat_interval() -> u64 {
    10_000
}
fn default_heartbeat_out_times() -> u32 {
    5
}
fn default_licensed_app_name() -> String {
    "hg".to_string()
}
fn default_request_timeout() -> u64 {
    10_000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_out_times: default_heartbeat_out_times(),
            licensed_app_name: default_licensed_app_name(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl DiscoveryConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Partition layout defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Default and maximum partition count per graph
    #[serde(default = "default_total_count")]
    pub total_count: u32,

    /// Replicas per shard group
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
}

fn default_total_count() -> u32 {
    12
}
fn default_shard_count() -> u32 {
    3
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            total_count: default_total_count(),
            shard_count: default_shard_count(),
        }
    }
}

/// Store liveness thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Seconds without heartbeat before a store is considered lost
    #[serde(default = "default_max_down_time")]
    pub max_down_time_secs: u64,

    /// Seconds before a silent store is flagged offline
    #[serde(default = "default_keep_alive_timeout")]
    pub keep_alive_timeout_secs: u64,
}

fn default_max_down_time() -> u64 {
    86_400
}
fn default_keep_alive_timeout() -> u64 {
    60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_down_time_secs: default_max_down_time(),
            keep_alive_timeout_secs: default_keep_alive_timeout(),
        }
    }
}

/// License quota applied to registrations of the licensed app
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Maximum registered nodes (0 = unlimited)
    pub max_nodes: u32,

    /// Maximum CPU cores per node (0 = unlimited)
    pub max_cores: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.partition.total_count, 12);
        assert_eq!(config.discovery.heartbeat_out_times, 5);
        assert_eq!(config.discovery.licensed_app_name, "hg");
        assert_eq!(config.discovery.request_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "cluster_id = 7\n[partition]\ntotal_count = 10\n[store]\nmax_down_time_secs = 1"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.cluster_id, 7);
        assert_eq!(config.partition.total_count, 10);
        assert_eq!(config.partition.shard_count, 3);
        assert_eq!(config.store.max_down_time_secs, 1);
        assert_eq!(config.store.keep_alive_timeout_secs, 60);
    }

    #[test]
    fn test_validate_rejects_zero_partitions() {
        let config = Config {
            partition: PartitionConfig {
                total_count: 0,
                shard_count: 3,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
