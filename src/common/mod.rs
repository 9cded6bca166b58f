//! Common utilities and types shared across graphpd

pub mod config;
pub mod error;
pub mod keys;
pub mod utils;

pub use config::{
    Config, DiscoveryConfig, LicenseConfig, PartitionConfig, RaftConfig, StoreConfig,
};
pub use error::{Error, Result};
pub use utils::{encode_key, parse_duration, timestamp_now, timestamp_now_millis};
