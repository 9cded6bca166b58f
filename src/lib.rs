//! # graphpd
//!
//! Placement driver core for a partitioned graph store:
//! - Partition, graph and shard group metadata persisted in RocksDB
//!   with an in-memory routing cache
//! - Node discovery with license-checked registration
//! - Leader-affine gRPC calls, forwarded by followers to the leader
//! - A failover discovery client with periodic heartbeats
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │          Placement driver (leader)        │
//! │  DiscoveryService ── NodeRegistry         │
//! │  PartitionMeta ── PartitionCache          │
//! │        └── RocksStore                     │
//! └───────────▲──────────────────▲───────────┘
//!             │ forward          │ Register / GetNodes
//! ┌───────────┴──────┐   ┌───────┴──────────┐
//! │ PD follower      │   │ DiscoveryClient  │
//! │ (memoized client)│   │ (failover + tick)│
//! └──────────────────┘   └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a placement driver
//! ```bash
//! graphpd-server serve --config pd.toml --grpc 0.0.0.0:8686 --http 0.0.0.0:8620
//! ```
//!
//! ### Use the CLI
//! ```bash
//! # Heartbeat as a store node
//! graphpd heartbeat --pd 10.0.0.1:8686,10.0.0.2:8686 --app store --address 10.0.0.9:8500
//!
//! # List registered nodes
//! graphpd nodes --pd 10.0.0.1:8686 --app store
//! ```

pub mod client;
pub mod common;
pub mod coordinator;
pub mod meta;
pub mod watch;

// Re-export commonly used types
pub use client::DiscoveryClient;
pub use common::{Config, Error, Result};
pub use coordinator::PdServer;
pub use meta::{PartitionCache, PartitionMeta};

// Generated protobuf code
pub mod proto {
    tonic::include_proto!("graphpd.discovery");
}

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
