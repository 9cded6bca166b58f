//! Placement driver coordinator
//!
//! The coordinator is responsible for:
//! - Node discovery and registration (license-checked for the licensed app)
//! - Forwarding leader-affine calls from followers to the leader
//! - Reacting to leadership changes
//! - Serving the admin HTTP API

pub mod discovery;
pub mod grpc;
pub mod http;
pub mod license;
pub mod raft_node;
pub mod registry;
pub mod server;

pub use discovery::DiscoveryHandler;
pub use grpc::DiscoveryGrpcService;
pub use license::{LicenseVerifier, QuotaLicenseVerifier};
pub use raft_node::{LeaderInfo, RaftEngine, RaftNode, RaftRole, RaftStateListener};
pub use registry::NodeRegistry;
pub use server::PdServer;
