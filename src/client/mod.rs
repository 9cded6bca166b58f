//! Client side of discovery: registration heartbeats and node queries
//! against a set of placement driver addresses.

pub mod discovery;

pub use discovery::{
    parse_addresses, DiscoveryClient, DiscoveryConnector, DiscoveryStub, GrpcConnector, GrpcStub,
    RegistrationSource,
};
