//! Registration handling on the leader
//!
//! Transport-agnostic: the gRPC layer decides whether a call is served here
//! or forwarded to the leader. Every failure, including a panic inside the
//! handler, comes back as an error header instead of escaping the call.

use crate::common::{DiscoveryConfig, Result};
use crate::coordinator::license::LicenseVerifier;
use crate::coordinator::registry::NodeRegistry;
use crate::proto::{self, ErrorType, NodeInfo, NodeInfos, Query, RegisterInfo, ResponseHeader};
use crate::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Label carrying a node's CPU core count
pub const CORES_LABEL: &str = "cores";

/// Ids a caller sends when it wants one assigned
fn is_placeholder_id(id: &str) -> bool {
    id.is_empty() || id == "0"
}

pub fn ok_header(cluster_id: u64) -> ResponseHeader {
    ResponseHeader {
        cluster_id,
        error: None,
    }
}

pub fn error_header(cluster_id: u64, err: &Error) -> ResponseHeader {
    ResponseHeader {
        cluster_id,
        error: Some(proto::Error {
            r#type: err.error_code(),
            message: err.header_message(),
        }),
    }
}

pub struct DiscoveryHandler {
    cluster_id: u64,
    config: DiscoveryConfig,
    registry: Arc<NodeRegistry>,
    license: Arc<dyn LicenseVerifier>,
    next_id: AtomicU64,
}

impl DiscoveryHandler {
    pub fn new(
        cluster_id: u64,
        config: DiscoveryConfig,
        registry: Arc<NodeRegistry>,
        license: Arc<dyn LicenseVerifier>,
    ) -> Self {
        Self {
            cluster_id,
            config,
            registry,
            license,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn register(&self, request: &NodeInfo) -> RegisterInfo {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.try_register(request)))
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "register panicked".to_string());
                Err(Error::Other(message))
            });

        match outcome {
            Ok(id) => RegisterInfo {
                header: Some(ok_header(self.cluster_id)),
                node_info: Some(NodeInfo {
                    id,
                    ..Default::default()
                }),
            },
            Err(e) => {
                tracing::debug!("Register {} failed: {}", request.address, e);
                RegisterInfo {
                    header: Some(error_header(self.cluster_id, &e)),
                    node_info: None,
                }
            }
        }
    }

    fn try_register(&self, request: &NodeInfo) -> Result<String> {
        if request.app_name == self.config.licensed_app_name {
            self.verify_license(request)?;
        }

        self.registry
            .register(request, self.config.heartbeat_out_times);

        if is_placeholder_id(&request.id) {
            Ok((self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string())
        } else {
            Ok(request.id.clone())
        }
    }

    fn verify_license(&self, request: &NodeInfo) -> Result<()> {
        let nodes = self.registry.get_nodes(&Query {
            app_name: request.app_name.clone(),
            version: request.version.clone(),
            labels: Default::default(),
        });
        let known = nodes.info.iter().any(|n| n.address == request.address);
        let node_count = if known {
            nodes.info.len()
        } else {
            nodes.info.len() + 1
        };

        let cores = match request.labels.get(CORES_LABEL) {
            Some(v) if !v.trim().is_empty() => v.trim().parse::<u32>().map_err(|_| {
                Error::runtime(
                    ErrorType::InvalidCoreCount,
                    format!("invalid core count: {}", v),
                )
            })?,
            _ => return Err(Error::business_code(-1, "core count can not be null")),
        };

        self.license.verify(cores, node_count)
    }

    pub fn get_nodes(&self, query: &Query) -> NodeInfos {
        let mut nodes = self.registry.get_nodes(query);
        nodes.header = Some(ok_header(self.cluster_id));
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::license::QuotaLicenseVerifier;
    use crate::common::LicenseConfig;
    use std::collections::HashMap;
    use std::time::Duration;

    struct PanickingVerifier;

    impl LicenseVerifier for PanickingVerifier {
        fn verify(&self, _cores: u32, _node_count: usize) -> Result<()> {
            panic!("license backend exploded");
        }
    }

    fn handler(license: Arc<dyn LicenseVerifier>) -> DiscoveryHandler {
        DiscoveryHandler::new(
            9,
            DiscoveryConfig::default(),
            Arc::new(NodeRegistry::new(Duration::from_secs(10))),
            license,
        )
    }

    fn node(app: &str, id: &str, address: &str, cores: Option<&str>) -> NodeInfo {
        let mut labels = HashMap::new();
        if let Some(cores) = cores {
            labels.insert(CORES_LABEL.to_string(), cores.to_string());
        }
        NodeInfo {
            id: id.into(),
            app_name: app.into(),
            version: "1.0".into(),
            address: address.into(),
            interval: 10_000,
            labels,
        }
    }

    fn error_of(info: &RegisterInfo) -> Option<&proto::Error> {
        info.header.as_ref().and_then(|h| h.error.as_ref())
    }

    #[test]
    fn test_placeholder_id_gets_assigned() {
        let h = handler(Arc::new(QuotaLicenseVerifier::unlimited()));
        let first = h.register(&node("store", "0", "10.0.0.1:1", None));
        let second = h.register(&node("store", "0", "10.0.0.2:1", None));

        assert!(error_of(&first).is_none());
        assert_eq!(first.node_info.unwrap().id, "1");
        assert_eq!(second.node_info.unwrap().id, "2");
    }

    #[test]
    fn test_caller_id_is_honored() {
        let h = handler(Arc::new(QuotaLicenseVerifier::unlimited()));
        let info = h.register(&node("store", "node-42", "10.0.0.1:1", None));
        assert_eq!(info.node_info.unwrap().id, "node-42");
        assert_eq!(info.header.unwrap().cluster_id, 9);
    }

    #[test]
    fn test_counters_are_per_instance() {
        let a = handler(Arc::new(QuotaLicenseVerifier::unlimited()));
        let b = handler(Arc::new(QuotaLicenseVerifier::unlimited()));
        a.register(&node("store", "0", "10.0.0.1:1", None));
        let info = b.register(&node("store", "0", "10.0.0.1:1", None));
        assert_eq!(info.node_info.unwrap().id, "1");
    }

    #[test]
    fn test_licensed_app_needs_cores() {
        let h = handler(Arc::new(QuotaLicenseVerifier::unlimited()));
        let info = h.register(&node("hg", "0", "10.0.0.1:1", None));

        let err = error_of(&info).unwrap();
        assert_eq!(err.r#type, -1);
        assert_eq!(err.message, "core count can not be null");
        assert!(h.registry().is_empty());
    }

    #[test]
    fn test_unparsable_cores() {
        let h = handler(Arc::new(QuotaLicenseVerifier::unlimited()));
        let info = h.register(&node("hg", "0", "10.0.0.1:1", Some("many")));
        assert_eq!(
            error_of(&info).unwrap().r#type,
            ErrorType::InvalidCoreCount as i32
        );
    }

    #[test]
    fn test_node_quota() {
        let h = handler(Arc::new(QuotaLicenseVerifier::new(&LicenseConfig {
            max_nodes: 1,
            max_cores: 0,
        })));
        assert!(error_of(&h.register(&node("hg", "0", "10.0.0.1:1", Some("8")))).is_none());
        // Renewal from the same address does not count twice
        assert!(error_of(&h.register(&node("hg", "0", "10.0.0.1:1", Some("8")))).is_none());

        let rejected = h.register(&node("hg", "0", "10.0.0.2:1", Some("8")));
        assert_eq!(
            error_of(&rejected).unwrap().r#type,
            ErrorType::LicenseVerifyError as i32
        );
    }

    #[test]
    fn test_panic_becomes_unknown_header() {
        let h = handler(Arc::new(PanickingVerifier));
        let info = h.register(&node("hg", "0", "10.0.0.1:1", Some("8")));

        let err = error_of(&info).unwrap();
        assert_eq!(err.r#type, ErrorType::Unknown as i32);
        assert!(err.message.contains("exploded"));
    }

    #[test]
    fn test_get_nodes_sets_header() {
        let h = handler(Arc::new(QuotaLicenseVerifier::unlimited()));
        h.register(&node("store", "0", "10.0.0.1:1", None));

        let nodes = h.get_nodes(&Query::default());
        assert_eq!(nodes.info.len(), 1);
        assert_eq!(nodes.header.unwrap().cluster_id, 9);
    }
}
