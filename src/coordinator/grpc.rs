//! Discovery gRPC service
//!
//! Both calls are leader-affine. The leader answers from its own registry;
//! any other node relays the request to the leader and hands back whatever
//! the leader said, status errors included.

use crate::coordinator::discovery::DiscoveryHandler;
use crate::coordinator::raft_node::{RaftEngine, RaftStateListener};
use crate::proto::discovery_service_client::DiscoveryServiceClient;
use crate::proto::discovery_service_server::{DiscoveryService, DiscoveryServiceServer};
use crate::proto::{NodeInfo, NodeInfos, Query, RegisterInfo};
use crate::watch::ErrorNotifier;
use crate::Error;
use parking_lot::Mutex;
use std::sync::Arc;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};

pub const LOSE_LEADER: &str = "lose leader";

/// Turn an advertised `host:port` into a URI tonic can dial.
pub fn grpc_uri(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

pub struct DiscoveryGrpcService {
    handler: Arc<DiscoveryHandler>,
    raft: Arc<dyn RaftEngine>,
    /// Client to the current leader, built on first forward
    leader_client: Mutex<Option<DiscoveryServiceClient<Channel>>>,
    notifiers: Vec<Arc<dyn ErrorNotifier>>,
}

impl DiscoveryGrpcService {
    /// Build the service and subscribe it to leadership changes.
    pub fn new(
        handler: Arc<DiscoveryHandler>,
        raft: Arc<dyn RaftEngine>,
        notifiers: Vec<Arc<dyn ErrorNotifier>>,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            handler,
            raft: raft.clone(),
            leader_client: Mutex::new(None),
            notifiers,
        });
        raft.add_state_listener(service.clone());
        service
    }

    pub fn into_server(self: Arc<Self>) -> DiscoveryServiceServer<Self> {
        DiscoveryServiceServer::from_arc(self)
    }

    pub fn has_leader_client(&self) -> bool {
        self.leader_client.lock().is_some()
    }

    fn leader_client(&self) -> Result<DiscoveryServiceClient<Channel>, Status> {
        let mut memo = self.leader_client.lock();
        if let Some(client) = memo.as_ref() {
            return Ok(client.clone());
        }

        let address = self
            .raft
            .leader_grpc_address()
            .ok_or_else(|| Error::LeaderUnknown.to_grpc_status())?;
        let endpoint = Endpoint::from_shared(grpc_uri(&address))
            .map_err(|e| Error::Transport(e).to_grpc_status())?
            .timeout(self.handler.config().request_timeout());

        tracing::info!("Connecting to leader at {}", address);
        let client = DiscoveryServiceClient::new(endpoint.connect_lazy());
        *memo = Some(client.clone());
        Ok(client)
    }
}

impl RaftStateListener for DiscoveryGrpcService {
    fn on_raft_leader_changed(&self) {
        self.leader_client.lock().take();

        if !self.raft.is_leader() {
            tracing::warn!("Lost leadership, notifying subscribers");
            for notifier in &self.notifiers {
                notifier.notify_error(LOSE_LEADER);
            }
        }
    }
}

#[tonic::async_trait]
impl DiscoveryService for DiscoveryGrpcService {
    async fn register(&self, req: Request<NodeInfo>) -> Result<Response<RegisterInfo>, Status> {
        if !self.raft.is_leader() {
            let mut client = self.leader_client()?;
            tracing::debug!("Forwarding register to leader");
            return client.register(Request::new(req.into_inner())).await;
        }

        Ok(Response::new(self.handler.register(&req.into_inner())))
    }

    async fn get_nodes(&self, req: Request<Query>) -> Result<Response<NodeInfos>, Status> {
        if !self.raft.is_leader() {
            let mut client = self.leader_client()?;
            tracing::debug!("Forwarding get_nodes to leader");
            return client.get_nodes(Request::new(req.into_inner())).await;
        }

        Ok(Response::new(self.handler.get_nodes(&req.into_inner())))
    }
}
