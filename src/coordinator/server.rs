//! Placement driver server
//!
//! Wires the metadata store, partition metadata, node registry and
//! leadership state together and serves the discovery gRPC service next to
//! the admin HTTP API.

use crate::common::{Config, Result};
use crate::coordinator::discovery::DiscoveryHandler;
use crate::coordinator::grpc::{grpc_uri, DiscoveryGrpcService};
use crate::coordinator::http::{create_router, AdminState};
use crate::coordinator::license::QuotaLicenseVerifier;
use crate::coordinator::raft_node::{LeaderInfo, RaftEngine, RaftNode, RaftStateListener};
use crate::coordinator::registry::NodeRegistry;
use crate::meta::{MetadataStore, PartitionMeta, RocksStore};
use crate::watch::{PulseSubject, WatchSubject};
use std::future::{Future, IntoFuture};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;

/// Rebuilds the partition cache whenever this node takes over leadership.
///
/// The reload scans the store, so inside a runtime it runs on the blocking
/// pool instead of the thread that delivered the leadership change.
struct ReloadOnLeader {
    meta: Arc<PartitionMeta>,
    raft: Weak<RaftNode>,
}

impl RaftStateListener for ReloadOnLeader {
    fn on_raft_leader_changed(&self) {
        let Some(raft) = self.raft.upgrade() else {
            return;
        };
        if !raft.is_leader() {
            return;
        }
        let meta = self.meta.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || reload_meta(&meta));
            }
            Err(_) => reload_meta(&meta),
        }
    }
}

fn reload_meta(meta: &PartitionMeta) {
    match meta.reload() {
        Ok(()) => tracing::info!("Partition metadata reloaded after leader change"),
        Err(e) => tracing::error!("Failed to reload partition metadata: {}", e),
    }
}

pub struct PdServer {
    config: Config,
    meta: Arc<PartitionMeta>,
    raft: Arc<RaftNode>,
    discovery: Arc<DiscoveryHandler>,
    grpc: Arc<DiscoveryGrpcService>,
    watch: Arc<WatchSubject>,
    pulse: Arc<PulseSubject>,
}

impl PdServer {
    /// Open the metadata store at `config.data_path` and build every component.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn MetadataStore> = Arc::new(RocksStore::open(&config.data_path)?);
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<dyn MetadataStore>) -> Result<Self> {
        let watch = Arc::new(WatchSubject::default());
        let pulse = Arc::new(PulseSubject::default());

        let meta = Arc::new(
            PartitionMeta::new(store, config.partition.clone()).with_watch(watch.clone()),
        );
        meta.init()?;

        let advertised = config
            .raft
            .grpc_address
            .clone()
            .unwrap_or_else(|| config.grpc_addr.to_string());
        let raft = Arc::new(RaftNode::new(config.node_id.clone(), grpc_uri(&advertised)));
        raft.add_state_listener(Arc::new(ReloadOnLeader {
            meta: meta.clone(),
            raft: Arc::downgrade(&raft),
        }));

        let registry = Arc::new(NodeRegistry::new(config.discovery.heartbeat_interval()));
        let discovery = Arc::new(DiscoveryHandler::new(
            config.cluster_id,
            config.discovery.clone(),
            registry,
            Arc::new(QuotaLicenseVerifier::new(&config.license)),
        ));
        let grpc = DiscoveryGrpcService::new(
            discovery.clone(),
            raft.clone(),
            vec![watch.clone(), pulse.clone()],
        );

        Ok(Self {
            config,
            meta,
            raft,
            discovery,
            grpc,
            watch,
            pulse,
        })
    }

    pub fn meta(&self) -> &Arc<PartitionMeta> {
        &self.meta
    }

    pub fn raft(&self) -> &Arc<RaftNode> {
        &self.raft
    }

    pub fn discovery(&self) -> &Arc<DiscoveryHandler> {
        &self.discovery
    }

    pub fn watch(&self) -> &Arc<WatchSubject> {
        &self.watch
    }

    pub fn pulse(&self) -> &Arc<PulseSubject> {
        &self.pulse
    }

    /// Take the initial role from configuration.
    fn bootstrap_leadership(&self) {
        if self.config.raft.peers.is_empty() {
            self.raft.become_leader(1);
            return;
        }
        match &self.config.raft.leader {
            Some(leader) => self.raft.step_down(
                1,
                Some(LeaderInfo {
                    node_id: String::new(),
                    grpc_address: grpc_uri(leader),
                }),
            ),
            None => tracing::warn!(
                "{} peers configured and no leader known yet",
                self.config.raft.peers.len()
            ),
        }
    }

    /// Bind the configured addresses and serve until ctrl-c.
    pub async fn serve(self) -> Result<()> {
        let grpc_listener = TcpListener::bind(self.config.grpc_addr).await?;
        let http_listener = TcpListener::bind(self.config.http_addr).await?;

        self.serve_with_shutdown(grpc_listener, http_listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
            }
            tracing::info!("Shutdown signal received");
        })
        .await
    }

    /// Serve on already bound listeners until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(
        self,
        grpc_listener: TcpListener,
        http_listener: TcpListener,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting placement driver: {}", self.config.node_id);
        tracing::info!("  gRPC API: {}", grpc_listener.local_addr()?);
        tracing::info!("  HTTP API: {}", http_listener.local_addr()?);
        tracing::info!("  Data path: {}", self.config.data_path.display());

        self.bootstrap_leadership();

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown.await;
            let _ = stop_tx.send(true);
        });

        let prune = {
            let registry = self.discovery.registry().clone();
            let period = self.config.discovery.heartbeat_interval();
            let mut stop = stop_rx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let removed = registry.prune_expired();
                            if removed > 0 {
                                tracing::info!("Pruned {} expired registrations", removed);
                            }
                        }
                        _ = stop.changed() => break,
                    }
                }
            })
        };

        let router = create_router(AdminState {
            config: Arc::new(self.config.clone()),
            meta: self.meta.clone(),
            raft: self.raft.clone(),
            discovery: self.discovery.clone(),
        });
        let http_server = axum::serve(http_listener, router)
            .with_graceful_shutdown(wait_for_stop(stop_rx.clone()))
            .into_future();

        let grpc_server = tonic::transport::Server::builder()
            .tcp_keepalive(Some(Duration::from_secs(
                self.config.store.keep_alive_timeout_secs,
            )))
            .add_service(self.grpc.clone().into_server())
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(grpc_listener),
                wait_for_stop(stop_rx),
            );

        tracing::info!("Placement driver ready ({})", self.raft.get_role());

        let (http_res, grpc_res) = tokio::join!(http_server, grpc_server);
        prune.abort();

        if let Err(e) = http_res {
            tracing::error!("HTTP server error: {}", e);
            return Err(e.into());
        }
        if let Err(e) = grpc_res {
            tracing::error!("gRPC server error: {}", e);
            return Err(e.into());
        }

        tracing::info!("Placement driver stopped");
        Ok(())
    }
}

async fn wait_for_stop(mut stop: watch::Receiver<bool>) {
    while !*stop.borrow() {
        if stop.changed().await.is_err() {
            break;
        }
    }
}
