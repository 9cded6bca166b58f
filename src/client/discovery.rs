//! Discovery client with failover
//!
//! Holds a list of placement driver addresses and one active connection.
//! Calls go through [`DiscoveryClient::try_with_times`]: a failed call marks
//! the connection stale and moves on to the next address, until the retry
//! budget (`max(6, addresses)`) runs out.
//!
//! Calls hold the connection read lock; rebuilding it takes the write lock,
//! so a reconnect waits for in-flight calls to finish. Only the first call
//! that fails on a connection marks it stale and rotates the address; the
//! first caller to take the write lock rebuilds it and the others reuse it.

use crate::common::Result;
use crate::coordinator::grpc::grpc_uri;
use crate::proto::discovery_service_client::DiscoveryServiceClient;
use crate::proto::{NodeInfo, NodeInfos, Query, RegisterInfo};
use crate::Error;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};

/// Lower bound of the retry budget
pub const MIN_RETRY_TIMES: usize = 6;

const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const CLOSE_POLLS: usize = 30;
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One connection to a discovery service.
#[tonic::async_trait]
pub trait DiscoveryStub: Send + Sync {
    async fn register(&self, info: NodeInfo) -> Result<RegisterInfo>;

    async fn get_nodes(&self, query: Query) -> Result<NodeInfos>;

    /// Stop accepting new calls; in-flight calls may finish.
    fn shutdown(&self);

    /// True once shut down and drained
    fn is_terminated(&self) -> bool;

    /// Abandon whatever is still running.
    fn shutdown_now(&self);
}

/// Opens stubs to an address.
#[tonic::async_trait]
pub trait DiscoveryConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn DiscoveryStub>>;
}

/// Supplies the `NodeInfo` announced on every heartbeat.
pub trait RegistrationSource: Send + Sync {
    fn node_info(&self) -> NodeInfo;
}

impl<F> RegistrationSource for F
where
    F: Fn() -> NodeInfo + Send + Sync,
{
    fn node_info(&self) -> NodeInfo {
        self()
    }
}

/// Stub over a tonic channel
///
/// Calls clone the inner client, so dropping it on shutdown lets calls
/// already running finish on their clone while new ones are refused.
pub struct GrpcStub {
    client: Mutex<Option<DiscoveryServiceClient<Channel>>>,
}

impl GrpcStub {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: Mutex::new(Some(DiscoveryServiceClient::new(channel))),
        }
    }

    fn client(&self) -> Result<DiscoveryServiceClient<Channel>> {
        self.client
            .lock()
            .clone()
            .ok_or_else(|| Error::ConnectionFailed("channel is shut down".into()))
    }
}

#[tonic::async_trait]
impl DiscoveryStub for GrpcStub {
    async fn register(&self, info: NodeInfo) -> Result<RegisterInfo> {
        let mut client = self.client()?;
        Ok(client.register(info).await?.into_inner())
    }

    async fn get_nodes(&self, query: Query) -> Result<NodeInfos> {
        let mut client = self.client()?;
        Ok(client.get_nodes(query).await?.into_inner())
    }

    fn shutdown(&self) {
        self.client.lock().take();
    }

    fn is_terminated(&self) -> bool {
        self.client.lock().is_none()
    }

    fn shutdown_now(&self) {
        self.client.lock().take();
    }
}

/// Connects eagerly so an unreachable address fails fast.
///
/// Every call carries `request_timeout`, so a peer that accepts the
/// connection and never answers fails the call instead of stalling it.
pub struct GrpcConnector {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

impl GrpcConnector {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }
}

#[tonic::async_trait]
impl DiscoveryConnector for GrpcConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn DiscoveryStub>> {
        let channel = Endpoint::from_shared(grpc_uri(address))?
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .connect()
            .await?;
        Ok(Arc::new(GrpcStub::new(channel)))
    }
}

/// Split a comma-separated address list, skipping blanks.
pub fn parse_addresses(addresses: &str) -> Vec<String> {
    addresses
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

struct Connection {
    address: String,
    stub: Arc<dyn DiscoveryStub>,
}

struct Inner {
    addresses: Vec<String>,
    max_times: usize,
    current: AtomicUsize,
    connection: RwLock<Option<Connection>>,
    stale: AtomicBool,
    connector: Arc<dyn DiscoveryConnector>,
}

struct Heartbeat {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct DiscoveryClient {
    inner: Arc<Inner>,
    period: Duration,
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl DiscoveryClient {
    /// Client dialing over gRPC.
    pub fn new(addresses: &str, period: Duration) -> Result<Self> {
        Self::with_connector(addresses, period, Arc::new(GrpcConnector::default()))
    }

    pub fn with_connector(
        addresses: &str,
        period: Duration,
        connector: Arc<dyn DiscoveryConnector>,
    ) -> Result<Self> {
        let addresses = parse_addresses(addresses);
        if addresses.is_empty() {
            return Err(Error::NoAddress);
        }
        if period.is_zero() {
            return Err(Error::InvalidConfig("heartbeat period must be positive".into()));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                max_times: MIN_RETRY_TIMES.max(addresses.len()),
                addresses,
                current: AtomicUsize::new(0),
                connection: RwLock::new(None),
                stale: AtomicBool::new(true),
                connector,
            }),
            period,
            heartbeat: Mutex::new(None),
        })
    }

    pub fn addresses(&self) -> &[String] {
        &self.inner.addresses
    }

    pub fn current_index(&self) -> usize {
        self.inner.current.load(Ordering::SeqCst)
    }

    pub fn current_address(&self) -> &str {
        &self.inner.addresses[self.current_index()]
    }

    pub fn max_times(&self) -> usize {
        self.inner.max_times
    }

    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::SeqCst)
    }

    /// Run `op` against the active stub, failing over between addresses.
    pub async fn try_with_times<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn DiscoveryStub>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.inner.try_with_times(op).await
    }

    /// Tear down the active connection and connect to `address`.
    pub async fn reset_connection(&self, address: &str) -> Result<()> {
        self.inner.reset_connection(address).await
    }

    pub async fn get_node_infos(&self, query: Query) -> Result<NodeInfos> {
        self.try_with_times(|stub| {
            let query = query.clone();
            async move { stub.get_nodes(query).await }
        })
        .await
    }

    pub async fn register(&self, info: NodeInfo) -> Result<RegisterInfo> {
        self.inner.register(info).await
    }

    /// Register every `period`, handing each response to `consumer`.
    ///
    /// Replaces a heartbeat that is already scheduled.
    pub fn schedule_task<S, C>(&self, source: S, consumer: C)
    where
        S: RegistrationSource + 'static,
        C: Fn(RegisterInfo) + Send + Sync + 'static,
    {
        self.cancel_task();

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let inner = self.inner.clone();
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                if *stop_rx.borrow() {
                    break;
                }

                match inner.register(source.node_info()).await {
                    Ok(info) => consumer(info),
                    Err(e) => tracing::error!("Heartbeat failed: {}", e),
                }
            }
            tracing::debug!("Heartbeat task stopped");
        });

        *self.heartbeat.lock() = Some(Heartbeat {
            stop: stop_tx,
            handle,
        });
    }

    /// Stop future heartbeats. A tick already running completes.
    pub fn cancel_task(&self) {
        if let Some(heartbeat) = self.heartbeat.lock().take() {
            let _ = heartbeat.stop.send(true);
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.heartbeat
            .lock()
            .as_ref()
            .is_some_and(|h| !h.handle.is_finished())
    }

    /// Stop the heartbeat and close the connection.
    pub async fn close(&self) {
        let heartbeat = self.heartbeat.lock().take();
        if let Some(heartbeat) = heartbeat {
            let _ = heartbeat.stop.send(true);
            let abort = heartbeat.handle.abort_handle();
            if tokio::time::timeout(TASK_STOP_TIMEOUT, heartbeat.handle)
                .await
                .is_err()
            {
                tracing::warn!("Heartbeat task did not stop in time, aborting");
                abort.abort();
            }
        }

        let mut connection = self.inner.connection.write().await;
        if let Some(old) = connection.take() {
            close_stub(&old).await;
        }
        self.inner.stale.store(true, Ordering::SeqCst);
    }
}

impl Inner {
    async fn register(&self, info: NodeInfo) -> Result<RegisterInfo> {
        self.try_with_times(|stub| {
            let info = info.clone();
            async move { stub.register(info).await }
        })
        .await
    }

    async fn try_with_times<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn DiscoveryStub>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last = String::new();

        for attempt in 1..=self.max_times {
            let outcome = match self.ensure_connected().await {
                Ok(()) => {
                    let connection = self.connection.read().await;
                    match connection.as_ref() {
                        Some(conn) => match op(conn.stub.clone()).await {
                            Ok(value) => Ok(value),
                            Err(e) => {
                                // Still under the read lock: `conn` is the live connection
                                self.mark_stale();
                                Err((conn.address.clone(), e))
                            }
                        },
                        None => Err((String::new(), Error::ConnectionFailed("not connected".into()))),
                    }
                }
                Err(e) => Err((self.current_address().to_string(), e)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err((address, e)) => {
                    tracing::warn!(
                        "Discovery call to {} failed (attempt {}/{}): {}",
                        address,
                        attempt,
                        self.max_times,
                        e
                    );
                    last = e.to_string();
                }
            }
        }

        tracing::error!(
            "Discovery call failed after {} attempts: {}",
            self.max_times,
            last
        );
        Err(Error::RetriesExhausted {
            attempts: self.max_times,
            last,
        })
    }

    fn current_address(&self) -> &str {
        &self.addresses[self.current.load(Ordering::SeqCst) % self.addresses.len()]
    }

    fn advance(&self) -> usize {
        let n = self.addresses.len();
        let next = (self.current.load(Ordering::SeqCst) + 1) % n;
        self.current.store(next, Ordering::SeqCst);
        next
    }

    /// Mark the live connection stale. Callers hold the read lock, so the
    /// connection cannot be swapped underneath; only the caller that flips
    /// the flag rotates to the next address.
    fn mark_stale(&self) {
        if self
            .stale
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.advance();
        }
    }

    /// Rebuild a stale connection, moving through the candidates until one
    /// connects or every address has been tried once.
    async fn ensure_connected(&self) -> Result<()> {
        if !self.stale.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut connection = self.connection.write().await;
        // Rebuilt by a caller that held the lock before us
        if !self.stale.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(old) = connection.take() {
            close_stub(&old).await;
        }

        let mut last = Error::NoAddress;
        for _ in 0..self.addresses.len() {
            let address = self.current_address().to_string();
            match self.connect(&mut connection, &address).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("Failed to connect to {}: {}", address, e);
                    last = e;
                    self.advance();
                }
            }
        }
        Err(last)
    }

    async fn reset_connection(&self, address: &str) -> Result<()> {
        let mut connection = self.connection.write().await;
        if let Some(old) = connection.take() {
            close_stub(&old).await;
        }
        self.stale.store(true, Ordering::SeqCst);
        self.connect(&mut connection, address).await
    }

    async fn connect(&self, connection: &mut Option<Connection>, address: &str) -> Result<()> {
        let stub = self.connector.connect(address).await?;
        *connection = Some(Connection {
            address: address.to_string(),
            stub,
        });
        self.stale.store(false, Ordering::SeqCst);
        tracing::info!("Connected to discovery service at {}", address);
        Ok(())
    }
}

/// Callers hold the write lock, so no call runs on a `GrpcStub` here; the
/// poll covers stubs that keep work of their own past `shutdown`.
async fn close_stub(connection: &Connection) {
    connection.stub.shutdown();
    for _ in 0..CLOSE_POLLS {
        if connection.stub.is_terminated() {
            return;
        }
        tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
    }
    tracing::warn!(
        "Connection to {} did not drain in time, forcing close",
        connection.address
    );
    connection.stub.shutdown_now();
}
