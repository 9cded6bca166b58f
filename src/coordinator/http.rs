//! Admin HTTP API
//!
//! Read-only JSON views of the placement driver: leadership, graphs,
//! partitions and registered nodes. Graph names containing `/` must be
//! percent-encoded in the path (`ns%2Fs`).

use crate::common::{timestamp_now, Config};
use crate::coordinator::discovery::DiscoveryHandler;
use crate::coordinator::raft_node::{RaftEngine, RaftNode};
use crate::meta::PartitionMeta;
use crate::proto::NodeInfo;
use crate::Error;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AdminState {
    pub config: Arc<Config>,
    pub meta: Arc<PartitionMeta>,
    pub raft: Arc<RaftNode>,
    pub discovery: Arc<DiscoveryHandler>,
}

/// Error body: `{"error": ..., "code": ...}`
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.to_http_status();
        if status.is_server_error() {
            tracing::error!("Admin request failed: {}", self.0);
        }
        (
            status,
            Json(json!({
                "error": self.0.header_message(),
                "code": self.0.error_code(),
            })),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn create_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/status", axum::routing::get(status))
        .route("/graphs", axum::routing::get(list_graphs))
        .route("/graphs/:name", axum::routing::get(get_graph))
        .route("/graphs/:name/partitions", axum::routing::get(list_partitions))
        .route(
            "/graphs/:name/partitions/code/:code",
            axum::routing::get(partition_by_code),
        )
        .route("/nodes", axum::routing::get(list_nodes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AdminState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "role": state.raft.get_role().to_string(),
        "is_leader": state.raft.is_leader(),
        "version": crate::VERSION,
        "timestamp": timestamp_now(),
    }))
}

/// Leadership and metadata summary
async fn status(State(state): State<AdminState>) -> impl IntoResponse {
    let cache = state.meta.cache();
    Json(json!({
        "cluster_id": state.config.cluster_id,
        "node_id": state.raft.node_id(),
        "role": state.raft.get_role().to_string(),
        "term": state.raft.get_term(),
        "is_leader": state.raft.is_leader(),
        "leader": state.raft.leader_grpc_address(),
        "graphs": cache.get_graphs().len(),
        "partitions": state.meta.get_all_partitions().len(),
        "shard_groups": cache.get_shard_groups().len(),
        "nodes": state.discovery.registry().len(),
        "store": {
            "max_down_time_secs": state.config.store.max_down_time_secs,
            "keep_alive_timeout_secs": state.config.store.keep_alive_timeout_secs,
        },
    }))
}

async fn list_graphs(State(state): State<AdminState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.meta.get_graphs()?))
}

async fn get_graph(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    match state.meta.get_graph(&name)? {
        Some(graph) => Ok(Json(graph).into_response()),
        None => Ok(not_found(format!("graph {} not found", name))),
    }
}

async fn list_partitions(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    Json(state.meta.get_partitions(&name))
}

async fn partition_by_code(
    State(state): State<AdminState>,
    Path((name, code)): Path<(String, u64)>,
) -> Response {
    match state.meta.get_partition_by_code(&name, code) {
        Some(partition) => Json(partition).into_response(),
        None => not_found(format!("no partition of {} contains code {}", name, code)),
    }
}

#[derive(Debug, Default, Deserialize)]
struct NodesParams {
    app_name: Option<String>,
    version: Option<String>,
}

/// Registered nodes as seen by this node's registry
async fn list_nodes(
    State(state): State<AdminState>,
    Query(params): Query<NodesParams>,
) -> impl IntoResponse {
    let nodes = state.discovery.get_nodes(&crate::proto::Query {
        app_name: params.app_name.unwrap_or_default(),
        version: params.version.unwrap_or_default(),
        labels: HashMap::new(),
    });
    let nodes: Vec<_> = nodes.info.iter().map(node_json).collect();
    Json(json!({ "nodes": nodes }))
}

fn node_json(node: &NodeInfo) -> serde_json::Value {
    json!({
        "id": node.id,
        "app_name": node.app_name,
        "version": node.version,
        "address": node.address,
        "interval": node.interval,
        "labels": node.labels,
    })
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}
