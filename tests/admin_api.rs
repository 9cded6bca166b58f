//! Admin HTTP API of a running placement driver

use graphpd::meta::{MemStore, Partition};
use graphpd::proto::discovery_service_client::DiscoveryServiceClient;
use graphpd::proto::NodeInfo;
use graphpd::{Config, PdServer};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct Running {
    http: String,
    grpc: String,
    stop: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<graphpd::Result<()>>,
}

async fn start() -> Running {
    let config = Config {
        cluster_id: 42,
        node_id: "pd-admin".into(),
        ..Default::default()
    };
    let server = PdServer::with_store(config, Arc::new(MemStore::new())).unwrap();
    server
        .meta()
        .update_partition(Partition::new("g", 0, 0, 100))
        .unwrap();
    server
        .meta()
        .update_partition(Partition::new("g", 1, 100, 200))
        .unwrap();
    server.meta().get_and_create_graph("ns/s", 5).unwrap();

    let grpc_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let grpc = format!("http://{}", grpc_listener.local_addr().unwrap());
    let http = format!("http://{}", http_listener.local_addr().unwrap());

    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve_with_shutdown(grpc_listener, http_listener, async {
        let _ = stopped.await;
    }));

    Running {
        http,
        grpc,
        stop,
        handle,
    }
}

async fn get_json(client: &Client, url: String) -> (StatusCode, Value) {
    let resp = client.get(url).send().await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn test_admin_endpoints() {
    let pd = start().await;
    let client = Client::new();

    let (status, health) = get_json(&client, format!("{}/health", pd.http)).await;
    assert!(status.is_success());
    assert_eq!(health["role"], "leader");
    assert_eq!(health["is_leader"], true);

    let (_, status_json) = get_json(&client, format!("{}/status", pd.http)).await;
    assert_eq!(status_json["cluster_id"], 42);
    assert_eq!(status_json["node_id"], "pd-admin");
    assert_eq!(status_json["graphs"], 2);
    assert_eq!(status_json["partitions"], 2);

    let (_, graphs) = get_json(&client, format!("{}/graphs", pd.http)).await;
    assert_eq!(graphs.as_array().unwrap().len(), 2);

    let (status, graph) = get_json(&client, format!("{}/graphs/ns%2Fs", pd.http)).await;
    assert!(status.is_success());
    assert_eq!(graph["partition_count"], 1);

    let (status, _) = get_json(&client, format!("{}/graphs/missing", pd.http)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, partitions) = get_json(&client, format!("{}/graphs/g/partitions", pd.http)).await;
    assert_eq!(partitions.as_array().unwrap().len(), 2);

    let (_, partition) =
        get_json(&client, format!("{}/graphs/g/partitions/code/150", pd.http)).await;
    assert_eq!(partition["id"], 1);

    let (status, _) =
        get_json(&client, format!("{}/graphs/g/partitions/code/500", pd.http)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    drop(client);
    pd.stop.send(()).unwrap();
    pd.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_registered_nodes_are_listed() {
    let pd = start().await;

    let mut grpc = DiscoveryServiceClient::connect(pd.grpc.clone()).await.unwrap();
    let resp = grpc
        .register(NodeInfo {
            id: "0".into(),
            app_name: "store".into(),
            version: "1.0".into(),
            address: "10.0.0.1:8500".into(),
            interval: 10_000,
            ..Default::default()
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(resp.header.unwrap().cluster_id, 42);

    let client = Client::new();
    let (_, nodes) = get_json(&client, format!("{}/nodes?app_name=store", pd.http)).await;
    let nodes = nodes["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["address"], "10.0.0.1:8500");

    let (_, none) = get_json(&client, format!("{}/nodes?app_name=hg", pd.http)).await;
    assert!(none["nodes"].as_array().unwrap().is_empty());

    drop(grpc);
    drop(client);
    pd.stop.send(()).unwrap();
    pd.handle.await.unwrap().unwrap();
}
