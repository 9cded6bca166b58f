//! CLI for discovery operations

use clap::{Parser, Subcommand};
use graphpd::common::parse_duration;
use graphpd::proto::{NodeInfo, Query};
use graphpd::DiscoveryClient;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "graphpd")]
#[command(about = "graphpd discovery CLI")]
#[command(version)]
struct Cli {
    /// Placement driver addresses (comma-separated)
    #[arg(long, default_value = "127.0.0.1:8686")]
    pd: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register periodically until interrupted
    Heartbeat {
        /// Application name
        #[arg(long)]
        app: String,

        /// Application version
        #[arg(long, default_value = "")]
        version: String,

        /// Address this node is reachable at
        #[arg(long)]
        address: String,

        /// Node id; 0 asks for one to be assigned
        #[arg(long, default_value = "0")]
        id: String,

        /// Heartbeat interval (e.g. 500ms, 10s)
        #[arg(long, default_value = "10s", value_parser = parse_interval)]
        interval: Duration,

        /// Labels as key=value (repeatable)
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// List registered nodes
    Nodes {
        /// Application name (all if omitted)
        #[arg(long, default_value = "")]
        app: String,

        /// Application version (all if omitted)
        #[arg(long, default_value = "")]
        version: String,

        /// Required labels as key=value (repeatable)
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected key=value, got {}", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Heartbeat {
            app,
            version,
            address,
            id,
            interval,
            labels,
        } => {
            let client = DiscoveryClient::new(&cli.pd, interval)?;
            let info = NodeInfo {
                id,
                app_name: app,
                version,
                address,
                interval: interval.as_millis() as i64,
                labels: labels.into_iter().collect::<HashMap<_, _>>(),
            };

            client.schedule_task(
                move || info.clone(),
                |resp| match resp.header.and_then(|h| h.error) {
                    Some(err) => eprintln!("✗ Register rejected ({}): {}", err.r#type, err.message),
                    None => println!(
                        "✓ Registered as {}",
                        resp.node_info.map(|n| n.id).unwrap_or_default()
                    ),
                },
            );

            tokio::signal::ctrl_c().await?;
            client.close().await;
        }

        Commands::Nodes {
            app,
            version,
            labels,
        } => {
            let client = DiscoveryClient::new(&cli.pd, Duration::from_secs(10))?;
            let nodes = client
                .get_node_infos(Query {
                    app_name: app,
                    version,
                    labels: labels.into_iter().collect(),
                })
                .await?;
            client.close().await;

            if nodes.info.is_empty() {
                println!("No nodes registered");
            }
            for node in nodes.info {
                let mut labels: Vec<_> = node
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                labels.sort();
                println!(
                    "{}  {}  {}  {}",
                    node.address,
                    node.app_name,
                    node.version,
                    labels.join(",")
                );
            }
        }
    }

    Ok(())
}
