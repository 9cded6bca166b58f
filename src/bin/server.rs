//! Placement driver binary

use clap::{Parser, Subcommand};
use graphpd::{Config, PdServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "graphpd-server")]
#[command(about = "graphpd placement driver")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the placement driver
    Serve {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Node ID
        #[arg(long)]
        id: Option<String>,

        /// Bind address for gRPC
        #[arg(long)]
        grpc: Option<SocketAddr>,

        /// Bind address for HTTP
        #[arg(long)]
        http: Option<SocketAddr>,

        /// Metadata directory
        #[arg(long)]
        data: Option<PathBuf>,

        /// Other placement drivers (comma-separated)
        #[arg(long, value_delimiter = ',')]
        peers: Vec<String>,

        /// Leader to follow when peers are given
        #[arg(long)]
        leader: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            id,
            grpc,
            http,
            data,
            peers,
            leader,
        } => {
            // File and environment first, CLI flags win
            let mut config = Config::load(config.as_deref())?;
            if let Some(id) = id {
                config.node_id = id;
            }
            if let Some(grpc) = grpc {
                config.grpc_addr = grpc;
            }
            if let Some(http) = http {
                config.http_addr = http;
            }
            if let Some(data) = data {
                config.data_path = data;
            }
            if !peers.is_empty() {
                config.raft.peers = peers;
            }
            if leader.is_some() {
                config.raft.leader = leader;
            }

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            tracing::info!("graphpd {}", graphpd::BUILD_INFO);
            let server = PdServer::open(config)?;
            server.serve().await?;
        }
    }

    Ok(())
}
