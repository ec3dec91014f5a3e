use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peer_time_sync::{Node, NodeConfig, Result};

/// Peer time synchronization node
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Local address to bind to [default: 0.0.0.0]
    #[clap(short = 'b', long)]
    bind_address: Option<IpAddr>,

    /// Local port to bind to, 0 picks a free one [default: 0]
    #[clap(short = 'p', long)]
    port: Option<u16>,

    /// Address or host name of a peer to greet at startup
    #[clap(short = 'a', long)]
    peer_address: Option<String>,

    /// Port of the peer to greet at startup
    #[clap(short = 'r', long)]
    peer_port: Option<u16>,

    /// JSON configuration file; flags override its values
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging (can be specified multiple times)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                NodeConfig::load(path)?
            }
            None => NodeConfig::default(),
        };

        if self.bind_address.is_some() || self.port.is_some() {
            let ip = self
                .bind_address
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
            let port = self.port.unwrap_or(config.bind_addr.port());
            config.bind_addr = SocketAddr::new(ip, port);
        }
        if let Some(host) = self.peer_address {
            config.peer_host = Some(host);
        }
        if let Some(port) = self.peer_port {
            config.peer_port = Some(port);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into()),
        1 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.into_config()?;
    let mut node = Node::bind(&config).await?;
    info!(local_addr = %node.local_addr(), version = peer_time_sync::VERSION, "node started");

    tokio::select! {
        _ = node.run() => {}
        signal = tokio::signal::ctrl_c() => signal?,
    }
    info!(status = ?node.status(), "shutting down");

    Ok(())
}
