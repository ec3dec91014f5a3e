use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use clap::Parser;
use futures::SinkExt;
use tokio::net::UdpSocket;
use tokio_util::udp::UdpFramed;

use peer_time_sync::{Message, MessageCodec, Result, SyncLevel};

/// Promotes a node to leader (level 0) or demotes it (level 255)
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Node address
    ip: IpAddr,

    /// Node port
    port: u16,

    /// 0 to promote, 255 to demote
    level: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dest = SocketAddr::new(cli.ip, cli.port);

    let local: SocketAddr = match dest {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    let mut framed = UdpFramed::new(socket, MessageCodec::new());

    let message = Message::Leader {
        sync_level: SyncLevel(cli.level),
    };
    framed.send((message, dest)).await?;
    println!("LEADER {} sent to {}", cli.level, dest);

    Ok(())
}
