use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tokio_util::udp::UdpFramed;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peer_time_sync::{Error, Message, MessageCodec, Result, SyncLevel};

/// Asks nodes for their synchronized time and prints the replies
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Node addresses as `<ip> <port>` pairs
    #[clap(required = true, num_args = 2..)]
    peers: Vec<String>,

    /// How long to collect replies, in milliseconds
    #[clap(long, default_value_t = 10)]
    wait_ms: u64,
}

fn parse_peers(args: &[String]) -> Result<Vec<SocketAddr>> {
    if args.len() % 2 != 0 {
        return Err(Error::config("expected <ip> <port> pairs"));
    }
    args.chunks(2)
        .map(|pair| {
            let ip: IpAddr = pair[0]
                .parse()
                .map_err(|_| Error::config(format!("Invalid IP: {}", pair[0])))?;
            let port: u16 = pair[1]
                .parse()
                .map_err(|_| Error::config(format!("Invalid port: {}", pair[1])))?;
            Ok(SocketAddr::new(ip, port))
        })
        .collect()
}

/// One output line per TIME reply, stamped with the local receive time
fn format_reply<Tz>(from: SocketAddr, sync_level: SyncLevel, timestamp: u64, received: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "TIME from {} | sync level={} | timestamp={} ms | received {}",
        from,
        sync_level,
        timestamp,
        received.format("%H:%M:%S%.3f")
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let peers = parse_peers(&cli.peers)?;
    let local: SocketAddr = if peers.iter().all(SocketAddr::is_ipv6) {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    let mut framed = UdpFramed::new(socket, MessageCodec::new());

    for peer in &peers {
        framed.send((Message::GetTime, *peer)).await?;
    }

    let deadline = Instant::now() + Duration::from_millis(cli.wait_ms);
    let mut answered = HashSet::new();
    while answered.len() < peers.len() {
        let next = match timeout_at(deadline, framed.next()).await {
            Ok(Some(next)) => next,
            Ok(None) | Err(_) => break,
        };
        match next {
            Ok((Message::Time { sync_level, timestamp }, from)) => {
                if !answered.insert(from) {
                    continue;
                }
                println!("{}", format_reply(from, sync_level, timestamp, &Local::now()));
            }
            Ok((other, from)) => warn!(%from, kind = %other.kind(), "unexpected reply"),
            Err(e) => warn!(error = %e, "Failed to parse message"),
        }
    }

    for peer in peers.iter().filter(|peer| !answered.contains(*peer)) {
        println!("no reply from {}", peer);
    }

    Ok(())
}
