use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::core::{Error, NodeConfig, Rejection, Result, SyncLevel};
use crate::network::{resolve_peer, Transport, UdpTransport};
use crate::protocol::{codec, Message};
use crate::sync::SynchronizerState;
use crate::util::hex_prefix;

/// Pause after a failed receive before trying again
const RECV_BACKOFF: Duration = Duration::from_millis(10);

/// Longest readiness wait when no timer is armed
const IDLE_WAIT: Duration = Duration::from_secs(1);

/// Point-in-time view of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub local_addr: SocketAddr,
    pub is_leader: bool,
    pub sync_level: SyncLevel,
    pub offset_ms: i64,
    pub source: Option<SocketAddr>,
    pub pending: Option<SocketAddr>,
    pub peers: usize,
}

/// A time synchronization node.
///
/// Each turn of the loop runs the timers, then handles at most one datagram.
/// When nothing is queued it waits for the socket to become readable, bounded
/// by the next timer deadline.
pub struct Node<T: Transport = UdpTransport> {
    state: SynchronizerState,
    transport: T,
    recv_buf: Vec<u8>,
}

impl Node<UdpTransport> {
    /// Binds a UDP socket and resolves the configured peer
    pub async fn bind(config: &NodeConfig) -> Result<Self> {
        config.validate()?;
        let transport = UdpTransport::bind(config.bind_addr).await?;
        let local = transport.local_addr()?;

        let configured_peer = match (&config.peer_host, config.peer_port) {
            (Some(host), Some(port)) => Some(resolve_peer(host, port, Some(local)).await?),
            _ => None,
        };

        Node::new(transport, configured_peer, config)
    }
}

impl<T: Transport> Node<T> {
    /// Wraps an already bound transport
    pub fn new(transport: T, configured_peer: Option<SocketAddr>, config: &NodeConfig) -> Result<Self> {
        let local_addr = transport.local_addr()?;
        if configured_peer == Some(local_addr) {
            return Err(Error::config(format!("{} is this node's own address", local_addr)));
        }
        info!(%local_addr, peer = ?configured_peer, "node bound");

        Ok(Node {
            state: SynchronizerState::new(local_addr, configured_peer, config.timing, Instant::now()),
            transport,
            recv_buf: vec![0u8; config.recv_buffer_size],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.state.local_addr()
    }

    pub fn state(&self) -> &SynchronizerState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            local_addr: self.state.local_addr(),
            is_leader: self.state.is_leader(),
            sync_level: self.state.sync_level(),
            offset_ms: self.state.clock().offset_ms(),
            source: self.state.source().map(|source| source.peer),
            pending: self.state.pending().map(|pending| pending.peer),
            peers: self.state.directory().len(),
        }
    }

    /// Greets the configured peer
    pub fn start(&mut self) {
        if let Err(e) = self.state.greet_configured_peer(&mut self.transport) {
            warn!(error = %e, "HELLO not sent");
        }
    }

    /// Greets the configured peer, then runs the loop forever
    pub async fn run(&mut self) {
        self.start();
        loop {
            self.run_once().await;
        }
    }

    /// One turn of the loop
    pub async fn run_once(&mut self) {
        let level = self.state.sync_level();
        self.state.housekeeping(Instant::now(), &mut self.transport);

        match self.transport.try_recv_from(&mut self.recv_buf) {
            Ok(Some((len, from))) => self.handle_datagram(len, from),
            Ok(None) => {
                let deadline = self
                    .state
                    .next_deadline()
                    .unwrap_or_else(|| Instant::now() + IDLE_WAIT);
                if let Ok(Err(e)) = timeout_at(deadline, self.transport.readable()).await {
                    warn!(error = %e, "socket not readable");
                    sleep(RECV_BACKOFF).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "receive failed");
                sleep(RECV_BACKOFF).await;
            }
        }

        if self.state.sync_level() != level {
            debug!(status = ?self.status(), "sync level changed");
        }
    }

    fn handle_datagram(&mut self, len: usize, from: SocketAddr) {
        let data = &self.recv_buf[..len];
        let message = match codec::decode(data) {
            Ok(message) => message,
            Err(e) => {
                warn!(%from, len, bytes = %hex_prefix(data), error = %e, "malformed datagram");
                return;
            }
        };

        let kind = message.kind();
        debug!(%from, %kind, "received");
        match self.dispatch(message, from) {
            Ok(()) => {}
            Err(Error::Rejected(rejection)) => {
                debug!(%from, %kind, reason = %rejection, "ignored");
            }
            Err(e) => warn!(%from, %kind, error = %e, "handling failed"),
        }
    }

    fn dispatch(&mut self, message: Message, from: SocketAddr) -> Result<()> {
        if from == self.state.local_addr() {
            return Err(Rejection::FromSelf.into());
        }

        let sink = &mut self.transport;
        match message {
            Message::Hello => self.state.on_hello(from, sink),
            Message::HelloReply { nodes } => self.state.on_hello_reply(from, &nodes, sink),
            Message::Connect => self.state.on_connect(from, sink),
            Message::AckConnect => self.state.on_ack_connect(from),
            Message::SyncStart {
                sync_level,
                timestamp,
            } => self.state.on_sync_start(from, sync_level, timestamp, sink),
            Message::DelayRequest => self.state.on_delay_request(from, sink),
            Message::DelayResponse {
                sync_level,
                timestamp,
            } => self.state.on_delay_response(from, sync_level, timestamp),
            Message::Leader { sync_level } => self.state.on_leader(sync_level),
            Message::GetTime => self.state.on_get_time(from, sink),
            Message::Time { .. } => Err(Rejection::UnexpectedKind("TIME").into()),
        }
    }
}
