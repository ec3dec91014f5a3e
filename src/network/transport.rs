use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::trace;

use crate::core::{Error, Result};
use crate::protocol::{codec, Message};

/// Datagram transport consumed by the event loop.
///
/// Sending and receiving never suspend; `readable` is the only place the
/// loop waits.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Sends one datagram without waiting
    fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<usize>;

    /// Receives one datagram if one is queued
    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Resolves once a datagram may be available
    async fn readable(&self) -> io::Result<()>;

    /// Address the transport is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Destination for protocol messages.
///
/// Every `Transport` is a sink; tests substitute a recorder.
pub trait MessageSink {
    fn send(&mut self, message: &Message, dest: SocketAddr) -> Result<()>;
}

impl<T: Transport> MessageSink for T {
    fn send(&mut self, message: &Message, dest: SocketAddr) -> Result<()> {
        let payload = codec::encode(message)?;
        let sent = self
            .send_to(&payload, dest)
            .map_err(|e| Error::transport(format!("send {} to {}: {}", message.kind(), dest, e)))?;
        trace!(kind = %message.kind(), %dest, bytes = sent, "sent");
        Ok(())
    }
}

/// Non-blocking UDP socket
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Creates a non-blocking UDP socket bound to `addr`.
    ///
    /// Resolves once the reactor reports the socket writable, so the first
    /// `send_to` does not fail with `WouldBlock`.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| Error::transport(format!("Failed to create socket: {}", e)))?;
        socket.set_nonblocking(true)?;
        socket
            .bind(&addr.into())
            .map_err(|e| Error::transport(format!("Failed to bind {}: {}", addr, e)))?;

        let socket = UdpSocket::from_std(socket.into())?;
        socket.writable().await?;
        Ok(UdpTransport { socket })
    }

    /// Returns the underlying socket
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }
}

impl Transport for UdpTransport {
    fn send_to(&self, payload: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.socket.try_send_to(payload, dest)
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.try_recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn readable(&self) -> io::Result<()> {
        self.socket.readable().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
