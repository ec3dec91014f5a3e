//! Network module
//!
//! This module holds the peer directory, the datagram transport, peer
//! address resolution and the discovery handshake.
//!
//! A node greets its configured peer with HELLO. The peer answers with every
//! address it knows, and the newcomer introduces itself to each of them with
//! CONNECT. Everyone who greets or is greeted ends up in the directory.

mod directory;
mod discovery;
mod resolve;
mod transport;

pub use self::directory::PeerDirectory;
pub use self::resolve::resolve_peer;
pub use self::transport::{MessageSink, Transport, UdpTransport};
