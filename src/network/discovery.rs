use std::net::SocketAddr;

use tracing::{debug, info, warn};

use crate::core::{Rejection, Result};
use crate::protocol::{Message, NodeRecord};
use crate::sync::SynchronizerState;
use super::transport::MessageSink;

impl SynchronizerState {
    /// Sends HELLO to the configured peer, if there is one
    pub fn greet_configured_peer(&self, sink: &mut impl MessageSink) -> Result<()> {
        if let Some(peer) = self.configured_peer {
            info!(%peer, "greeting configured peer");
            sink.send(&Message::Hello, peer)?;
        }
        Ok(())
    }

    /// Answers HELLO with the current directory, then remembers the sender
    pub fn on_hello(&mut self, from: SocketAddr, sink: &mut impl MessageSink) -> Result<()> {
        let reply = Message::HelloReply {
            nodes: self.directory.to_records(),
        };
        let sent = sink.send(&reply, from);
        self.remember(from);
        sent
    }

    /// Accepts the peer list sent back by the configured peer.
    ///
    /// The reply is all-or-nothing: one bad record discards every record.
    pub fn on_hello_reply(
        &mut self,
        from: SocketAddr,
        nodes: &[NodeRecord],
        sink: &mut impl MessageSink,
    ) -> Result<()> {
        if self.configured_peer != Some(from) {
            return Err(Rejection::UnexpectedHelloReply(from).into());
        }

        let contacts = self.validate_contacts(from, nodes)?;
        self.remember(from);

        debug!(%from, contacts = contacts.len(), "connecting to gossiped peers");
        for contact in contacts {
            if let Err(e) = sink.send(&Message::Connect, contact) {
                warn!(%contact, error = %e, "CONNECT not sent");
            }
        }
        Ok(())
    }

    /// Remembers the sender and acknowledges
    pub fn on_connect(&mut self, from: SocketAddr, sink: &mut impl MessageSink) -> Result<()> {
        self.remember(from);
        sink.send(&Message::AckConnect, from)
    }

    pub fn on_ack_connect(&mut self, from: SocketAddr) -> Result<()> {
        self.remember(from);
        Ok(())
    }

    fn validate_contacts(
        &self,
        from: SocketAddr,
        nodes: &[NodeRecord],
    ) -> std::result::Result<Vec<SocketAddr>, Rejection> {
        let mut contacts = Vec::with_capacity(nodes.len());
        for (index, record) in nodes.iter().enumerate() {
            let invalid = |reason| Rejection::InvalidNodeRecord { index, reason };

            let addr = record.socket_addr().ok_or_else(|| invalid("address is neither IPv4 nor IPv6"))?;
            if addr.port() == 0 {
                return Err(invalid("port is zero"));
            }
            if addr == from {
                return Err(invalid("record is the sender"));
            }
            if addr == self.local_addr {
                return Err(invalid("record is the local node"));
            }
            contacts.push(addr);
        }
        Ok(contacts)
    }

    fn remember(&mut self, peer: SocketAddr) {
        if self.directory.add_unique(peer) {
            info!(%peer, peers = self.directory.len(), "new peer");
        }
    }
}
