use std::net::{IpAddr, SocketAddr};
use std::slice;

use crate::protocol::{NodeRecord, MAX_NODE_RECORDS};

/// Ordered list of known peers.
///
/// `add` and `push` keep duplicates; membership is only ever used to decide
/// whether a sender is known. The handshake goes through `add_unique` so
/// that repeated greetings from one peer do not grow the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerDirectory {
    peers: Vec<SocketAddr>,
}

impl PeerDirectory {
    /// Creates an empty directory
    pub fn new() -> Self {
        PeerDirectory { peers: Vec::new() }
    }

    /// Parses `address` and appends it with `port`. Returns false when the
    /// address is not a valid IP literal.
    pub fn add(&mut self, address: &str, port: u16) -> bool {
        match address.parse::<IpAddr>() {
            Ok(ip) => {
                self.push(SocketAddr::new(ip, port));
                true
            }
            Err(_) => false,
        }
    }

    /// Appends a peer, duplicates included
    pub fn push(&mut self, peer: SocketAddr) {
        self.peers.push(peer);
    }

    /// Appends a peer unless it is already present. Returns whether the
    /// peer was added.
    pub fn add_unique(&mut self, peer: SocketAddr) -> bool {
        if self.contains(&peer) {
            return false;
        }
        self.push(peer);
        true
    }

    /// Returns the peer at `index`
    pub fn get(&self, index: usize) -> Option<&SocketAddr> {
        self.peers.get(index)
    }

    /// Removes and returns the peer at `index`
    pub fn remove(&mut self, index: usize) -> Option<SocketAddr> {
        if index < self.peers.len() {
            Some(self.peers.remove(index))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Exact match on address and port
    pub fn contains(&self, peer: &SocketAddr) -> bool {
        self.peers.iter().any(|known| known == peer)
    }

    pub fn iter(&self) -> slice::Iter<'_, SocketAddr> {
        self.peers.iter()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    /// The directory as HELLO_REPLY records, truncated to what one message
    /// can carry
    pub fn to_records(&self) -> Vec<NodeRecord> {
        self.peers
            .iter()
            .take(MAX_NODE_RECORDS)
            .map(NodeRecord::from_socket_addr)
            .collect()
    }
}

impl<'a> IntoIterator for &'a PeerDirectory {
    type Item = &'a SocketAddr;
    type IntoIter = slice::Iter<'a, SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
