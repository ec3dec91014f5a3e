use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::core::{DecodeError, SyncLevel};

/// Wire identifiers for each message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Hello = 1,
    HelloReply = 2,
    Connect = 3,
    AckConnect = 4,
    SyncStart = 11,
    DelayRequest = 12,
    DelayResponse = 13,
    Leader = 21,
    GetTime = 31,
    Time = 32,
}

impl MessageKind {
    /// Protocol name of the kind, as used in logs
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Hello => "HELLO",
            MessageKind::HelloReply => "HELLO_REPLY",
            MessageKind::Connect => "CONNECT",
            MessageKind::AckConnect => "ACK_CONNECT",
            MessageKind::SyncStart => "SYNC_START",
            MessageKind::DelayRequest => "DELAY_REQUEST",
            MessageKind::DelayResponse => "DELAY_RESPONSE",
            MessageKind::Leader => "LEADER",
            MessageKind::GetTime => "GET_TIME",
            MessageKind::Time => "TIME",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let kind = match value {
            1 => MessageKind::Hello,
            2 => MessageKind::HelloReply,
            3 => MessageKind::Connect,
            4 => MessageKind::AckConnect,
            11 => MessageKind::SyncStart,
            12 => MessageKind::DelayRequest,
            13 => MessageKind::DelayResponse,
            21 => MessageKind::Leader,
            31 => MessageKind::GetTime,
            32 => MessageKind::Time,
            other => return Err(DecodeError::UnknownKind(other)),
        };
        Ok(kind)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A peer address as gossiped in HELLO_REPLY
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRecord {
    /// Raw address bytes in network order
    pub address: Vec<u8>,
    /// UDP port
    pub port: u16,
}

impl NodeRecord {
    pub fn new(address: Vec<u8>, port: u16) -> Self {
        NodeRecord { address, port }
    }

    /// Builds a record from a socket address
    pub fn from_socket_addr(addr: &SocketAddr) -> Self {
        let address = match addr.ip() {
            IpAddr::V4(ip) => ip.octets().to_vec(),
            IpAddr::V6(ip) => ip.octets().to_vec(),
        };
        NodeRecord {
            address,
            port: addr.port(),
        }
    }

    /// Interprets the record as a socket address. Only 4-byte (IPv4) and
    /// 16-byte (IPv6) addresses are meaningful.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        let ip = match self.address.len() {
            4 => {
                let octets: [u8; 4] = self.address.as_slice().try_into().ok()?;
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            16 => {
                let octets: [u8; 16] = self.address.as_slice().try_into().ok()?;
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            _ => return None,
        };
        Some(SocketAddr::new(ip, self.port))
    }

    /// Bytes this record occupies on the wire
    pub fn encoded_len(&self) -> usize {
        1 + self.address.len() + 2
    }
}

/// Protocol messages exchanged between nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Greeting sent to the configured peer at startup
    Hello,

    /// Answer to Hello, listing every peer the responder knows
    HelloReply { nodes: Vec<NodeRecord> },

    /// Introduction to a peer learned from a HelloReply
    Connect,

    /// Answer to Connect
    AckConnect,

    /// Offer to serve time, stamped with the sender's clock
    SyncStart { sync_level: SyncLevel, timestamp: u64 },

    /// Second leg of the delay probe
    DelayRequest,

    /// Third leg of the delay probe, stamped with the responder's clock
    DelayResponse { sync_level: SyncLevel, timestamp: u64 },

    /// Leader promotion (level 0) or resignation (level 255)
    Leader { sync_level: SyncLevel },

    /// Request for the node's current time
    GetTime,

    /// Answer to GetTime
    Time { sync_level: SyncLevel, timestamp: u64 },
}

impl Message {
    /// Returns the wire kind of the message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Hello => MessageKind::Hello,
            Message::HelloReply { .. } => MessageKind::HelloReply,
            Message::Connect => MessageKind::Connect,
            Message::AckConnect => MessageKind::AckConnect,
            Message::SyncStart { .. } => MessageKind::SyncStart,
            Message::DelayRequest => MessageKind::DelayRequest,
            Message::DelayResponse { .. } => MessageKind::DelayResponse,
            Message::Leader { .. } => MessageKind::Leader,
            Message::GetTime => MessageKind::GetTime,
            Message::Time { .. } => MessageKind::Time,
        }
    }

    /// Node records carried by the message
    pub fn nodes(&self) -> &[NodeRecord] {
        match self {
            Message::HelloReply { nodes } => nodes,
            _ => &[],
        }
    }

    /// Timestamp field as it appears on the wire
    pub fn timestamp(&self) -> u64 {
        match self {
            Message::SyncStart { timestamp, .. }
            | Message::DelayResponse { timestamp, .. }
            | Message::Time { timestamp, .. } => *timestamp,
            _ => 0,
        }
    }

    /// Synchronization level field as it appears on the wire
    pub fn sync_level(&self) -> SyncLevel {
        match self {
            Message::SyncStart { sync_level, .. }
            | Message::DelayResponse { sync_level, .. }
            | Message::Leader { sync_level }
            | Message::Time { sync_level, .. } => *sync_level,
            _ => SyncLevel(0),
        }
    }

    /// Rebuilds a message from decoded wire fields. Fields the kind does not
    /// use are dropped.
    pub(crate) fn from_parts(
        kind: MessageKind,
        nodes: Vec<NodeRecord>,
        timestamp: u64,
        sync_level: SyncLevel,
    ) -> Self {
        match kind {
            MessageKind::Hello => Message::Hello,
            MessageKind::HelloReply => Message::HelloReply { nodes },
            MessageKind::Connect => Message::Connect,
            MessageKind::AckConnect => Message::AckConnect,
            MessageKind::SyncStart => Message::SyncStart { sync_level, timestamp },
            MessageKind::DelayRequest => Message::DelayRequest,
            MessageKind::DelayResponse => Message::DelayResponse { sync_level, timestamp },
            MessageKind::Leader => Message::Leader { sync_level },
            MessageKind::GetTime => Message::GetTime,
            MessageKind::Time => Message::Time { sync_level, timestamp },
        }
    }
}
