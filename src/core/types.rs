use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Number of hops a node's time estimate is from the leader.
///
/// Lower is better: 0 is the leader itself and 255 means the node has no
/// usable time at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyncLevel(pub u8);

impl SyncLevel {
    /// The authoritative leader
    pub const LEADER: SyncLevel = SyncLevel(0);

    /// Not synchronized to anything
    pub const UNSYNCHRONIZED: SyncLevel = SyncLevel(255);

    /// Levels at or above this one are never accepted as a time source
    pub const SERVE_LIMIT: SyncLevel = SyncLevel(254);

    /// Returns the raw level
    pub fn level(&self) -> u8 {
        self.0
    }

    pub fn is_leader(&self) -> bool {
        *self == Self::LEADER
    }

    pub fn is_unsynchronized(&self) -> bool {
        *self == Self::UNSYNCHRONIZED
    }

    /// Whether a node at this level may hand out time to others
    pub fn can_serve(&self) -> bool {
        *self < Self::SERVE_LIMIT
    }

    /// The level a node reaches by synchronizing to a peer at this level
    pub fn successor(&self) -> SyncLevel {
        SyncLevel(self.0.saturating_add(1))
    }
}

impl Default for SyncLevel {
    fn default() -> Self {
        SyncLevel::UNSYNCHRONIZED
    }
}

impl fmt::Display for SyncLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Interval between SYNC_START broadcasts
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub sync_interval: Duration,
    /// How long a DELAY_RESPONSE may take to arrive
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub pending_timeout: Duration,
    /// How long a source may stay silent before it is dropped
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub source_timeout: Duration,
    /// Quiet period after becoming leader
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub leader_grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            sync_interval: Duration::from_secs(5),
            pending_timeout: Duration::from_secs(5),
            source_timeout: Duration::from_secs(20),
            leader_grace: Duration::from_secs(2),
        }
    }
}

/// Configuration for a synchronization node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Local address to bind to
    pub bind_addr: SocketAddr,
    /// Host name or IP literal of the peer to greet at startup
    pub peer_host: Option<String>,
    /// Port of the peer to greet at startup
    pub peer_port: Option<u16>,
    /// Protocol timers
    #[serde(flatten)]
    pub timing: Timing,
    /// Size of the receive buffer in bytes
    pub recv_buffer_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], super::DEFAULT_PORT)),
            peer_host: None,
            peer_port: None,
            timing: Timing::default(),
            recv_buffer_size: super::RECV_BUFFER_SIZE,
        }
    }
}

impl NodeConfig {
    /// Loads a configuration from a JSON file. Missing fields take their
    /// default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: NodeConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for inconsistencies
    pub fn validate(&self) -> Result<()> {
        match (&self.peer_host, self.peer_port) {
            (Some(_), None) => return Err(Error::config("peer address given without a peer port")),
            (None, Some(_)) => return Err(Error::config("peer port given without a peer address")),
            (Some(host), Some(port)) => {
                if host.is_empty() {
                    return Err(Error::config("peer address is empty"));
                }
                if port == 0 {
                    return Err(Error::config("peer port must be non-zero"));
                }
            }
            (None, None) => {}
        }

        let timers = [
            ("sync_interval", self.timing.sync_interval),
            ("pending_timeout", self.timing.pending_timeout),
            ("source_timeout", self.timing.source_timeout),
        ];
        for (name, value) in timers {
            if value.is_zero() {
                return Err(Error::config(format!("{} must be non-zero", name)));
            }
        }

        if self.recv_buffer_size < super::MAX_DATAGRAM_SIZE {
            return Err(Error::config(format!(
                "receive buffer of {} bytes cannot hold a {} byte datagram",
                self.recv_buffer_size,
                super::MAX_DATAGRAM_SIZE
            )));
        }

        Ok(())
    }

    /// Whether a peer to greet at startup is configured
    pub fn has_peer(&self) -> bool {
        self.peer_host.is_some() && self.peer_port.is_some()
    }
}
