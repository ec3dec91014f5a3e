use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::{SyncLevel, Timing};
use crate::network::PeerDirectory;
use crate::time::LocalClock;

/// The peer this node currently takes its time from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSource {
    pub peer: SocketAddr,
    /// Level the peer advertised when the probe completed
    pub sync_level: SyncLevel,
    pub last_heard: Instant,
}

/// A delay probe waiting for its DELAY_RESPONSE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSync {
    pub peer: SocketAddr,
    /// Level the peer advertised in SYNC_START
    pub sync_level: SyncLevel,
    /// Peer clock when it sent SYNC_START
    pub t1: u64,
    /// Local raw clock when SYNC_START arrived
    pub t2: i64,
    /// Local raw clock after DELAY_REQUEST went out
    pub t3: i64,
    /// When DELAY_REQUEST went out
    pub requested_at: Instant,
}

impl PendingSync {
    /// True once strictly more than `timeout` has passed since the request
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.requested_at) > timeout
    }
}

/// All protocol state of one node, owned by its event loop
#[derive(Debug)]
pub struct SynchronizerState {
    pub(crate) local_addr: SocketAddr,
    pub(crate) configured_peer: Option<SocketAddr>,
    pub(crate) timing: Timing,
    pub(crate) directory: PeerDirectory,
    pub(crate) clock: LocalClock,
    pub(crate) source: Option<SyncSource>,
    pub(crate) pending: Option<PendingSync>,
    pub(crate) last_sync_start: Instant,
    /// SYNC_START broadcasts are held back until this instant
    pub(crate) quiet_until: Option<Instant>,
}

impl SynchronizerState {
    /// Creates the state of a freshly started node
    pub fn new(
        local_addr: SocketAddr,
        configured_peer: Option<SocketAddr>,
        timing: Timing,
        now: Instant,
    ) -> Self {
        SynchronizerState {
            local_addr,
            configured_peer,
            timing,
            directory: PeerDirectory::new(),
            clock: LocalClock::new(now),
            source: None,
            pending: None,
            last_sync_start: now,
            quiet_until: None,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn configured_peer(&self) -> Option<SocketAddr> {
        self.configured_peer
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn clock(&self) -> &LocalClock {
        &self.clock
    }

    pub fn source(&self) -> Option<&SyncSource> {
        self.source.as_ref()
    }

    pub fn pending(&self) -> Option<&PendingSync> {
        self.pending.as_ref()
    }

    pub fn is_leader(&self) -> bool {
        self.clock.is_leader()
    }

    pub fn sync_level(&self) -> SyncLevel {
        self.clock.sync_level()
    }
}
