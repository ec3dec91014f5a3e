//! Peer time synchronization
//!
//! Nodes on a UDP network agree on a common millisecond clock. One node is
//! promoted to leader (level 0); every other node measures its offset against
//! a peer closer to the leader and ends up one level below it. Nodes find
//! each other through a HELLO / CONNECT handshake seeded by a single
//! configured peer.
//!
//! ```no_run
//! use peer_time_sync::{Node, NodeConfig};
//!
//! # async fn run() -> peer_time_sync::Result<()> {
//! let mut node = Node::bind(&NodeConfig::default()).await?;
//! node.run().await;
//! # Ok(())
//! # }
//! ```
pub mod core;
pub mod network;
pub mod node;
pub mod protocol;
pub mod sync;
pub mod time;
pub mod util;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use crate::core::{Error, NodeConfig, Result, SyncLevel, Timing};
pub use crate::node::{Node, NodeStatus};
pub use crate::protocol::{Message, MessageCodec};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
