//! Core types for the peer time synchronization protocol
//!
//! This module contains the error taxonomy, the synchronization level type
//! and node configuration shared by every other module.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{DecodeError, EncodeError, Error, Rejection, Result};
pub use self::types::{NodeConfig, SyncLevel, Timing};

/// Default port for the node
pub const DEFAULT_PORT: u16 = 0;

/// Maximum UDP payload in bytes
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Receive buffer size
pub const RECV_BUFFER_SIZE: usize = 65536;
