//! Protocol implementation module
//!
//! This module defines the protocol messages and their wire encoding.

pub mod codec;
pub mod message;

pub use self::codec::{decode, encode, MessageCodec};
pub use self::message::{Message, MessageKind, NodeRecord};

// Constants
/// Maximum message size in bytes
pub const MAX_MESSAGE_SIZE: usize = crate::core::MAX_DATAGRAM_SIZE;

/// Fixed part of every message: kind, node count, timestamp and sync level
pub const HEADER_LEN: usize = 1 + 2 + 8 + 1;

/// Most records a HELLO_REPLY can carry
pub const MAX_NODE_RECORDS: usize = u16::MAX as usize;
