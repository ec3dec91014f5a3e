use std::io;
use std::net::SocketAddr;
use thiserror::Error;

use super::types::SyncLevel;

/// Custom error types for the time synchronization protocol
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resolution error: {0}")]
    Resolve(String),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] serde_json::Error),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new resolution error
    pub fn resolve(msg: impl Into<String>) -> Self {
        Error::Resolve(msg.into())
    }

    /// Returns the protocol rejection, if this error is one
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Error::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

/// Malformed or truncated datagrams
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer too short: {len} bytes, header needs {min}")]
    TooShort { len: usize, min: usize },

    #[error("buffer ends after {present} of {declared} node records")]
    NodeCountMismatch { declared: u16, present: u16 },

    #[error("node record {index} declares {declared} address bytes but only {remaining} remain")]
    TruncatedNode {
        index: u16,
        declared: usize,
        remaining: usize,
    },

    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("missing synchronization level")]
    MissingSyncLevel,

    #[error("unknown message kind {0}")]
    UnknownKind(u8),
}

/// Messages that cannot be put on the wire
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("too many nodes to encode: {0} (limit 65535)")]
    TooManyNodes(usize),

    #[error("node address too long: {0} bytes (limit 255)")]
    AddressTooLong(usize),

    #[error("encoded message is {0} bytes, exceeds the datagram limit")]
    TooLarge(usize),
}

/// Protocol-level refusals. None of these is fatal; the event loop logs them
/// and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("message from own address ignored")]
    FromSelf,

    #[error("sender {0} is not a known peer")]
    UnknownSender(SocketAddr),

    #[error("HELLO_REPLY from {0}, which is not the configured peer")]
    UnexpectedHelloReply(SocketAddr),

    #[error("HELLO_REPLY record {index} is invalid: {reason}")]
    InvalidNodeRecord { index: usize, reason: &'static str },

    #[error("node is leader")]
    IsLeader,

    #[error("already synchronizing with {0}")]
    AlreadySynchronizing(SocketAddr),

    #[error("sender level {0} cannot serve time")]
    PeerUnsynchronized(SyncLevel),

    #[error("sender level {offered} is no improvement on local level {local}")]
    NotBetter { offered: SyncLevel, local: SyncLevel },

    #[error("no synchronization in progress")]
    NoPendingSync,

    #[error("expected DELAY_RESPONSE from {expected}, got one from {actual}")]
    WrongSender {
        expected: SocketAddr,
        actual: SocketAddr,
    },

    #[error("peer level changed from {before} to {after} during synchronization")]
    SyncLevelChanged { before: SyncLevel, after: SyncLevel },

    #[error("round trip exceeded {limit_ms} ms")]
    Timeout { limit_ms: u128 },

    #[error("negative delay: T1 {t1} is after T4 {t4}")]
    NegativeDelay { t1: u64, t4: u64 },

    #[error("invalid LEADER message with level {0}")]
    InvalidLeader(SyncLevel),

    #[error("unexpected message kind {0}")]
    UnexpectedKind(&'static str),
}
