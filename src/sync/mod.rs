//! Synchronization module
//!
//! This module holds the per-node protocol state and the handlers that move
//! it: the delay probe against a time source, source and probe expiry, the
//! periodic SYNC_START broadcast, leader commands and time queries.

mod engine;
mod leader;
mod query;
mod state;

pub use self::state::{PendingSync, SyncSource, SynchronizerState};

/// Offset of the local clock against a source, in milliseconds.
///
/// `t1` is the source's timestamp in SYNC_START, `t2` the local raw clock
/// when it arrived, `t3` the local raw clock when DELAY_REQUEST left and
/// `t4` the source's timestamp in DELAY_RESPONSE.
pub fn compute_offset(t1: u64, t2: i64, t3: i64, t4: u64) -> i64 {
    let t1 = i128::from(t1);
    let t4 = i128::from(t4);
    let sum = (i128::from(t2) - t1) + (i128::from(t3) - t4);
    (sum / 2).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}
