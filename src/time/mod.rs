//! Local clock state
//!
//! Every node measures time as milliseconds elapsed since it started. Once
//! synchronized, it subtracts the offset measured against its source, so
//! that the timestamps it hands out follow the leader's clock:
//!
//! ```text
//! elapsed = now - start_time - offset
//! ```
//!
//! A positive offset means the local clock runs ahead of the source.

use tokio::time::Instant;

use crate::core::SyncLevel;

/// Leader flag, synchronization level and offset of this node
#[derive(Debug, Clone)]
pub struct LocalClock {
    start_time: Instant,
    offset_ms: i64,
    is_leader: bool,
    sync_level: SyncLevel,
}

impl LocalClock {
    /// Starts an unsynchronized clock at `start_time`
    pub fn new(start_time: Instant) -> Self {
        LocalClock {
            start_time,
            offset_ms: 0,
            is_leader: false,
            sync_level: SyncLevel::UNSYNCHRONIZED,
        }
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn sync_level(&self) -> SyncLevel {
        self.sync_level
    }

    /// Measured offset in milliseconds
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// Milliseconds since start, without any correction
    pub fn raw_elapsed_ms(&self, now: Instant) -> i64 {
        millis(now.saturating_duration_since(self.start_time))
    }

    /// Corrected milliseconds since start, as put in outbound timestamps.
    ///
    /// The offset only applies while synchronized to a source: a leader is
    /// the reference itself and an unsynchronized node has nothing to
    /// correct against.
    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        let applied = if self.sync_level.is_leader() || self.sync_level.is_unsynchronized() {
            0
        } else {
            self.offset_ms
        };
        self.raw_elapsed_ms(now).saturating_sub(applied).max(0) as u64
    }

    /// Adopts a measurement against a source at `source_level`
    pub fn synchronize(&mut self, offset_ms: i64, source_level: SyncLevel) {
        self.offset_ms = offset_ms;
        self.sync_level = source_level.successor();
    }

    /// Loses synchronization, keeping leadership untouched
    pub fn desynchronize(&mut self) {
        self.sync_level = SyncLevel::UNSYNCHRONIZED;
    }

    pub fn become_leader(&mut self) {
        self.is_leader = true;
        self.sync_level = SyncLevel::LEADER;
        self.offset_ms = 0;
    }

    pub fn resign(&mut self) {
        self.is_leader = false;
        self.sync_level = SyncLevel::UNSYNCHRONIZED;
    }
}

fn millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_starts_unsynchronized() {
        let start = Instant::now();
        let clock = LocalClock::new(start);
        assert!(!clock.is_leader());
        assert_eq!(clock.sync_level(), SyncLevel::UNSYNCHRONIZED);
        assert_eq!(clock.offset_ms(), 0);
        assert_eq!(clock.elapsed_ms(start + Duration::from_millis(1234)), 1234);
    }

    #[test]
    fn test_offset_applied_while_synchronized() {
        let start = Instant::now();
        let mut clock = LocalClock::new(start);
        clock.synchronize(45, SyncLevel(1));
        assert_eq!(clock.sync_level(), SyncLevel(2));

        let now = start + Duration::from_millis(1000);
        assert_eq!(clock.raw_elapsed_ms(now), 1000);
        assert_eq!(clock.elapsed_ms(now), 955);

        clock.synchronize(-30, SyncLevel(1));
        assert_eq!(clock.elapsed_ms(now), 1030);
    }

    #[test]
    fn test_offset_ignored_when_unsynchronized() {
        let start = Instant::now();
        let mut clock = LocalClock::new(start);
        clock.synchronize(500, SyncLevel(3));
        clock.desynchronize();
        assert_eq!(clock.offset_ms(), 500);
        assert_eq!(clock.elapsed_ms(start + Duration::from_millis(800)), 800);
    }

    #[test]
    fn test_elapsed_never_negative() {
        let start = Instant::now();
        let mut clock = LocalClock::new(start);
        clock.synchronize(10_000, SyncLevel(0));
        assert_eq!(clock.elapsed_ms(start + Duration::from_millis(10)), 0);
    }

    #[test]
    fn test_leadership() {
        let start = Instant::now();
        let mut clock = LocalClock::new(start);
        clock.synchronize(70, SyncLevel(2));

        clock.become_leader();
        assert!(clock.is_leader());
        assert_eq!(clock.sync_level(), SyncLevel::LEADER);
        assert_eq!(clock.offset_ms(), 0);

        clock.resign();
        assert!(!clock.is_leader());
        assert_eq!(clock.sync_level(), SyncLevel::UNSYNCHRONIZED);
    }
}
