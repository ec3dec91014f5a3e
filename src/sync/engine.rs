use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{Rejection, Result, SyncLevel};
use crate::network::MessageSink;
use crate::protocol::Message;
use super::compute_offset;
use super::state::{PendingSync, SyncSource, SynchronizerState};

/// Expiry fires strictly after a limit, so deadlines wake this much later
const EXPIRY_RESOLUTION: Duration = Duration::from_millis(1);

impl SynchronizerState {
    /// Runs the timers in order: source expiry, pending expiry, then the
    /// periodic SYNC_START broadcast.
    pub fn housekeeping(&mut self, now: Instant, sink: &mut impl MessageSink) {
        self.expire_source(now);
        self.expire_pending(now);
        self.maybe_broadcast_sync_start(now, sink);
    }

    /// Drops a source that has been silent for more than the source timeout
    pub fn expire_source(&mut self, now: Instant) -> bool {
        if self.clock.is_leader() {
            return false;
        }
        let timeout = self.timing.source_timeout;
        match &self.source {
            Some(source) if now.saturating_duration_since(source.last_heard) > timeout => {
                info!(peer = %source.peer, "synchronization source timed out");
                self.source = None;
                self.clock.desynchronize();
                true
            }
            _ => false,
        }
    }

    /// Drops a delay probe that never got its response
    pub fn expire_pending(&mut self, now: Instant) -> bool {
        let timeout = self.timing.pending_timeout;
        match &self.pending {
            Some(pending) if pending.is_expired(now, timeout) => {
                debug!(peer = %pending.peer, "delay probe timed out");
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Sends SYNC_START to every known peer once per interval, provided this
    /// node has time to offer
    pub fn maybe_broadcast_sync_start(&mut self, now: Instant, sink: &mut impl MessageSink) -> bool {
        if !self.clock.sync_level().can_serve() {
            return false;
        }
        if self.quiet_until.map_or(false, |until| now < until) {
            return false;
        }
        if now.saturating_duration_since(self.last_sync_start) < self.timing.sync_interval {
            return false;
        }

        self.last_sync_start = now;
        self.quiet_until = None;

        let message = Message::SyncStart {
            sync_level: self.clock.sync_level(),
            timestamp: self.clock.elapsed_ms(now),
        };
        debug!(level = %self.clock.sync_level(), peers = self.directory.len(), "broadcasting SYNC_START");
        for peer in self.directory.iter() {
            if let Err(e) = sink.send(&message, *peer) {
                warn!(%peer, error = %e, "SYNC_START not sent");
            }
        }
        true
    }

    /// The next instant at which `housekeeping` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        let source = self
            .source
            .as_ref()
            .filter(|_| !self.clock.is_leader())
            .map(|source| source.last_heard + self.timing.source_timeout + EXPIRY_RESOLUTION);
        let pending = self
            .pending
            .as_ref()
            .map(|pending| pending.requested_at + self.timing.pending_timeout + EXPIRY_RESOLUTION);
        let broadcast = if self.clock.sync_level().can_serve() {
            let due = self.last_sync_start + self.timing.sync_interval;
            Some(self.quiet_until.map_or(due, |until| due.max(until)))
        } else {
            None
        };

        [source, pending, broadcast].into_iter().flatten().min()
    }

    /// Considers a peer's offer to serve time
    pub fn on_sync_start(
        &mut self,
        from: SocketAddr,
        sync_level: SyncLevel,
        timestamp: u64,
        sink: &mut impl MessageSink,
    ) -> Result<()> {
        if self.clock.is_leader() {
            return Err(Rejection::IsLeader.into());
        }

        let now = Instant::now();
        if let Some(source) = self.source.as_mut().filter(|source| source.peer == from) {
            source.last_heard = now;
            if sync_level >= self.clock.sync_level() {
                info!(peer = %from, level = %sync_level, "source is no better than us any more");
                self.source = None;
                self.clock.desynchronize();
            }
        }

        if let Some(pending) = &self.pending {
            if !pending.is_expired(now, self.timing.pending_timeout) {
                return Err(Rejection::AlreadySynchronizing(pending.peer).into());
            }
            self.pending = None;
        }

        if !self.directory.contains(&from) {
            return Err(Rejection::UnknownSender(from).into());
        }
        if !sync_level.can_serve() {
            return Err(Rejection::PeerUnsynchronized(sync_level).into());
        }
        if let Some(source) = &self.source {
            let local = self.clock.sync_level();
            // A different peer has to get us to a strictly better level.
            let not_better = if source.peer == from {
                sync_level >= local
            } else {
                sync_level.successor() >= local
            };
            if not_better {
                return Err(Rejection::NotBetter {
                    offered: sync_level,
                    local,
                }
                .into());
            }
        }

        let t2 = self.clock.raw_elapsed_ms(now);
        self.pending = Some(PendingSync {
            peer: from,
            sync_level,
            t1: timestamp,
            t2,
            t3: t2,
            requested_at: now,
        });

        if let Err(e) = sink.send(&Message::DelayRequest, from) {
            self.pending = None;
            return Err(e);
        }

        let sent_at = Instant::now();
        if let Some(pending) = self.pending.as_mut() {
            pending.t3 = self.clock.raw_elapsed_ms(sent_at);
            pending.requested_at = sent_at;
        }
        debug!(peer = %from, level = %sync_level, "delay probe started");
        Ok(())
    }

    /// Answers a delay probe from a known peer
    pub fn on_delay_request(&mut self, from: SocketAddr, sink: &mut impl MessageSink) -> Result<()> {
        if !self.directory.contains(&from) {
            return Err(Rejection::UnknownSender(from).into());
        }
        let reply = Message::DelayResponse {
            sync_level: self.clock.sync_level(),
            timestamp: self.clock.elapsed_ms(Instant::now()),
        };
        sink.send(&reply, from)
    }

    /// Completes the delay probe and adopts the sender as source
    pub fn on_delay_response(
        &mut self,
        from: SocketAddr,
        sync_level: SyncLevel,
        t4: u64,
    ) -> Result<()> {
        if self.clock.is_leader() {
            self.pending = None;
            return Err(Rejection::IsLeader.into());
        }

        let pending = match &self.pending {
            Some(pending) => pending,
            None => return Err(Rejection::NoPendingSync.into()),
        };
        if pending.peer != from {
            return Err(Rejection::WrongSender {
                expected: pending.peer,
                actual: from,
            }
            .into());
        }

        let now = Instant::now();
        let limit = self.timing.pending_timeout;
        let rejection = if pending.sync_level != sync_level {
            Some(Rejection::SyncLevelChanged {
                before: pending.sync_level,
                after: sync_level,
            })
        } else if i128::from(t4) - i128::from(pending.t1) > limit.as_millis() as i128 {
            Some(Rejection::Timeout {
                limit_ms: limit.as_millis(),
            })
        } else if now.saturating_duration_since(pending.requested_at) > limit {
            Some(Rejection::Timeout {
                limit_ms: limit.as_millis(),
            })
        } else if pending.t1 > t4 {
            Some(Rejection::NegativeDelay { t1: pending.t1, t4 })
        } else {
            None
        };

        let pending = self.pending.take().ok_or(Rejection::NoPendingSync)?;
        if let Some(rejection) = rejection {
            return Err(rejection.into());
        }

        let offset = compute_offset(pending.t1, pending.t2, pending.t3, t4);
        let previous = self.clock.sync_level();
        self.clock.synchronize(offset, sync_level);
        self.source = Some(SyncSource {
            peer: from,
            sync_level,
            last_heard: now,
        });

        if previous != self.clock.sync_level() {
            info!(peer = %from, level = %self.clock.sync_level(), offset_ms = offset, "synchronized");
        } else {
            debug!(peer = %from, offset_ms = offset, "offset refreshed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Error, Timing};
    use crate::testing::Recorder;
    use std::time::Duration;
    use tokio::time::advance;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn new_state() -> SynchronizerState {
        SynchronizerState::new(addr("10.0.0.1:4000"), None, Timing::default(), Instant::now())
    }

    fn rejection(result: Result<()>) -> Rejection {
        match result {
            Err(Error::Rejected(rejection)) => rejection,
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    /// Runs a full probe against `peer` at `level`, answering with `t4`
    fn synchronize_to(state: &mut SynchronizerState, peer: SocketAddr, level: u8, t1: u64, t4: u64) {
        let mut sink = Recorder::default();
        state
            .on_sync_start(peer, SyncLevel(level), t1, &mut sink)
            .unwrap();
        assert_eq!(sink.sent, vec![(Message::DelayRequest, peer)]);
        state.on_delay_response(peer, SyncLevel(level), t4).unwrap();
    }

    #[test]
    fn test_offset_example() {
        assert_eq!(compute_offset(100, 150, 160, 120), 45);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_sender_rejected_at_any_level() {
        let mut state = new_state();
        let mut sink = Recorder::default();
        for level in [0u8, 1, 100, 253, 254, 255] {
            let result = state.on_sync_start(addr("10.0.0.2:4000"), SyncLevel(level), 0, &mut sink);
            assert!(matches!(rejection(result), Rejection::UnknownSender(_)));
        }
        assert!(sink.sent.is_empty());
        assert!(state.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsynchronized_peer_rejected() {
        let mut state = new_state();
        let peer = addr("10.0.0.2:4000");
        state.directory.push(peer);
        let mut sink = Recorder::default();
        for level in [254u8, 255] {
            let result = state.on_sync_start(peer, SyncLevel(level), 0, &mut sink);
            assert_eq!(rejection(result), Rejection::PeerUnsynchronized(SyncLevel(level)));
        }
        assert!(sink.sent.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_probe() {
        let mut state = new_state();
        let peer = addr("10.0.0.2:4000");
        state.directory.push(peer);

        advance(Duration::from_millis(150)).await;
        let mut sink = Recorder::default();
        state.on_sync_start(peer, SyncLevel(0), 100, &mut sink).unwrap();

        let pending = state.pending().unwrap().clone();
        assert_eq!(pending.peer, peer);
        assert_eq!(pending.t1, 100);
        assert_eq!(pending.t2, 150);
        assert_eq!(pending.t3, 150);

        advance(Duration::from_millis(10)).await;
        state.on_delay_response(peer, SyncLevel(0), 120).unwrap();

        // ((150 - 100) + (150 - 120)) / 2
        assert_eq!(state.clock().offset_ms(), 40);
        assert_eq!(state.sync_level(), SyncLevel(1));
        assert_eq!(state.source().map(|s| s.peer), Some(peer));
        assert_eq!(state.source().map(|s| s.sync_level), Some(SyncLevel(0)));
        assert!(state.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_clears_pending() {
        let mut state = new_state();
        let peer = addr("10.0.0.2:4000");
        state.directory.push(peer);
        let mut sink = Recorder::failing();
        assert!(state.on_sync_start(peer, SyncLevel(0), 0, &mut sink).is_err());
        assert!(state.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_probe_at_a_time() {
        let mut state = new_state();
        let first = addr("10.0.0.2:4000");
        let second = addr("10.0.0.3:4000");
        state.directory.push(first);
        state.directory.push(second);

        let mut sink = Recorder::default();
        state.on_sync_start(first, SyncLevel(1), 0, &mut sink).unwrap();
        let result = state.on_sync_start(second, SyncLevel(0), 0, &mut sink);
        assert_eq!(rejection(result), Rejection::AlreadySynchronizing(first));

        advance(Duration::from_secs(5)).await;
        let result = state.on_sync_start(second, SyncLevel(0), 0, &mut sink);
        assert_eq!(rejection(result), Rejection::AlreadySynchronizing(first));

        advance(Duration::from_millis(1)).await;
        state.on_sync_start(second, SyncLevel(0), 0, &mut sink).unwrap();
        assert_eq!(state.pending().map(|p| p.peer), Some(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_expires_in_housekeeping() {
        let mut state = new_state();
        let peer = addr("10.0.0.2:4000");
        state.directory.push(peer);
        let mut sink = Recorder::default();
        state.on_sync_start(peer, SyncLevel(0), 0, &mut sink).unwrap();

        advance(Duration::from_secs(5)).await;
        assert!(!state.expire_pending(Instant::now()));
        advance(Duration::from_millis(1)).await;
        assert!(state.expire_pending(Instant::now()));
        assert!(state.pending().is_none());

        let result = state.on_delay_response(peer, SyncLevel(0), 10);
        assert_eq!(rejection(result), Rejection::NoPendingSync);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_switch_needs_strictly_better_level() {
        let mut state = new_state();
        let source = addr("10.0.0.2:4000");
        let other = addr("10.0.0.3:4000");
        state.directory.push(source);
        state.directory.push(other);

        synchronize_to(&mut state, source, 2, 0, 0);
        assert_eq!(state.sync_level(), SyncLevel(3));

        let mut sink = Recorder::default();
        // Level 2 elsewhere would land us at 3 again
        let result = state.on_sync_start(other, SyncLevel(2), 0, &mut sink);
        assert!(matches!(rejection(result), Rejection::NotBetter { .. }));
        assert!(sink.sent.is_empty());

        state.on_sync_start(other, SyncLevel(1), 0, &mut sink).unwrap();
        state.on_delay_response(other, SyncLevel(1), 0).unwrap();
        assert_eq!(state.sync_level(), SyncLevel(2));
        assert_eq!(state.source().map(|s| s.peer), Some(other));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_source_refresh() {
        let mut state = new_state();
        let source = addr("10.0.0.2:4000");
        state.directory.push(source);
        synchronize_to(&mut state, source, 1, 0, 0);
        assert_eq!(state.sync_level(), SyncLevel(2));

        advance(Duration::from_secs(15)).await;
        let mut sink = Recorder::default();
        state.on_sync_start(source, SyncLevel(1), 15_000, &mut sink).unwrap();
        assert_eq!(state.source().unwrap().last_heard, Instant::now());

        state.on_delay_response(source, SyncLevel(1), 15_000).unwrap();
        assert_eq!(state.sync_level(), SyncLevel(2));

        // Still refreshed well past the first 20 s window
        advance(Duration::from_secs(10)).await;
        assert!(!state.expire_source(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_degrading_is_dropped() {
        let mut state = new_state();
        let source = addr("10.0.0.2:4000");
        state.directory.push(source);
        synchronize_to(&mut state, source, 1, 0, 0);

        // The source now advertises our own level: it can no longer help us
        // and the offer is judged as from a fresh peer.
        let mut sink = Recorder::default();
        state.on_sync_start(source, SyncLevel(2), 0, &mut sink).unwrap();
        assert!(state.source().is_none());
        assert_eq!(state.pending().map(|p| p.sync_level), Some(SyncLevel(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_timeout() {
        let mut state = new_state();
        let source = addr("10.0.0.2:4000");
        state.directory.push(source);
        synchronize_to(&mut state, source, 0, 0, 0);
        assert_eq!(state.sync_level(), SyncLevel(1));

        advance(Duration::from_secs(20)).await;
        assert!(!state.expire_source(Instant::now()));
        assert_eq!(state.sync_level(), SyncLevel(1));

        advance(Duration::from_millis(1)).await;
        assert!(state.expire_source(Instant::now()));
        assert!(state.source().is_none());
        assert_eq!(state.sync_level(), SyncLevel::UNSYNCHRONIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_response_checks() {
        let peer = addr("10.0.0.2:4000");

        // Wrong sender keeps the probe alive
        let mut state = new_state();
        state.directory.push(peer);
        let mut sink = Recorder::default();
        state.on_sync_start(peer, SyncLevel(0), 1000, &mut sink).unwrap();
        let result = state.on_delay_response(addr("10.0.0.9:4000"), SyncLevel(0), 1001);
        assert!(matches!(rejection(result), Rejection::WrongSender { .. }));
        assert!(state.pending().is_some());

        // Level changed mid-probe
        let result = state.on_delay_response(peer, SyncLevel(1), 1001);
        assert!(matches!(rejection(result), Rejection::SyncLevelChanged { .. }));
        assert!(state.pending().is_none());

        // T4 more than 5 s after T1
        state.on_sync_start(peer, SyncLevel(0), 1000, &mut sink).unwrap();
        let result = state.on_delay_response(peer, SyncLevel(0), 6001);
        assert!(matches!(rejection(result), Rejection::Timeout { .. }));
        assert!(state.pending().is_none());

        // T1 after T4
        state.on_sync_start(peer, SyncLevel(0), 1000, &mut sink).unwrap();
        let result = state.on_delay_response(peer, SyncLevel(0), 999);
        assert_eq!(rejection(result), Rejection::NegativeDelay { t1: 1000, t4: 999 });
        assert!(state.pending().is_none());
        assert!(state.source().is_none());
        assert_eq!(state.sync_level(), SyncLevel::UNSYNCHRONIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_delay_response() {
        let peer = addr("10.0.0.2:4000");
        let mut state = new_state();
        state.directory.push(peer);
        let mut sink = Recorder::default();
        state.on_sync_start(peer, SyncLevel(0), 1000, &mut sink).unwrap();

        // Housekeeping has not run yet, so the probe is still there
        advance(Duration::from_millis(5001)).await;
        let result = state.on_delay_response(peer, SyncLevel(0), 1000);
        assert!(matches!(rejection(result), Rejection::Timeout { .. }));
        assert!(state.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_response_at_exact_limit_accepted() {
        let peer = addr("10.0.0.2:4000");
        let mut state = new_state();
        state.directory.push(peer);
        let mut sink = Recorder::default();
        state.on_sync_start(peer, SyncLevel(0), 1000, &mut sink).unwrap();

        advance(Duration::from_secs(5)).await;
        state.housekeeping(Instant::now(), &mut sink);
        assert!(state.pending().is_some());

        state.on_delay_response(peer, SyncLevel(0), 6000).unwrap();
        assert_eq!(state.sync_level(), SyncLevel(1));
        assert_eq!(state.source().map(|s| s.peer), Some(peer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_request_only_from_known_peers() {
        let mut state = new_state();
        let peer = addr("10.0.0.2:4000");
        let mut sink = Recorder::default();

        let result = state.on_delay_request(peer, &mut sink);
        assert!(matches!(rejection(result), Rejection::UnknownSender(_)));

        state.directory.push(peer);
        advance(Duration::from_millis(250)).await;
        state.on_delay_request(peer, &mut sink).unwrap();
        assert_eq!(
            sink.sent,
            vec![(
                Message::DelayResponse {
                    sync_level: SyncLevel::UNSYNCHRONIZED,
                    timestamp: 250
                },
                peer
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_only_when_serving() {
        let mut state = new_state();
        let peers = [addr("10.0.0.2:4000"), addr("10.0.0.3:4000")];
        for peer in peers {
            state.directory.push(peer);
        }
        let mut sink = Recorder::default();

        advance(Duration::from_secs(6)).await;
        state.housekeeping(Instant::now(), &mut sink);
        assert!(sink.sent.is_empty(), "unsynchronized nodes stay silent");

        synchronize_to(&mut state, peers[0], 0, 0, 0);
        state.housekeeping(Instant::now(), &mut sink);
        assert_eq!(sink.sent.len(), 2);
        assert!(sink.sent.iter().all(|(message, _)| matches!(
            message,
            Message::SyncStart { sync_level: SyncLevel(1), .. }
        )));

        // Nothing more until the interval has passed again
        sink.sent.clear();
        advance(Duration::from_secs(4)).await;
        state.housekeeping(Instant::now(), &mut sink);
        assert!(sink.sent.is_empty());
        advance(Duration::from_secs(1)).await;
        state.housekeeping(Instant::now(), &mut sink);
        assert_eq!(sink.sent.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_deadline() {
        let mut state = new_state();
        assert_eq!(state.next_deadline(), None);

        let peer = addr("10.0.0.2:4000");
        state.directory.push(peer);
        let mut sink = Recorder::default();
        let start = Instant::now();
        state.on_sync_start(peer, SyncLevel(0), 0, &mut sink).unwrap();
        assert_eq!(state.next_deadline(), Some(start + Duration::from_millis(5001)));

        state.on_delay_response(peer, SyncLevel(0), 0).unwrap();
        // Broadcast is due 5 s after the state was created
        assert_eq!(state.next_deadline(), Some(start + Duration::from_secs(5)));

        advance(Duration::from_secs(5)).await;
        state.housekeeping(Instant::now(), &mut sink);
        assert_eq!(state.next_deadline(), Some(start + Duration::from_secs(10)));
    }
}
