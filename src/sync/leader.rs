use tokio::time::Instant;
use tracing::info;

use crate::core::{Rejection, Result, SyncLevel};
use super::state::SynchronizerState;

impl SynchronizerState {
    pub fn on_leader(&mut self, sync_level: SyncLevel) -> Result<()> {
        match (sync_level, self.clock.is_leader()) {
            (SyncLevel::LEADER, false) => {
                let now = Instant::now();
                self.clock.become_leader();
                self.source = None;
                self.pending = None;
                // No SYNC_START until the grace period ends
                self.quiet_until = Some(now + self.timing.leader_grace);
                info!(grace = ?self.timing.leader_grace, "promoted to leader");
                Ok(())
            }
            (SyncLevel::UNSYNCHRONIZED, true) => {
                self.clock.resign();
                self.source = None;
                self.quiet_until = None;
                info!("stepped down as leader");
                Ok(())
            }
            (level, _) => Err(Rejection::InvalidLeader(level).into()),
        }
    }
}
