use std::net::SocketAddr;

use tokio::time::Instant;

use crate::core::Result;
use crate::network::MessageSink;
use crate::protocol::Message;
use super::state::SynchronizerState;

impl SynchronizerState {
    /// Answers GET_TIME from anyone, known peer or not
    pub fn on_get_time(&self, from: SocketAddr, sink: &mut impl MessageSink) -> Result<()> {
        let reply = Message::Time {
            sync_level: self.clock.sync_level(),
            timestamp: self.clock.elapsed_ms(Instant::now()),
        };
        sink.send(&reply, from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SyncLevel, Timing};
    use crate::testing::Recorder;
    use std::time::Duration;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_time_reply() {
        let local: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let asker: SocketAddr = "192.168.1.50:9999".parse().unwrap();
        let mut state = SynchronizerState::new(local, None, Timing::default(), Instant::now());

        advance(Duration::from_millis(1500)).await;
        let mut sink = Recorder::default();
        state.on_get_time(asker, &mut sink).unwrap();
        assert_eq!(
            sink.sent,
            vec![(
                Message::Time {
                    sync_level: SyncLevel::UNSYNCHRONIZED,
                    timestamp: 1500
                },
                asker
            )]
        );

        state.clock.synchronize(500, SyncLevel(0));
        sink.sent.clear();
        state.on_get_time(asker, &mut sink).unwrap();
        assert_eq!(
            sink.sent,
            vec![(
                Message::Time {
                    sync_level: SyncLevel(1),
                    timestamp: 1000
                },
                asker
            )]
        );
        assert!(state.directory().is_empty());
    }
}
