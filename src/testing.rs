use std::net::SocketAddr;

use crate::core::{Error, Result};
use crate::network::MessageSink;
use crate::protocol::Message;

/// Sink that keeps every message instead of sending it
#[derive(Debug, Default)]
pub struct Recorder {
    pub sent: Vec<(Message, SocketAddr)>,
    fail: bool,
}

impl Recorder {
    /// A sink whose every send fails
    pub fn failing() -> Self {
        Recorder {
            sent: Vec::new(),
            fail: true,
        }
    }
}

impl MessageSink for Recorder {
    fn send(&mut self, message: &Message, dest: SocketAddr) -> Result<()> {
        if self.fail {
            return Err(Error::transport(format!("send {} to {}: refused", message.kind(), dest)));
        }
        self.sent.push((message.clone(), dest));
        Ok(())
    }
}
