use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{DecodeError, EncodeError, Error, SyncLevel};
use super::message::{Message, MessageKind, NodeRecord};
use super::{HEADER_LEN, MAX_MESSAGE_SIZE};

/// Returns the exact encoded size of a message
pub fn encoded_len(message: &Message) -> usize {
    HEADER_LEN + message.nodes().iter().map(NodeRecord::encoded_len).sum::<usize>()
}

/// Encodes a message into a fresh buffer
pub fn encode(message: &Message) -> Result<BytesMut, EncodeError> {
    let mut dst = BytesMut::new();
    encode_into(message, &mut dst)?;
    Ok(dst)
}

/// Appends the wire form of a message to `dst`.
///
/// Nothing is written when the message cannot be encoded.
pub fn encode_into(message: &Message, dst: &mut BytesMut) -> Result<(), EncodeError> {
    let nodes = message.nodes();
    let count = u16::try_from(nodes.len()).map_err(|_| EncodeError::TooManyNodes(nodes.len()))?;

    if let Some(record) = nodes.iter().find(|r| r.address.len() > u8::MAX as usize) {
        return Err(EncodeError::AddressTooLong(record.address.len()));
    }

    let total = encoded_len(message);
    if total > MAX_MESSAGE_SIZE {
        return Err(EncodeError::TooLarge(total));
    }

    dst.reserve(total);
    dst.put_u8(message.kind() as u8);
    dst.put_u16(count);
    for record in nodes {
        dst.put_u8(record.address.len() as u8);
        dst.put_slice(&record.address);
        dst.put_u16(record.port);
    }
    dst.put_u64(message.timestamp());
    dst.put_u8(message.sync_level().level());

    Ok(())
}

/// Decodes one datagram. Bytes after the synchronization level are ignored.
pub fn decode(src: &[u8]) -> Result<Message, DecodeError> {
    if src.len() < HEADER_LEN {
        return Err(DecodeError::TooShort {
            len: src.len(),
            min: HEADER_LEN,
        });
    }

    let mut buf = src;
    let kind = buf.get_u8();
    let declared = buf.get_u16();

    // Every record takes at least three bytes, so a hostile count cannot
    // force a large allocation.
    let mut nodes = Vec::with_capacity((declared as usize).min(buf.remaining() / 3));
    for index in 0..declared {
        if !buf.has_remaining() {
            return Err(DecodeError::NodeCountMismatch {
                declared,
                present: index,
            });
        }
        let len = buf.get_u8() as usize;
        if buf.remaining() < len + 2 {
            return Err(DecodeError::TruncatedNode {
                index,
                declared: len,
                remaining: buf.remaining(),
            });
        }
        let address = buf[..len].to_vec();
        buf.advance(len);
        let port = buf.get_u16();
        nodes.push(NodeRecord { address, port });
    }

    if buf.remaining() < 8 {
        return Err(DecodeError::MissingTimestamp);
    }
    let timestamp = buf.get_u64();

    if !buf.has_remaining() {
        return Err(DecodeError::MissingSyncLevel);
    }
    let sync_level = SyncLevel(buf.get_u8());

    let kind = MessageKind::try_from(kind)?;
    Ok(Message::from_parts(kind, nodes, timestamp, sync_level))
}

/// Datagram codec for use with `tokio_util::udp::UdpFramed`.
///
/// Each call to `decode` consumes the whole buffer, since one datagram
/// carries exactly one message.
#[derive(Clone, Debug, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Creates a new message codec
    pub fn new() -> Self {
        MessageCodec
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // Take the datagram out first so a malformed one is not decoded twice.
        let datagram = src.split();
        Ok(Some(decode(&datagram)?))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&item, dst)?;
        Ok(())
    }
}
