//! BitTorrent protocol messages
//!
//! [`PeerMessage`] is a raw frame exactly as it came off the wire: an id byte
//! and an opaque payload. [`Message`] is the typed view used to build outgoing
//! messages and to interpret incoming ones.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, error, trace};

use crate::error::{Result, TorrentError};

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    /// Unknown ids are handed back unchanged
    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            9 => Ok(MessageId::Port),
            other => Err(other),
        }
    }
}

/// A raw, non-keep-alive frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMessage {
    pub id: u8,
    pub payload: Bytes,
}

impl PeerMessage {
    pub fn new(id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Known message id, if any
    pub fn message_id(&self) -> Option<MessageId> {
        MessageId::try_from(self.id).ok()
    }

    /// Value of the length prefix for this frame
    pub fn length(&self) -> u32 {
        1 + self.payload.len() as u32
    }
}

/// BitTorrent protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Bytes },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Bytes },
    Cancel { index: u32, begin: u32, length: u32 },
    Port { listen_port: u16 },
    /// Any id this client does not interpret, passed through untouched
    Unknown { id: u8, payload: Bytes },
}

impl Message {
    /// Get the message ID (None for KeepAlive and unknown ids)
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield { .. } => Some(MessageId::Bitfield),
            Message::Request { .. } => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel { .. } => Some(MessageId::Cancel),
            Message::Port { .. } => Some(MessageId::Port),
            Message::KeepAlive | Message::Unknown { .. } => None,
        }
    }

    /// Get the message length (excluding the length prefix)
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { block, .. } => 9 + block.len() as u32,
            Message::Port { .. } => 3,
            Message::Unknown { payload, .. } => 1 + payload.len() as u32,
        }
    }

    /// Serialize the message to bytes (including length prefix)
    pub fn serialize(&self) -> Bytes {
        trace!("Serializing message: {:?}", self.message_id());
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);
        buf.put_u32(self.length());

        match self {
            Message::KeepAlive => {}
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => {
                buf.put_u8(self.id_byte());
            }
            Message::Have { piece_index } => {
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(*piece_index);
            }
            Message::Bitfield { bitfield } => {
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(bitfield);
            }
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                buf.put_u8(self.id_byte());
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
            Message::Port { listen_port } => {
                buf.put_u8(MessageId::Port as u8);
                buf.put_u16(*listen_port);
            }
            Message::Unknown { id, payload } => {
                buf.put_u8(*id);
                buf.put_slice(payload);
            }
        }

        buf.freeze()
    }

    fn id_byte(&self) -> u8 {
        match self {
            Message::Unknown { id, .. } => *id,
            other => other.message_id().map_or(0, |id| id as u8),
        }
    }

    /// Interpret a raw frame.
    ///
    /// Fails only when a known id carries a payload of the wrong shape;
    /// unknown ids become [`Message::Unknown`].
    pub fn parse(frame: PeerMessage) -> Result<Self> {
        let PeerMessage { id, payload } = frame;
        let message_id = match MessageId::try_from(id) {
            Ok(message_id) => message_id,
            Err(id) => {
                debug!("Passing through unknown message id {} ({} bytes)", id, payload.len());
                return Ok(Message::Unknown { id, payload });
            }
        };

        let mut buf = payload;
        let message = match message_id {
            MessageId::Choke => expect_empty(message_id, &buf, Message::Choke)?,
            MessageId::Unchoke => expect_empty(message_id, &buf, Message::Unchoke)?,
            MessageId::Interested => expect_empty(message_id, &buf, Message::Interested)?,
            MessageId::NotInterested => expect_empty(message_id, &buf, Message::NotInterested)?,
            MessageId::Have => {
                expect_exact(message_id, &buf, 4)?;
                Message::Have { piece_index: buf.get_u32() }
            }
            MessageId::Bitfield => Message::Bitfield { bitfield: buf },
            MessageId::Request => {
                expect_exact(message_id, &buf, 12)?;
                Message::Request {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    length: buf.get_u32(),
                }
            }
            MessageId::Piece => {
                if buf.remaining() < 8 {
                    error!("Piece message too short: expected at least 8 bytes, got {}", buf.remaining());
                    return Err(TorrentError::protocol_error_with_source(
                        "Piece message too short",
                        format!("expected at least 8 bytes, got {}", buf.remaining()),
                    ));
                }
                let index = buf.get_u32();
                let begin = buf.get_u32();
                Message::Piece { index, begin, block: buf }
            }
            MessageId::Cancel => {
                expect_exact(message_id, &buf, 12)?;
                Message::Cancel {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    length: buf.get_u32(),
                }
            }
            MessageId::Port => {
                expect_exact(message_id, &buf, 2)?;
                Message::Port { listen_port: buf.get_u16() }
            }
        };

        trace!("Parsed message: {:?}", message.message_id());
        Ok(message)
    }
}

fn expect_exact(id: MessageId, payload: &Bytes, expected: usize) -> Result<()> {
    if payload.len() != expected {
        error!("{:?} message has {} payload bytes, expected {}", id, payload.len(), expected);
        return Err(TorrentError::protocol_error_with_source(
            format!("Malformed {:?} message", id),
            format!("expected {} payload bytes, got {}", expected, payload.len()),
        ));
    }
    Ok(())
}

fn expect_empty(id: MessageId, payload: &Bytes, message: Message) -> Result<Message> {
    expect_exact(id, payload, 0)?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(message: &Message) -> PeerMessage {
        let bytes = message.serialize();
        PeerMessage::new(bytes[4], bytes.slice(5..))
    }

    #[test]
    fn test_keepalive_serializes_to_zero_length() {
        assert_eq!(&Message::KeepAlive.serialize()[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_request_wire_layout() {
        let bytes = Message::Request { index: 1, begin: 16384, length: 3616 }.serialize();
        assert_eq!(
            &bytes[..],
            &[0, 0, 0, 13, 6, 0, 0, 0, 1, 0, 0, 0x40, 0, 0, 0, 0x0e, 0x20]
        );
    }

    #[test]
    fn test_parse_request() {
        let message = Message::Request { index: 1, begin: 2, length: 3 };
        assert_eq!(Message::parse(frame_of(&message)).unwrap(), message);
    }

    #[test]
    fn test_parse_piece() {
        let message = Message::Piece { index: 10, begin: 16384, block: Bytes::from_static(&[1, 2, 3]) };
        assert_eq!(Message::parse(frame_of(&message)).unwrap(), message);
    }

    #[test]
    fn test_parse_have_and_port() {
        let have = Message::Have { piece_index: 42 };
        assert_eq!(Message::parse(frame_of(&have)).unwrap(), have);
        let port = Message::Port { listen_port: 6881 };
        assert_eq!(Message::parse(frame_of(&port)).unwrap(), port);
    }

    #[test]
    fn test_parse_unknown_id_passes_through() {
        let frame = PeerMessage::new(20, Bytes::from_static(b"\x00d1:mdee"));
        assert_eq!(frame.message_id(), None);
        match Message::parse(frame).unwrap() {
            Message::Unknown { id, payload } => {
                assert_eq!(id, 20);
                assert_eq!(&payload[..], b"\x00d1:mdee");
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed_payloads() {
        let short_piece = PeerMessage::new(7, Bytes::from_static(&[0, 0, 0, 1, 0, 0]));
        assert!(matches!(Message::parse(short_piece), Err(TorrentError::ProtocolError { .. })));

        let long_request = PeerMessage::new(6, vec![0u8; 13]);
        assert!(Message::parse(long_request).is_err());

        let choke_with_payload = PeerMessage::new(0, vec![1u8]);
        assert!(Message::parse(choke_with_payload).is_err());
    }

    #[test]
    fn test_message_length() {
        assert_eq!(Message::KeepAlive.length(), 0);
        assert_eq!(Message::Choke.length(), 1);
        assert_eq!(Message::Have { piece_index: 0 }.length(), 5);
        assert_eq!(Message::Request { index: 0, begin: 0, length: 0 }.length(), 13);
        assert_eq!(Message::Piece { index: 0, begin: 0, block: Bytes::from_static(&[1, 2, 3]) }.length(), 12);
        assert_eq!(Message::Unknown { id: 20, payload: Bytes::new() }.length(), 1);
    }

    #[test]
    fn test_message_id_from_u8() {
        assert_eq!(MessageId::try_from(0u8), Ok(MessageId::Choke));
        assert_eq!(MessageId::try_from(8u8), Ok(MessageId::Cancel));
        assert_eq!(MessageId::try_from(9u8), Ok(MessageId::Port));
        assert_eq!(MessageId::try_from(10u8), Err(10));
    }
}
