//! BitTorrent protocol module
//!
//! Implements the handshake and the framed peer wire protocol.

pub mod handshake;
pub mod message;
pub mod wire;

// Re-export main types
pub use handshake::{Handshake, HANDSHAKE_LENGTH, PROTOCOL_LENGTH, PROTOCOL_STRING};
pub use message::{Message, MessageId, PeerMessage};
pub use wire::{read_message, write_frame, write_message, MAX_MESSAGE_LENGTH};
