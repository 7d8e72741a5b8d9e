//! Peer state module
//!
//! Download state machine states and the remote peer's piece bitfield.

use std::fmt;

/// Where a [`PieceDownloader`](super::PieceDownloader) is in its exchange with the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// Fresh connection, nothing sent yet; the peer usually opens with a bitfield
    AwaitingBitfield,
    /// Interested has been sent; waiting for, or holding, an unchoke
    Interested { choked: bool },
    /// Sending block requests
    RequestingBlocks,
    /// All requests out, collecting piece responses
    CollectingBlocks { received: usize, expected: usize },
    /// Last piece was assembled
    Complete,
    /// An I/O or protocol error aborted the exchange; the connection is unusable
    Failed,
}

impl DownloadState {
    pub fn is_failed(&self) -> bool {
        matches!(self, DownloadState::Failed)
    }
}

impl Default for DownloadState {
    fn default() -> Self {
        DownloadState::AwaitingBitfield
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadState::AwaitingBitfield => write!(f, "awaiting bitfield"),
            DownloadState::Interested { choked: true } => write!(f, "interested (choked)"),
            DownloadState::Interested { choked: false } => write!(f, "interested (unchoked)"),
            DownloadState::RequestingBlocks => write!(f, "requesting blocks"),
            DownloadState::CollectingBlocks { received, expected } => {
                write!(f, "collecting blocks ({}/{})", received, expected)
            }
            DownloadState::Complete => write!(f, "complete"),
            DownloadState::Failed => write!(f, "failed"),
        }
    }
}

/// Pieces a peer claims to have; bit 0 is the high bit of the first byte
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitfield(Vec<u8>);

impl Bitfield {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Check if peer has specific piece
    pub fn has_piece(&self, piece_index: usize) -> bool {
        let byte_index = piece_index / 8;
        let bit_index = 7 - (piece_index % 8);
        self.0
            .get(byte_index)
            .is_some_and(|byte| (byte >> bit_index) & 1 == 1)
    }

    /// Record a piece announced with a Have message.
    ///
    /// The bitfield never grows: indices past its end are dropped and `false`
    /// is returned.
    pub fn set_piece(&mut self, piece_index: usize) -> bool {
        match self.0.get_mut(piece_index / 8) {
            Some(byte) => {
                *byte |= 1 << (7 - (piece_index % 8));
                true
            }
            None => false,
        }
    }

    /// Get the number of pieces the peer has
    pub fn piece_count(&self) -> usize {
        self.0.iter().map(|byte| byte.count_ones() as usize).sum()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
