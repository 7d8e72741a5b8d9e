//! Piece assembly module
//!
//! Splits a piece into block requests, collects the blocks a peer sends back
//! and checks the assembled piece against its expected hash.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{debug, error, trace};

use crate::error::{Result, TorrentError};
use crate::torrent::TorrentMetadata;

/// Largest block requested from a peer (16 KiB)
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// A single block request within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Piece index this block belongs to
    pub piece_index: u32,
    /// Offset within the piece
    pub begin: u32,
    /// Length of the block
    pub length: u32,
}

impl Block {
    pub fn new(piece_index: u32, begin: u32, length: u32) -> Self {
        Self {
            piece_index,
            begin,
            length,
        }
    }

    /// Offset one past the last byte of this block
    pub fn end(&self) -> u64 {
        self.begin as u64 + self.length as u64
    }
}

/// Partition `[0, piece_length)` into blocks of at most [`BLOCK_SIZE`] bytes,
/// in ascending offset order. Only the last block may be shorter.
pub fn block_requests(piece_index: u32, piece_length: u32) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(piece_length.div_ceil(BLOCK_SIZE) as usize);
    let mut begin = 0u32;
    while begin < piece_length {
        let length = BLOCK_SIZE.min(piece_length - begin);
        blocks.push(Block::new(piece_index, begin, length));
        begin += length;
    }
    blocks
}

/// Blocks received so far for one piece.
///
/// The first copy of each requested offset is kept; later copies and offsets
/// that were never requested are ignored.
#[derive(Debug)]
pub struct PieceBuffer {
    piece_index: u32,
    requested: BTreeMap<u32, u32>,
    received: BTreeMap<u32, Bytes>,
}

impl PieceBuffer {
    /// Create an empty buffer expecting the blocks of `block_requests(piece_index, piece_length)`
    pub fn new(piece_index: u32, piece_length: u32) -> Self {
        let requested = block_requests(piece_index, piece_length)
            .into_iter()
            .map(|block| (block.begin, block.length))
            .collect();
        Self {
            piece_index,
            requested,
            received: BTreeMap::new(),
        }
    }

    /// Blocks this buffer is waiting on, in ascending offset order
    pub fn blocks(&self) -> Vec<Block> {
        self.requested
            .iter()
            .map(|(&begin, &length)| Block::new(self.piece_index, begin, length))
            .collect()
    }

    /// Store a block.
    ///
    /// Returns `Ok(true)` when the block was new, `Ok(false)` when it was a
    /// duplicate or an offset that was never requested. A block whose length
    /// differs from the requested length is a protocol error.
    pub fn insert(&mut self, begin: u32, data: Bytes) -> Result<bool> {
        let Some(&expected_length) = self.requested.get(&begin) else {
            debug!("Discarding unrequested block at offset {} of piece {}", begin, self.piece_index);
            return Ok(false);
        };

        if self.received.contains_key(&begin) {
            debug!("Discarding duplicate block at offset {} of piece {}", begin, self.piece_index);
            return Ok(false);
        }

        if data.len() != expected_length as usize {
            error!(
                "Block at offset {} of piece {} has {} bytes, requested {}",
                begin,
                self.piece_index,
                data.len(),
                expected_length
            );
            return Err(TorrentError::protocol_error_with_source(
                "Block length does not match request",
                format!(
                    "piece {} offset {}: requested {} bytes, got {}",
                    self.piece_index,
                    begin,
                    expected_length,
                    data.len()
                ),
            ));
        }

        trace!("Stored block at offset {} of piece {}", begin, self.piece_index);
        self.received.insert(begin, data);
        Ok(true)
    }

    pub fn received(&self) -> usize {
        self.received.len()
    }

    pub fn expected(&self) -> usize {
        self.requested.len()
    }

    pub fn is_complete(&self) -> bool {
        self.received.len() == self.requested.len()
    }

    /// Concatenate every block in ascending offset order
    pub fn assemble(self) -> Result<Vec<u8>> {
        if !self.is_complete() {
            return Err(TorrentError::protocol_error_with_source(
                "Piece is incomplete",
                format!(
                    "piece {}: {} of {} blocks received",
                    self.piece_index,
                    self.received.len(),
                    self.requested.len()
                ),
            ));
        }

        let total: usize = self.requested.values().map(|&length| length as usize).sum();
        let mut data = Vec::with_capacity(total);
        for block in self.received.values() {
            data.extend_from_slice(block);
        }
        Ok(data)
    }
}

/// Check a downloaded piece against its expected SHA-1
pub fn verify_piece(piece_index: u32, data: &[u8], expected: &[u8; 20]) -> Result<()> {
    let actual = TorrentMetadata::sha1(data);
    if actual != *expected {
        error!(
            "Piece {} failed verification: expected {}, got {}",
            piece_index,
            hex::encode(expected),
            hex::encode(actual)
        );
        return Err(TorrentError::integrity_error(piece_index, *expected, actual));
    }
    debug!("Piece {} verified ({} bytes)", piece_index, data.len());
    Ok(())
}
