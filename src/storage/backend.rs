//! Persistence sink abstraction
//!
//! Downloaded and verified pieces are handed to a [`PieceSink`]; the download
//! path never touches files itself.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::error::Result;

/// Destination for verified pieces
#[async_trait]
pub trait PieceSink: Send {
    /// Write a verified piece.
    ///
    /// Implementations must store the data unmodified. Pieces may arrive in
    /// any order.
    async fn write_piece(&mut self, piece_index: u32, data: Bytes) -> Result<()>;

    /// Flush anything buffered once every piece has been written
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps pieces in memory, keyed by index
#[derive(Debug, Default)]
pub struct MemorySink {
    pieces: BTreeMap<u32, Bytes>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn piece(&self, piece_index: u32) -> Option<&Bytes> {
        self.pieces.get(&piece_index)
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// All pieces concatenated in index order
    pub fn concat(&self) -> Vec<u8> {
        self.pieces.values().flat_map(|piece| piece.iter().copied()).collect()
    }
}

#[async_trait]
impl PieceSink for MemorySink {
    async fn write_piece(&mut self, piece_index: u32, data: Bytes) -> Result<()> {
        trace!("Storing piece {} in memory ({} bytes)", piece_index, data.len());
        self.pieces.insert(piece_index, data);
        Ok(())
    }
}
