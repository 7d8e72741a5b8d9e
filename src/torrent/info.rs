//! Torrent metadata
//!
//! Provides the structured, read-only description of a single-file torrent.

use sha1::{Digest, Sha1};
use serde::Serialize;

use crate::error::{Result, TorrentError};

/// Length of a SHA-1 digest
pub const HASH_LENGTH: usize = 20;

/// Parsed torrent description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    /// Primary tracker announce URL
    pub announce: String,
    /// Additional tracker URLs from `announce-list`, tiers flattened in order
    pub announce_list: Vec<String>,
    /// Suggested file name
    pub name: String,
    /// Total content length in bytes
    pub length: u64,
    /// Size of each piece in bytes (the last one may be shorter)
    pub piece_length: u64,
    /// SHA-1 of every piece, in file order
    pub pieces: Vec<[u8; HASH_LENGTH]>,
    /// SHA-1 of the raw `info` dictionary bytes
    pub info_hash: [u8; HASH_LENGTH],
}

/// Flat, printable view of the metadata
#[derive(Debug, Clone, Serialize)]
pub struct TorrentSummary {
    pub name: String,
    pub tracker_url: String,
    pub length: u64,
    pub info_hash: String,
    pub piece_length: u64,
    pub piece_hashes: Vec<String>,
}

impl TorrentMetadata {
    /// Number of pieces
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Expected hash of a piece
    pub fn piece_hash(&self, index: usize) -> Option<[u8; HASH_LENGTH]> {
        self.pieces.get(index).copied()
    }

    /// Logical length of a piece.
    ///
    /// Every piece is `piece_length` long except the last, which holds the
    /// remainder (or a full piece when the total divides evenly).
    pub fn piece_size(&self, index: usize) -> Option<u64> {
        let (start, end) = self.piece_range(index)?;
        Some(end - start)
    }

    /// Byte range `[start, end)` of a piece within the content
    pub fn piece_range(&self, index: usize) -> Option<(u64, u64)> {
        if index >= self.pieces.len() {
            return None;
        }

        let start = (index as u64) * self.piece_length;
        let end = std::cmp::min(start + self.piece_length, self.length);
        Some((start, end))
    }

    /// All tracker URLs: `announce` first, then `announce-list` entries not already seen
    pub fn trackers(&self) -> Vec<&str> {
        let mut urls = vec![self.announce.as_str()];
        for url in &self.announce_list {
            if !urls.contains(&url.as_str()) {
                urls.push(url);
            }
        }
        urls
    }

    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    pub fn summary(&self) -> TorrentSummary {
        TorrentSummary {
            name: self.name.clone(),
            tracker_url: self.announce.clone(),
            length: self.length,
            info_hash: self.info_hash_hex(),
            piece_length: self.piece_length,
            piece_hashes: self.pieces.iter().map(hex::encode).collect(),
        }
    }

    /// SHA-1 of arbitrary bytes
    pub fn sha1(data: &[u8]) -> [u8; HASH_LENGTH] {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    /// Split the concatenated `pieces` field into 20-byte hashes
    pub fn parse_piece_hashes(pieces_bytes: &[u8]) -> Result<Vec<[u8; HASH_LENGTH]>> {
        if pieces_bytes.len() % HASH_LENGTH != 0 {
            return Err(TorrentError::parse_error_with_source(
                "Pieces field length must be a multiple of 20",
                format!("got {} bytes", pieces_bytes.len()),
            ));
        }

        Ok(pieces_bytes
            .chunks_exact(HASH_LENGTH)
            .map(|chunk| {
                let mut hash = [0u8; HASH_LENGTH];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }
}
