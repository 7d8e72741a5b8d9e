//! File storage module
//!
//! Writes verified pieces into a single output file at their offsets.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error, info};

use crate::error::{Result, TorrentError};
use crate::storage::backend::PieceSink;
use crate::torrent::TorrentMetadata;

/// Single-file sink placing piece `i` at byte `i * piece_length`
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: fs::File,
    piece_length: u64,
    total_length: u64,
    /// Which pieces have been written
    completed: Vec<bool>,
}

impl FileSink {
    /// Create (or truncate) the output file sized to `total_length`
    pub async fn create(path: impl AsRef<Path>, piece_length: u64, total_length: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Creating output file {} ({} bytes)", path.display(), total_length);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create directory '{}': {}", parent.display(), e);
                TorrentError::storage_error_full("Failed to create directory", parent.display().to_string(), e.to_string())
            })?;
        }

        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| {
                error!("Failed to create file '{}': {}", path.display(), e);
                TorrentError::storage_error_full("Failed to create file", path.display().to_string(), e.to_string())
            })?;
        file.set_len(total_length).await.map_err(|e| {
            error!("Failed to set file length for '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to set file length", path.display().to_string(), e.to_string())
        })?;

        let piece_count = if piece_length == 0 {
            0
        } else {
            total_length.div_ceil(piece_length) as usize
        };

        Ok(Self {
            path,
            file,
            piece_length,
            total_length,
            completed: vec![false; piece_count],
        })
    }

    /// Create a sink laid out for `metadata`
    pub async fn for_torrent(path: impl AsRef<Path>, metadata: &TorrentMetadata) -> Result<Self> {
        Self::create(path, metadata.piece_length, metadata.length).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn completed_count(&self) -> usize {
        self.completed.iter().filter(|&&done| done).count()
    }

    pub fn is_complete(&self) -> bool {
        self.completed.iter().all(|&done| done)
    }

    fn check_bounds(&self, piece_index: u32, len: usize) -> Result<u64> {
        let offset = piece_index as u64 * self.piece_length;
        let fits = (piece_index as usize) < self.completed.len()
            && len as u64 <= self.piece_length
            && offset + len as u64 <= self.total_length;
        if !fits {
            error!("Piece {} ({} bytes) does not fit in {}", piece_index, len, self.path.display());
            return Err(TorrentError::StorageError {
                message: format!("Piece {} ({} bytes) is out of range", piece_index, len),
                path: Some(self.path.display().to_string()),
                source: None,
            });
        }
        Ok(offset)
    }
}

#[async_trait]
impl PieceSink for FileSink {
    async fn write_piece(&mut self, piece_index: u32, data: Bytes) -> Result<()> {
        let offset = self.check_bounds(piece_index, data.len())?;
        debug!("Writing piece {} at offset {} ({} bytes)", piece_index, offset, data.len());

        let path = self.path.display().to_string();
        self.file
            .seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| TorrentError::storage_error_full("Failed to seek", path.clone(), e.to_string()))?;
        self.file
            .write_all(&data)
            .await
            .map_err(|e| TorrentError::storage_error_full("Failed to write piece", path.clone(), e.to_string()))?;

        self.completed[piece_index as usize] = true;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.file.flush().await.map_err(|e| {
            TorrentError::storage_error_full("Failed to flush file", self.path.display().to_string(), e.to_string())
        })?;
        self.file.sync_all().await.map_err(|e| {
            TorrentError::storage_error_full("Failed to sync file", self.path.display().to_string(), e.to_string())
        })?;
        info!(
            "Finished {} ({}/{} pieces)",
            self.path.display(),
            self.completed_count(),
            self.completed.len()
        );
        Ok(())
    }
}
