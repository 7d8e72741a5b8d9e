//! Peer module
//!
//! Connections to remote peers and the per-connection piece download state
//! machine.

pub mod connection;
pub mod downloader;
pub mod state;

// Re-export main types
pub use connection::PeerConnection;
pub use downloader::PieceDownloader;
pub use state::{Bitfield, DownloadState};
