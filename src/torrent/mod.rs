//! Torrent file handling module
//!
//! This module provides functionality for parsing .torrent files into
//! [`TorrentMetadata`].

pub mod info;
pub mod parser;

pub use info::{TorrentMetadata, TorrentSummary, HASH_LENGTH};
pub use parser::TorrentParser;
