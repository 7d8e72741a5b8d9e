//! bitfetch
//!
//! A minimal BitTorrent client: bencode codec, torrent metadata, the peer
//! handshake and wire protocol, and verified single-peer piece downloads.

pub mod bencode;
pub mod cli;
pub mod client;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod torrent;
pub mod tracker;

pub use error::{Result, TorrentError};

pub use bencode::{decode, decode_all, encode, BencodeValue};
pub use cli::{CliArgs, Command, Config};
pub use client::{Client, ClientConfig};
pub use peer::{Bitfield, DownloadState, PeerConnection, PieceDownloader};
pub use protocol::{read_message, write_message, Handshake, Message, MessageId, PeerMessage};
pub use storage::{verify_piece, FileSink, MemorySink, PieceBuffer, PieceSink};
pub use torrent::{TorrentMetadata, TorrentParser};
#[cfg(feature = "tracker")]
pub use tracker::HttpTracker;
pub use tracker::{AnnounceRequest, AnnounceResponse, PeerDiscovery};
