//! Peer connection module
//!
//! A TCP connection to one peer, past the handshake and ready to download.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::client::ClientConfig;
use crate::error::{Result, TorrentError};
use crate::peer::downloader::PieceDownloader;
use crate::peer::state::{Bitfield, DownloadState};
use crate::protocol::Handshake;

/// Represents a connected peer
#[derive(Debug)]
pub struct PeerConnection {
    /// Remote address
    pub addr: SocketAddr,
    /// Peer id the remote sent in its handshake
    pub remote_peer_id: [u8; 20],
    /// Whether the remote advertised extension protocol support
    pub supports_extensions: bool,
    downloader: PieceDownloader<TcpStream>,
}

impl PeerConnection {
    /// Connect to a peer and perform the handshake for `info_hash`
    pub async fn connect(addr: SocketAddr, info_hash: [u8; 20], config: &ClientConfig) -> Result<Self> {
        info!("Connecting to peer: {}", addr);

        let mut stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                warn!("Connection timeout to {}", addr);
                TorrentError::io_error(format!("Connection to {} timed out", addr), std::io::ErrorKind::TimedOut)
            })?
            .map_err(|e| {
                error!("Failed to connect to {}: {}", addr, e);
                TorrentError::io_error_with_source(format!("Failed to connect to {}", addr), &e)
            })?;
        debug!("Connected to peer: {}", addr);

        let handshake = timeout(
            config.read_timeout,
            Handshake::exchange(&mut stream, info_hash, config.peer_id, config.extensions),
        )
        .await
        .map_err(|_| {
            warn!("Handshake timeout with {}", addr);
            TorrentError::io_error(format!("Handshake with {} timed out", addr), std::io::ErrorKind::TimedOut)
        })?
        .map_err(|e| e.with_context(format!("peer {}", addr)))?;

        // mismatches are reported but not fatal; the piece hash check catches bad data
        handshake.matches_info_hash(&info_hash);

        info!("Handshake completed with peer {} ({})", addr, hex::encode(handshake.peer_id));
        Ok(Self {
            addr,
            remote_peer_id: handshake.peer_id,
            supports_extensions: handshake.supports_extensions(),
            downloader: PieceDownloader::new(stream).with_read_timeout(config.read_timeout),
        })
    }

    /// Download one piece of `piece_length` bytes, unverified
    pub async fn download_piece(&mut self, piece_index: u32, piece_length: u32) -> Result<Vec<u8>> {
        debug!("Downloading piece {} ({} bytes) from {}", piece_index, piece_length, self.addr);
        self.downloader
            .download(piece_index, piece_length)
            .await
            .map_err(|e| e.with_context(format!("peer {}", self.addr)))
    }

    /// Pieces the peer has announced so far
    pub fn bitfield(&self) -> &Bitfield {
        self.downloader.bitfield()
    }

    pub fn state(&self) -> DownloadState {
        self.downloader.state()
    }

    /// Whether this connection can still be used
    pub fn is_usable(&self) -> bool {
        !self.downloader.state().is_failed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{read_message, write_message, Message, HANDSHAKE_LENGTH};
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_config() -> ClientConfig {
        ClientConfig {
            peer_id: [0x11u8; 20],
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connect_and_download_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let info_hash = [0x22u8; 20];

        let peer = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = [0u8; HANDSHAKE_LENGTH];
            socket.read_exact(&mut received).await.unwrap();
            let reply = Handshake::with_extensions(info_hash, [0x33u8; 20]).serialize();
            socket.write_all(&reply).await.unwrap();

            write_message(&mut socket, &Message::Bitfield { bitfield: Bytes::from_static(&[0x40]) })
                .await
                .unwrap();
            write_message(&mut socket, &Message::Unchoke).await.unwrap();
            loop {
                let frame = read_message(&mut socket).await.unwrap();
                if let Message::Request { index, begin, length } = Message::parse(frame).unwrap() {
                    let block = Bytes::from(vec![0xabu8; length as usize]);
                    write_message(&mut socket, &Message::Piece { index, begin, block })
                        .await
                        .unwrap();
                    break;
                }
            }
            socket
        });

        let mut connection = PeerConnection::connect(addr, info_hash, &test_config()).await.unwrap();
        assert_eq!(connection.remote_peer_id, [0x33u8; 20]);
        assert!(connection.supports_extensions);

        let data = connection.download_piece(1, 64).await.unwrap();
        assert_eq!(data, vec![0xabu8; 64]);
        assert!(connection.bitfield().has_piece(1));
        assert_eq!(connection.state(), DownloadState::Complete);
        assert!(connection.is_usable());
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = PeerConnection::connect(addr, [0u8; 20], &test_config()).await.unwrap_err();
        assert!(err.is_connection_fault());
        assert!(err.io_kind().is_some());
    }
}
