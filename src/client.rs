//! Download client
//!
//! Ties the pieces together: finds peers, connects, downloads and verifies
//! pieces, and hands them to a sink.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TorrentError};
use crate::peer::PeerConnection;
use crate::protocol::Handshake;
use crate::storage::{verify_piece, PieceSink};
use crate::torrent::TorrentMetadata;
use crate::tracker::PeerDiscovery;

/// Default port reported to trackers
pub const DEFAULT_PORT: u16 = 6881;

/// Default TCP connect deadline
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for any single read from a peer
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every connection a [`Client`] makes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Our 20-byte peer id
    pub peer_id: [u8; 20],
    /// Port reported to trackers; nothing listens on it
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Set the extension protocol bit in our handshake
    pub extensions: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peer_id: Handshake::generate_peer_id(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            extensions: false,
        }
    }
}

/// BitTorrent download client
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Ask each tracker in turn for peers; the first non-empty answer wins
    pub async fn discover_peers(
        &self,
        discovery: &dyn PeerDiscovery,
        metadata: &TorrentMetadata,
    ) -> Result<Vec<SocketAddr>> {
        let mut last_error = None;
        for announce in metadata.trackers() {
            match discovery
                .discover(announce, metadata.info_hash, self.config.peer_id, metadata.length)
                .await
            {
                Ok(peers) if !peers.is_empty() => return Ok(peers),
                Ok(_) => debug!("Tracker {} returned no peers", announce),
                Err(e) => {
                    warn!("Tracker {} failed: {}", announce, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| TorrentError::tracker_error("No tracker returned any peers")))
    }

    /// Connect and handshake with one peer
    pub async fn connect(&self, addr: SocketAddr, metadata: &TorrentMetadata) -> Result<PeerConnection> {
        PeerConnection::connect(addr, metadata.info_hash, &self.config).await
    }

    /// Download and verify one piece, trying `peers` in order.
    ///
    /// A peer that cannot be reached, breaks the protocol or sends a piece
    /// that fails its hash check is skipped. Other errors are returned as is.
    pub async fn fetch_piece(
        &self,
        metadata: &TorrentMetadata,
        peers: &[SocketAddr],
        piece_index: u32,
    ) -> Result<Vec<u8>> {
        let (size, expected) = piece_params(metadata, piece_index)?;

        let mut last_error = None;
        for &addr in peers {
            let attempt = async {
                let mut connection = self.connect(addr, metadata).await?;
                let data = connection.download_piece(piece_index, size).await?;
                verify_piece(piece_index, &data, &expected)?;
                Ok::<_, TorrentError>(data)
            };
            match attempt.await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_connection_fault() || e.is_integrity_failure() => {
                    warn!("Piece {} from {} failed: {}", piece_index, addr, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        error!("No peer delivered piece {}", piece_index);
        Err(last_error.unwrap_or_else(|| TorrentError::protocol_error("No peers to download from")))
    }

    /// Download every piece in order into `sink`.
    ///
    /// One connection is reused until it fails, then the next candidate in
    /// `peers` is tried. Each peer is attempted at most once.
    pub async fn download<S>(&self, metadata: &TorrentMetadata, peers: &[SocketAddr], sink: &mut S) -> Result<()>
    where
        S: PieceSink + ?Sized,
    {
        let piece_count = metadata.piece_count();
        info!("Downloading {} ({} pieces, {} bytes)", metadata.name, piece_count, metadata.length);

        let mut candidates = peers.iter().copied();
        let mut current: Option<PeerConnection> = None;
        let mut last_error = None;

        for index in 0..piece_count {
            let piece_index = u32::try_from(index)
                .map_err(|_| TorrentError::protocol_error(format!("Piece index {} out of range", index)))?;
            let (size, expected) = piece_params(metadata, piece_index)?;

            let data = loop {
                let mut connection = match current.take() {
                    Some(connection) => connection,
                    None => {
                        let Some(addr) = candidates.next() else {
                            error!("Ran out of peers at piece {}", piece_index);
                            return Err(last_error
                                .unwrap_or_else(|| TorrentError::protocol_error("No peers to download from")));
                        };
                        match self.connect(addr, metadata).await {
                            Ok(connection) => connection,
                            Err(e) => {
                                warn!("Skipping peer {}: {}", addr, e);
                                last_error = Some(e);
                                continue;
                            }
                        }
                    }
                };

                let result = match connection.download_piece(piece_index, size).await {
                    Ok(data) => verify_piece(piece_index, &data, &expected).map(|_| data),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(data) => {
                        current = Some(connection);
                        break data;
                    }
                    Err(e) if e.is_connection_fault() || e.is_integrity_failure() => {
                        warn!("Dropping peer {} after piece {} failed: {}", connection.addr, piece_index, e);
                        last_error = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            };

            sink.write_piece(piece_index, Bytes::from(data)).await?;
            info!("Piece {}/{} complete", index + 1, piece_count);
        }

        sink.finish().await?;
        info!("Download of {} complete", metadata.name);
        Ok(())
    }
}

/// Size and expected hash of a piece
fn piece_params(metadata: &TorrentMetadata, piece_index: u32) -> Result<(u32, [u8; 20])> {
    let index = piece_index as usize;
    let (Some(size), Some(hash)) = (metadata.piece_size(index), metadata.piece_hash(index)) else {
        return Err(TorrentError::config_error_with_field(
            format!("Piece {} does not exist; torrent has {}", piece_index, metadata.piece_count()),
            "piece_index",
        ));
    };
    let size = u32::try_from(size)
        .map_err(|_| TorrentError::parse_error(format!("Piece {} is {} bytes, too large", piece_index, size)))?;
    Ok((size, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(length: u64, piece_length: u64) -> TorrentMetadata {
        let count = length.div_ceil(piece_length) as usize;
        TorrentMetadata {
            announce: "http://tracker.example/announce".to_string(),
            announce_list: vec!["http://backup.example/announce".to_string()],
            name: "test.bin".to_string(),
            length,
            piece_length,
            pieces: vec![[0u8; 20]; count],
            info_hash: [1u8; 20],
        }
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 6881);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(&config.peer_id[..8], b"-BF0001-");
    }

    #[test]
    fn test_piece_params() {
        let meta = metadata(40000, 16384);
        assert_eq!(piece_params(&meta, 0).unwrap().0, 16384);
        assert_eq!(piece_params(&meta, 2).unwrap().0, 40000 - 2 * 16384);
        assert!(matches!(piece_params(&meta, 3), Err(TorrentError::ConfigError { .. })));
    }

    #[tokio::test]
    async fn test_fetch_piece_without_peers() {
        let client = Client::new(ClientConfig::default());
        let err = client.fetch_piece(&metadata(10, 10), &[], 0).await.unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
    }

    #[tokio::test]
    async fn test_discover_peers_falls_through_trackers() {
        use async_trait::async_trait;

        struct SecondTrackerOnly;

        #[async_trait]
        impl PeerDiscovery for SecondTrackerOnly {
            async fn discover(&self, announce: &str, _info_hash: [u8; 20], _peer_id: [u8; 20], left: u64) -> Result<Vec<SocketAddr>> {
                assert_eq!(left, 10);
                if announce.contains("backup") {
                    Ok(vec!["10.0.0.2:6881".parse().unwrap()])
                } else {
                    Err(TorrentError::tracker_error("down"))
                }
            }
        }

        let client = Client::new(ClientConfig::default());
        let peers = client.discover_peers(&SecondTrackerOnly, &metadata(10, 10)).await.unwrap();
        assert_eq!(peers, vec!["10.0.0.2:6881".parse::<SocketAddr>().unwrap()]);
    }
}
