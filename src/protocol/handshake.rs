//! BitTorrent handshake protocol
//!
//! Handles the initial 68-byte exchange between peers.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, TorrentError};

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Total size of a handshake on the wire
pub const HANDSHAKE_LENGTH: usize = 68;

/// Reserved-field bit advertising extension protocol support (bit 20 of the
/// big-endian 64-bit field, i.e. byte 5 mask 0x10)
pub const EXTENSION_BIT: u64 = 1 << 20;

/// BitTorrent handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Reserved/extension flags
    pub reserved: [u8; 8],
    /// Torrent info hash
    pub info_hash: [u8; 20],
    /// Sender's peer ID
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create a new handshake with info_hash and peer_id
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        debug!("Creating new handshake for info_hash: {}", hex::encode(info_hash));
        Self {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// Create a new handshake advertising extension protocol support
    pub fn with_extensions(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        debug!("Creating handshake with extension bit set");
        Self {
            reserved: EXTENSION_BIT.to_be_bytes(),
            info_hash,
            peer_id,
        }
    }

    /// Generate a random peer ID with "-BF0001-" prefix
    pub fn generate_peer_id() -> [u8; 20] {
        let mut peer_id = [0u8; 20];
        peer_id[0..8].copy_from_slice(b"-BF0001-");
        peer_id[8..].copy_from_slice(&rand::random::<[u8; 12]>());
        info!("Generated new peer ID: {}", hex::encode(peer_id));
        peer_id
    }

    /// Whether the sender set the extension protocol bit
    pub fn supports_extensions(&self) -> bool {
        u64::from_be_bytes(self.reserved) & EXTENSION_BIT != 0
    }

    /// Serialize the handshake to bytes
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing handshake");
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LENGTH);
        buf.put_u8(PROTOCOL_LENGTH);
        buf.put_slice(PROTOCOL_STRING.as_bytes());
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.to_vec()
    }

    /// Deserialize a handshake from bytes
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        trace!("Deserializing handshake from {} bytes", data.len());

        if data.len() < HANDSHAKE_LENGTH {
            error!("Handshake data too short: expected {} bytes, got {}", HANDSHAKE_LENGTH, data.len());
            return Err(TorrentError::protocol_error_with_source(
                "Handshake data too short",
                format!("expected {} bytes, got {}", HANDSHAKE_LENGTH, data.len()),
            ));
        }

        if data[0] != PROTOCOL_LENGTH {
            error!("Invalid protocol length: expected {}, got {}", PROTOCOL_LENGTH, data[0]);
            return Err(TorrentError::protocol_error_with_source(
                "Invalid protocol length",
                format!("expected {}, got {}", PROTOCOL_LENGTH, data[0]),
            ));
        }

        if &data[1..20] != PROTOCOL_STRING.as_bytes() {
            error!("Invalid protocol string: {:?}", String::from_utf8_lossy(&data[1..20]));
            return Err(TorrentError::protocol_error_with_source(
                "Invalid protocol string",
                String::from_utf8_lossy(&data[1..20]).into_owned(),
            ));
        }

        let mut handshake = Self::new([0u8; 20], [0u8; 20]);
        handshake.reserved.copy_from_slice(&data[20..28]);
        handshake.info_hash.copy_from_slice(&data[28..48]);
        handshake.peer_id.copy_from_slice(&data[48..68]);
        debug!("Handshake peer_id: {}", hex::encode(handshake.peer_id));
        Ok(handshake)
    }

    /// Check the remote's echoed info hash against ours
    pub fn matches_info_hash(&self, expected_info_hash: &[u8; 20]) -> bool {
        if self.info_hash != *expected_info_hash {
            warn!("Handshake info hash mismatch");
            warn!("  Expected: {}", hex::encode(expected_info_hash));
            warn!("  Got:      {}", hex::encode(self.info_hash));
            return false;
        }
        true
    }

    /// Send our handshake and read the remote's, returning it whole.
    ///
    /// Only the protocol length and name are validated; the echoed info hash
    /// and reserved bits are left for the caller to inspect.
    pub async fn exchange<S>(
        stream: &mut S,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        extensions_requested: bool,
    ) -> Result<Handshake>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let ours = if extensions_requested {
            Self::with_extensions(info_hash, peer_id)
        } else {
            Self::new(info_hash, peer_id)
        };

        stream.write_all(&ours.serialize()).await.map_err(|e| {
            error!("Failed to send handshake: {}", e);
            TorrentError::io_error_with_source("Failed to send handshake", &e)
        })?;
        stream
            .flush()
            .await
            .map_err(|e| TorrentError::io_error_with_source("Failed to send handshake", &e))?;

        let mut response = [0u8; HANDSHAKE_LENGTH];
        stream.read_exact(&mut response).await.map_err(|e| {
            error!("Failed to read handshake response: {}", e);
            TorrentError::io_error_with_source("Failed to read handshake response", &e)
        })?;

        let theirs = Self::deserialize(&response)?;
        info!("Handshake completed with peer {}", hex::encode(theirs.peer_id));
        Ok(theirs)
    }

    /// Perform the handshake and return the remote peer id
    pub async fn perform<S>(
        stream: &mut S,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        extensions_requested: bool,
    ) -> Result<[u8; 20]>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        Self::exchange(stream, info_hash, peer_id, extensions_requested)
            .await
            .map(|remote| remote.peer_id)
    }
}
