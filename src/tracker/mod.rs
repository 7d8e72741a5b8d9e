//! Tracker module
//!
//! Peer discovery through HTTP tracker announces.

pub mod announce;
#[cfg(feature = "tracker")]
pub mod http;

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::Result;

pub use announce::{parse_announce_response, parse_compact_peers, AnnounceRequest, AnnounceResponse};
#[cfg(feature = "tracker")]
pub use http::HttpTracker;

/// Source of peer addresses for a torrent
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    /// Ask `announce` for peers sharing `info_hash`
    async fn discover(
        &self,
        announce: &str,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        left: u64,
    ) -> Result<Vec<SocketAddr>>;
}

/// A fixed peer list, for when addresses are already known
#[derive(Debug, Clone, Default)]
pub struct StaticPeers(pub Vec<SocketAddr>);

#[async_trait]
impl PeerDiscovery for StaticPeers {
    async fn discover(
        &self,
        _announce: &str,
        _info_hash: [u8; 20],
        _peer_id: [u8; 20],
        _left: u64,
    ) -> Result<Vec<SocketAddr>> {
        Ok(self.0.clone())
    }
}
