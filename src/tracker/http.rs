//! HTTP tracker client

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use super::announce::{parse_announce_response, AnnounceRequest, AnnounceResponse};
use super::PeerDiscovery;
use crate::error::{Result, TorrentError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Announces over HTTP(S) GET
#[derive(Debug, Clone)]
pub struct HttpTracker {
    client: Client,
    /// Port reported to the tracker
    port: u16,
}

impl HttpTracker {
    pub fn new(port: u16) -> Result<Self> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { client, port })
    }

    /// Send one announce and decode the reply
    pub async fn announce(&self, announce: &str, request: &AnnounceRequest) -> Result<AnnounceResponse> {
        let url = request.to_url(announce)?;
        debug!("Announcing to {}", announce);

        let response = self.client.get(&url).send().await.map_err(|e| {
            error!("Tracker request to {} failed: {}", announce, e);
            TorrentError::tracker_error_full("Tracker request failed", announce, e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            error!("Tracker {} answered HTTP {}", announce, status);
            return Err(TorrentError::tracker_error_full(
                "Tracker returned an error status",
                announce,
                status.to_string(),
            ));
        }

        let body = response.bytes().await?;
        parse_announce_response(&body).map_err(|e| e.with_context(announce.to_string()))
    }
}

#[async_trait]
impl PeerDiscovery for HttpTracker {
    async fn discover(
        &self,
        announce: &str,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        left: u64,
    ) -> Result<Vec<SocketAddr>> {
        let request = AnnounceRequest::new(info_hash, peer_id, self.port, left);
        let response = self.announce(announce, &request).await?;
        info!("Tracker {} returned {} peers", announce, response.peers.len());
        Ok(response.peers)
    }
}
