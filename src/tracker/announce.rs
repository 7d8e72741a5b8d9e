//! Tracker announce request and response
//!
//! Builds the HTTP GET announce URL and decodes the bencoded reply into a
//! list of peer addresses.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::{debug, error, warn};

use crate::bencode::{self, BencodeValue};
use crate::error::{Result, TorrentError};

/// Size of one compact IPv4 peer record
pub const COMPACT_PEER_LENGTH: usize = 6;

/// Parameters of one announce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    /// Bytes still needed
    pub left: u64,
}

impl AnnounceRequest {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left,
        }
    }

    /// Full GET URL for `announce`, asking for the compact peer format
    pub fn to_url(&self, announce: &str) -> Result<String> {
        let parsed = url::Url::parse(announce)?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(TorrentError::TrackerError {
                message: format!("Unsupported tracker scheme '{}'", parsed.scheme()),
                url: Some(announce.to_string()),
                source: None,
            });
        }

        let separator = if parsed.query().is_some() { '&' } else { '?' };
        Ok(format!(
            "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            announce,
            separator,
            urlencoding::encode_binary(&self.info_hash),
            urlencoding::encode_binary(&self.peer_id),
            self.port,
            self.uploaded,
            self.downloaded,
            self.left
        ))
    }
}

/// Decoded announce reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    /// Seconds the tracker wants between announces
    pub interval: u32,
    pub peers: Vec<SocketAddr>,
    pub complete: Option<u32>,
    pub incomplete: Option<u32>,
    pub warning_message: Option<String>,
}

/// Decode a tracker's bencoded announce reply
pub fn parse_announce_response(data: &[u8]) -> Result<AnnounceResponse> {
    let value = bencode::decode_all(data)
        .map_err(|e| TorrentError::tracker_error(format!("Undecodable tracker response: {}", e)))?;
    let dict = value
        .as_dict()
        .ok_or_else(|| TorrentError::tracker_error("Tracker response is not a dictionary"))?;

    if let Some(reason) = dict.get(b"failure reason".as_slice()) {
        let reason = String::from_utf8_lossy(reason.as_bytes().unwrap_or_default()).into_owned();
        error!("Tracker refused announce: {}", reason);
        return Err(TorrentError::tracker_error(format!("Tracker failure: {}", reason)));
    }

    let interval = dict
        .get(b"interval".as_slice())
        .and_then(BencodeValue::as_int)
        .ok_or_else(|| TorrentError::tracker_error("Tracker response missing 'interval'"))?;
    let interval = u32::try_from(interval)
        .map_err(|_| TorrentError::tracker_error(format!("Invalid tracker interval {}", interval)))?;

    let peers = match dict.get(b"peers".as_slice()) {
        Some(BencodeValue::Bytes(compact)) => parse_compact_peers(compact)?,
        Some(BencodeValue::List(entries)) => parse_peer_dicts(entries),
        Some(other) => {
            return Err(TorrentError::tracker_error(format!(
                "Tracker 'peers' has unexpected type {}",
                other.type_name()
            )))
        }
        None => Vec::new(),
    };

    let count = |key: &[u8]| {
        dict.get(key)
            .and_then(BencodeValue::as_int)
            .and_then(|n| u32::try_from(n).ok())
    };

    let warning_message = dict
        .get(b"warning message".as_slice())
        .and_then(BencodeValue::as_bytes)
        .map(|w| String::from_utf8_lossy(w).into_owned());
    if let Some(warning) = &warning_message {
        warn!("Tracker warning: {}", warning);
    }

    debug!("Tracker returned {} peers, interval {}s", peers.len(), interval);
    Ok(AnnounceResponse {
        interval,
        peers,
        complete: count(b"complete".as_slice()),
        incomplete: count(b"incomplete".as_slice()),
        warning_message,
    })
}

/// Split a compact peer string into IPv4 addresses
pub fn parse_compact_peers(data: &[u8]) -> Result<Vec<SocketAddr>> {
    if data.len() % COMPACT_PEER_LENGTH != 0 {
        return Err(TorrentError::tracker_error(format!(
            "Compact peers length {} is not a multiple of {}",
            data.len(),
            COMPACT_PEER_LENGTH
        )));
    }

    Ok(data
        .chunks_exact(COMPACT_PEER_LENGTH)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect())
}

fn parse_peer_dicts(entries: &[BencodeValue]) -> Vec<SocketAddr> {
    entries
        .iter()
        .filter_map(|entry| {
            let ip = entry.get(b"ip")?.as_str()?.parse::<IpAddr>().ok()?;
            let port = u16::try_from(entry.get(b"port")?.as_int()?).ok()?;
            Some(SocketAddr::new(ip, port))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announce_url() {
        let mut info_hash = [0u8; 20];
        info_hash[0] = 0xd6;
        info_hash[1] = b'A';
        let request = AnnounceRequest::new(info_hash, *b"-BF0001-abcdefghijkl", 6881, 92063);
        let url = request.to_url("http://tracker.example/announce").unwrap();

        assert!(url.starts_with("http://tracker.example/announce?info_hash=%D6A%00%00"));
        assert!(url.contains("&peer_id=-BF0001-abcdefghijkl&"));
        assert!(url.contains("&port=6881&uploaded=0&downloaded=0&left=92063&compact=1"));
    }

    #[test]
    fn test_announce_url_keeps_existing_query() {
        let request = AnnounceRequest::new([0u8; 20], [0u8; 20], 6881, 1);
        let url = request.to_url("https://tracker.example/announce?key=abc").unwrap();
        assert!(url.starts_with("https://tracker.example/announce?key=abc&info_hash="));
    }

    #[test]
    fn test_announce_url_rejects_udp() {
        let request = AnnounceRequest::new([0u8; 20], [0u8; 20], 6881, 1);
        let err = request.to_url("udp://tracker.example:80").unwrap_err();
        assert!(matches!(err, TorrentError::TrackerError { .. }));
    }

    #[test]
    fn test_parse_compact_response() {
        let data = b"d8:completei3e8:intervali900e5:peers12:\xa5\xe8\x21\x4d\xc9\x0b\xb2\x3e\x55\xc6\xc8\xd5e";
        let response = parse_announce_response(data).unwrap();
        assert_eq!(response.interval, 900);
        assert_eq!(response.complete, Some(3));
        assert_eq!(
            response.peers,
            vec![
                "165.232.33.77:51467".parse().unwrap(),
                "178.62.85.198:51413".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn test_parse_dict_peers() {
        let data = b"d8:intervali60e5:peersld2:ip9:127.0.0.14:porti6881eed2:ip3:bad4:porti1eeee";
        let response = parse_announce_response(data).unwrap();
        assert_eq!(response.peers, vec!["127.0.0.1:6881".parse().unwrap()]);
    }

    #[test]
    fn test_failure_reason() {
        let err = parse_announce_response(b"d14:failure reason12:unregisterede").unwrap_err();
        assert!(err.to_string().contains("unregistered"));
    }

    #[test]
    fn test_missing_interval_and_bad_compact_length() {
        assert!(parse_announce_response(b"d5:peers0:e").is_err());
        assert!(parse_announce_response(b"d8:intervali1e5:peers5:abcdee").is_err());
        assert!(parse_announce_response(b"i1e").is_err());
    }
}
