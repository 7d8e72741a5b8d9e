//! Torrent file parser
//!
//! Handles parsing of .torrent files and extracting metadata.

use std::collections::BTreeMap;

use tracing::{debug, error, info, trace, warn};

use crate::bencode::{self, BencodeValue};
use crate::error::{Result, TorrentError};
use crate::torrent::info::TorrentMetadata;

/// Parser for .torrent files
pub struct TorrentParser;

type Dict = BTreeMap<Vec<u8>, BencodeValue>;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentMetadata> {
        info!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let (parsed, consumed) = bencode::decode(data)?;
        if consumed != data.len() {
            warn!("Parsed {}/{} bytes, ignoring trailing data", consumed, data.len());
        }

        let root = parsed
            .as_dict()
            .ok_or_else(|| wrong_type("torrent root", "dictionary", &parsed))?;

        let announce = required_str(root, "announce")?;

        let mut announce_list = Vec::new();
        if let Some(BencodeValue::List(tiers)) = root.get(b"announce-list".as_slice()) {
            for url in tiers.iter().filter_map(BencodeValue::as_list).flatten() {
                match url.as_str() {
                    Some(url) => announce_list.push(url.to_string()),
                    None => debug!("Skipping non-text announce-list entry"),
                }
            }
        }

        let info_value = root
            .get(b"info".as_slice())
            .ok_or_else(|| missing("info"))?;
        let info_dict = info_value
            .as_dict()
            .ok_or_else(|| wrong_type("info", "dictionary", info_value))?;

        let name = required_bytes(info_dict, "name")?;
        let name = String::from_utf8_lossy(name).into_owned();

        let length = required_int(info_dict, "length")?;
        let length = u64::try_from(length).map_err(|_| {
            TorrentError::parse_error_with_source("Invalid length", format!("negative value {}", length))
        })?;

        let piece_length = required_int(info_dict, "piece length")?;
        if piece_length <= 0 || piece_length > i64::from(u32::MAX) {
            return Err(TorrentError::parse_error_with_source(
                "Invalid piece length",
                format!("{} is outside 1..={}", piece_length, u32::MAX),
            ));
        }
        let piece_length = piece_length as u64;

        let pieces = TorrentMetadata::parse_piece_hashes(required_bytes(info_dict, "pieces")?)?;

        let expected_pieces = length.div_ceil(piece_length);
        if expected_pieces != pieces.len() as u64 {
            error!(
                "Piece count mismatch: length {} / piece length {} needs {} hashes, found {}",
                length, piece_length, expected_pieces, pieces.len()
            );
            return Err(TorrentError::parse_error_with_source(
                "Piece hash count does not match content length",
                format!("expected {}, found {}", expected_pieces, pieces.len()),
            ));
        }

        // Hash the info dict exactly as it appears in the file
        let span = bencode::dict_value_span(data, b"info")?;
        let info_hash = TorrentMetadata::sha1(&data[span]);
        debug!("Info hash: {}", hex::encode(info_hash));

        info!("Successfully parsed torrent: {} ({} bytes, {} pieces)", name, length, pieces.len());
        Ok(TorrentMetadata {
            announce,
            announce_list,
            name,
            length,
            piece_length,
            pieces,
            info_hash,
        })
    }

    /// Parse a .torrent file from a file path
    pub fn parse_file(path: &std::path::Path) -> Result<TorrentMetadata> {
        info!("Loading torrent file from: {}", path.display());

        let data = std::fs::read(path).map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }
}

fn missing(field: &str) -> TorrentError {
    TorrentError::parse_error_with_source("Missing required field", field.to_string())
}

fn wrong_type(field: &str, expected: &str, found: &BencodeValue) -> TorrentError {
    TorrentError::parse_error_with_source(
        "Field has the wrong type",
        format!("{}: expected {}, found {}", field, expected, found.type_name()),
    )
}

fn required<'a>(dict: &'a Dict, field: &str) -> Result<&'a BencodeValue> {
    dict.get(field.as_bytes()).ok_or_else(|| missing(field))
}

fn required_bytes<'a>(dict: &'a Dict, field: &str) -> Result<&'a [u8]> {
    let value = required(dict, field)?;
    value.as_bytes().ok_or_else(|| wrong_type(field, "byte string", value))
}

fn required_str(dict: &Dict, field: &str) -> Result<String> {
    let bytes = required_bytes(dict, field)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        TorrentError::parse_error_with_source(format!("Field {} is not valid UTF-8", field), e.to_string())
    })
}

fn required_int(dict: &Dict, field: &str) -> Result<i64> {
    let value = required(dict, field)?;
    value.as_int().ok_or_else(|| wrong_type(field, "integer", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::encode;

    fn build_torrent(info: BencodeValue) -> Vec<u8> {
        encode(&BencodeValue::dict([
            ("announce", BencodeValue::from("http://tracker.example.com/announce")),
            ("info", info),
        ]))
    }

    fn info_dict(length: i64, piece_length: i64, pieces: Vec<u8>) -> BencodeValue {
        BencodeValue::dict([
            ("length", BencodeValue::Integer(length)),
            ("name", BencodeValue::from("sample.txt")),
            ("piece length", BencodeValue::Integer(piece_length)),
            ("pieces", BencodeValue::Bytes(pieces)),
        ])
    }

    #[test]
    fn test_parse_single_file() {
        let info = info_dict(40000, 32768, vec![7u8; 40]);
        let data = build_torrent(info.clone());
        let meta = TorrentParser::parse_bytes(&data).unwrap();

        assert_eq!(meta.announce, "http://tracker.example.com/announce");
        assert_eq!(meta.name, "sample.txt");
        assert_eq!(meta.length, 40000);
        assert_eq!(meta.piece_length, 32768);
        assert_eq!(meta.pieces, vec![[7u8; 20], [7u8; 20]]);
        assert_eq!(meta.info_hash, TorrentMetadata::sha1(&encode(&info)));
    }

    #[test]
    fn test_info_hash_uses_original_bytes() {
        // info keys out of canonical order: a re-encode would sort them and hash differently
        let raw_info = format!(
            "d4:name4:file12:piece lengthi16e6:pieces20:{}6:lengthi10ee",
            "a".repeat(20)
        );
        let data = format!("d8:announce9:http://t/4:info{}e", raw_info);
        let meta = TorrentParser::parse_bytes(data.as_bytes()).unwrap();

        assert_eq!(meta.info_hash, TorrentMetadata::sha1(raw_info.as_bytes()));
        let (decoded, _) = bencode::decode(raw_info.as_bytes()).unwrap();
        assert_ne!(meta.info_hash, TorrentMetadata::sha1(&encode(&decoded)));
    }

    #[test]
    fn test_parse_announce_list() {
        let data = encode(&BencodeValue::dict([
            ("announce", BencodeValue::from("http://a/announce")),
            (
                "announce-list",
                BencodeValue::List(vec![
                    BencodeValue::List(vec!["http://a/announce".into()]),
                    BencodeValue::List(vec!["http://b/announce".into(), "udp://c:80".into()]),
                ]),
            ),
            ("info", info_dict(10, 16, vec![0u8; 20])),
        ]));
        let meta = TorrentParser::parse_bytes(&data).unwrap();
        assert_eq!(meta.trackers(), vec!["http://a/announce", "http://b/announce", "udp://c:80"]);
    }

    #[test]
    fn test_missing_announce() {
        let data = encode(&BencodeValue::dict([("info", info_dict(10, 16, vec![0u8; 20]))]));
        let err = TorrentParser::parse_bytes(&data).unwrap_err();
        assert!(matches!(err, TorrentError::ParseError { .. }));
        assert!(err.to_string().contains("announce"));
    }

    #[test]
    fn test_missing_info_field() {
        let info = BencodeValue::dict([
            ("length", BencodeValue::Integer(10)),
            ("name", BencodeValue::from("x")),
            ("pieces", BencodeValue::Bytes(vec![0u8; 20])),
        ]);
        let err = TorrentParser::parse_bytes(&build_torrent(info)).unwrap_err();
        assert!(err.to_string().contains("piece length"));
    }

    #[test]
    fn test_wrong_field_type() {
        let info = BencodeValue::dict([
            ("length", BencodeValue::from("ten")),
            ("name", BencodeValue::from("x")),
            ("piece length", BencodeValue::Integer(16)),
            ("pieces", BencodeValue::Bytes(vec![0u8; 20])),
        ]);
        let err = TorrentParser::parse_bytes(&build_torrent(info)).unwrap_err();
        assert!(matches!(err, TorrentError::ParseError { .. }));
        assert!(err.to_string().contains("length"));
    }

    #[test]
    fn test_info_not_a_dict() {
        let err = TorrentParser::parse_bytes(&build_torrent(BencodeValue::Integer(1))).unwrap_err();
        assert!(matches!(err, TorrentError::ParseError { .. }));
    }

    #[test]
    fn test_root_not_a_dict() {
        assert!(TorrentParser::parse_bytes(b"l4:spame").is_err());
    }

    #[test]
    fn test_pieces_not_multiple_of_20() {
        let data = build_torrent(info_dict(10, 16, vec![0u8; 19]));
        assert!(TorrentParser::parse_bytes(&data).is_err());
    }

    #[test]
    fn test_piece_count_mismatch() {
        // 40000 bytes at 16384 per piece needs 3 hashes
        let data = build_torrent(info_dict(40000, 16384, vec![0u8; 40]));
        assert!(TorrentParser::parse_bytes(&data).is_err());
    }

    #[test]
    fn test_invalid_piece_length() {
        assert!(TorrentParser::parse_bytes(&build_torrent(info_dict(0, 0, vec![]))).is_err());
        assert!(TorrentParser::parse_bytes(&build_torrent(info_dict(-1, 16, vec![]))).is_err());
    }

    #[test]
    fn test_empty_content() {
        let meta = TorrentParser::parse_bytes(&build_torrent(info_dict(0, 16, vec![]))).unwrap();
        assert_eq!(meta.piece_count(), 0);
    }
}
