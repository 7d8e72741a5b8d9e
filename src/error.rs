//! Error types for bitfetch
//!
//! Every fallible operation in the library returns [`Result`], whose error is a
//! [`TorrentError`]. The variants separate malformed input, peers that break
//! the wire protocol, transport failures and pieces that fail their hash check,
//! so a caller can pick a different peer for one and give up on another.

use std::fmt;
use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, TorrentError>;

/// Error type for torrent operations
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Malformed bencoding or metadata with missing/mistyped fields
    ParseError {
        message: String,
        source: Option<String>,
    },

    /// Peer sent something the wire protocol does not allow
    ProtocolError {
        message: String,
        source: Option<String>,
    },

    /// Transport failure: short read/write, reset, premature EOF, timeout
    IoError {
        message: String,
        kind: io::ErrorKind,
        source: Option<String>,
    },

    /// Assembled piece does not hash to the expected value
    IntegrityError {
        piece_index: u32,
        expected: [u8; 20],
        actual: [u8; 20],
    },

    /// Tracker request or response errors
    TrackerError {
        message: String,
        url: Option<String>,
        source: Option<String>,
    },

    /// Persistence sink errors
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },
}

impl TorrentError {
    /// Create a new ParseError
    pub fn parse_error(message: impl Into<String>) -> Self {
        TorrentError::ParseError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ParseError with source
    pub fn parse_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::ParseError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ProtocolError with source
    pub fn protocol_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new IoError of the given kind
    pub fn io_error(message: impl Into<String>, kind: io::ErrorKind) -> Self {
        TorrentError::IoError {
            message: message.into(),
            kind,
            source: None,
        }
    }

    /// Wrap a `std::io::Error` with a message describing what was being done
    pub fn io_error_with_source(message: impl Into<String>, err: &io::Error) -> Self {
        TorrentError::IoError {
            message: message.into(),
            kind: err.kind(),
            source: Some(err.to_string()),
        }
    }

    /// Create a new IntegrityError
    pub fn integrity_error(piece_index: u32, expected: [u8; 20], actual: [u8; 20]) -> Self {
        TorrentError::IntegrityError {
            piece_index,
            expected,
            actual,
        }
    }

    /// Create a new TrackerError
    pub fn tracker_error(message: impl Into<String>) -> Self {
        TorrentError::TrackerError {
            message: message.into(),
            url: None,
            source: None,
        }
    }

    /// Create a new TrackerError with url and source
    pub fn tracker_error_full(message: impl Into<String>, url: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::TrackerError {
            message: message.into(),
            url: Some(url.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// True when the piece arrived intact on the wire but hashed wrong.
    ///
    /// The connection itself is still usable; the piece should be discarded
    /// and requested again, usually from a different peer.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, TorrentError::IntegrityError { .. })
    }

    /// True when the connection to the peer should be considered unusable
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, TorrentError::IoError { .. } | TorrentError::ProtocolError { .. })
    }

    /// Underlying I/O error kind, if this is an IoError
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            TorrentError::IoError { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        let chain = |source: &mut Option<String>| {
            *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
        };
        match &mut self {
            TorrentError::ParseError { source, .. }
            | TorrentError::ProtocolError { source, .. }
            | TorrentError::IoError { source, .. }
            | TorrentError::TrackerError { source, .. }
            | TorrentError::StorageError { source, .. } => chain(source),
            TorrentError::IntegrityError { .. } | TorrentError::ConfigError { .. } => {}
        }
        self
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::ParseError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Parse error: {} (source: {})", message, src)
                } else {
                    write!(f, "Parse error: {}", message)
                }
            }
            TorrentError::ProtocolError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Protocol error: {} (source: {})", message, src)
                } else {
                    write!(f, "Protocol error: {}", message)
                }
            }
            TorrentError::IoError { message, kind, source } => {
                if let Some(src) = source {
                    write!(f, "I/O error: {} [{:?}] (source: {})", message, kind, src)
                } else {
                    write!(f, "I/O error: {} [{:?}]", message, kind)
                }
            }
            TorrentError::IntegrityError { piece_index, expected, actual } => {
                write!(
                    f,
                    "Integrity error: piece {} hashed to {} but {} was expected",
                    piece_index,
                    hex::encode(actual),
                    hex::encode(expected)
                )
            }
            TorrentError::TrackerError { message, url, source } => {
                match (url, source) {
                    (Some(u), Some(s)) => write!(f, "Tracker error: {} (url: {}, source: {})", message, u, s),
                    (Some(u), None) => write!(f, "Tracker error: {} (url: {})", message, u),
                    (None, Some(s)) => write!(f, "Tracker error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Tracker error: {}", message),
                }
            }
            TorrentError::StorageError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Storage error: {}", message),
                }
            }
            TorrentError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for TorrentError {}

impl From<io::Error> for TorrentError {
    fn from(err: io::Error) -> Self {
        TorrentError::io_error_with_source("I/O operation failed", &err)
    }
}

impl From<url::ParseError> for TorrentError {
    fn from(err: url::ParseError) -> Self {
        TorrentError::TrackerError {
            message: "Invalid announce URL".to_string(),
            url: None,
            source: Some(err.to_string()),
        }
    }
}

#[cfg(feature = "tracker")]
impl From<reqwest::Error> for TorrentError {
    fn from(err: reqwest::Error) -> Self {
        TorrentError::TrackerError {
            message: "Tracker request failed".to_string(),
            url: err.url().map(|u| u.to_string()),
            source: Some(err.to_string()),
        }
    }
}
