//! CLI configuration module
//!
//! Turns parsed arguments into validated client settings.

use std::time::Duration;

use crate::cli::args::CliArgs;
use crate::client::ClientConfig;
use crate::error::{Result, TorrentError};
use crate::protocol::Handshake;

/// Configuration for bitfetch
#[derive(Debug, Clone)]
pub struct Config {
    /// Our peer id
    pub peer_id: [u8; 20],
    /// Port reported to trackers
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Advertise extension protocol support
    pub extensions: bool,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let peer_id = match &args.peer_id {
            Some(text) => parse_peer_id(text)?,
            None => Handshake::generate_peer_id(),
        };

        Ok(Self {
            peer_id,
            port: args.port,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            read_timeout: Duration::from_secs(args.read_timeout),
            extensions: args.extensions,
            verbose: args.verbose,
            quiet: args.quiet,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("Port cannot be 0", "port"));
        }

        if self.connect_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field(
                "connect timeout must be at least 1 second",
                "connect_timeout",
            ));
        }

        if self.read_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field(
                "read timeout must be at least 1 second",
                "read_timeout",
            ));
        }

        if self.verbose && self.quiet {
            return Err(TorrentError::config_error_with_field(
                "--verbose and --quiet cannot be combined",
                "verbose",
            ));
        }

        Ok(())
    }

    /// Settings for the download client
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            peer_id: self.peer_id,
            port: self.port,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            extensions: self.extensions,
        }
    }
}

impl From<&Config> for ClientConfig {
    fn from(config: &Config) -> Self {
        config.client_config()
    }
}

/// Accept either 20 raw characters or 40 hex digits
fn parse_peer_id(text: &str) -> Result<[u8; 20]> {
    let mut peer_id = [0u8; 20];
    if text.len() == 20 {
        peer_id.copy_from_slice(text.as_bytes());
        return Ok(peer_id);
    }
    if text.len() == 40 {
        if let Ok(bytes) = hex::decode(text) {
            peer_id.copy_from_slice(&bytes);
            return Ok(peer_id);
        }
    }
    Err(TorrentError::config_error_with_field(
        format!("Peer id must be 20 bytes or 40 hex digits, got {:?}", text),
        "peer_id",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config_for(extra: &[&str]) -> Result<Config> {
        let mut argv = vec!["bitfetch"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["info", "test.torrent"]);
        Config::from_args(&CliArgs::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_config_from_args() {
        let config = config_for(&["--port", "6882", "--read-timeout", "5", "--extensions"]).unwrap();

        assert_eq!(config.port, 6882);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert!(config.extensions);
        assert_eq!(&config.peer_id[..8], b"-BF0001-");
        assert!(config.validate().is_ok());

        let client = ClientConfig::from(&config);
        assert_eq!(client.peer_id, config.peer_id);
        assert_eq!(client.port, 6882);
        assert!(client.extensions);
    }

    #[test]
    fn test_explicit_peer_id() {
        let config = config_for(&["--peer-id", "00112233445566778899"]).unwrap();
        assert_eq!(&config.peer_id, b"00112233445566778899");

        let hex_id = "2d4246303030312d000102030405060708090a0b";
        let config = config_for(&["--peer-id", hex_id]).unwrap();
        assert_eq!(&config.peer_id[..8], b"-BF0001-");
        assert_eq!(config.peer_id[19], 0x0b);

        assert!(matches!(
            config_for(&["--peer-id", "short"]),
            Err(TorrentError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(config_for(&["--port", "0"]).unwrap().validate().is_err());
        assert!(config_for(&["--connect-timeout", "0"]).unwrap().validate().is_err());
        assert!(config_for(&["--read-timeout", "0"]).unwrap().validate().is_err());
        assert!(config_for(&["-v", "-q"]).unwrap().validate().is_err());
    }
}
