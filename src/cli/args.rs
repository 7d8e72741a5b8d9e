//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI arguments for bitfetch
#[derive(Debug, Parser)]
#[command(name = "bitfetch")]
#[command(about = "A minimal BitTorrent client", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Peer id to use: 20 characters or 40 hex digits (random if omitted)
    #[arg(long, global = true, value_name = "ID")]
    pub peer_id: Option<String>,

    /// Port reported to trackers
    #[arg(long, global = true, default_value_t = 6881)]
    pub port: u16,

    /// TCP connect timeout in seconds
    #[arg(long, global = true, default_value_t = 10, value_name = "SECS")]
    pub connect_timeout: u64,

    /// Per-read timeout in seconds
    #[arg(long, global = true, default_value_t = 30, value_name = "SECS")]
    pub read_timeout: u64,

    /// Advertise extension protocol support in the handshake
    #[arg(long, global = true)]
    pub extensions: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode {
        /// Bencoded input, e.g. "l5:helloi52ee"
        value: String,
    },

    /// Print a torrent's metadata
    Info {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask the torrent's trackers for peers
    Peers {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
    },

    /// Handshake with one peer and print its peer id
    Handshake {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        /// Peer address, e.g. 127.0.0.1:6881
        peer: SocketAddr,
    },

    /// Download and verify a single piece
    #[command(name = "download-piece")]
    DownloadPiece {
        /// Where to write the piece
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        piece: u32,
        /// Use this peer instead of asking the trackers (repeatable)
        #[arg(long = "peer", value_name = "ADDR")]
        peers: Vec<SocketAddr>,
    },

    /// Download the whole file
    Download {
        /// Where to write the file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        /// Use this peer instead of asking the trackers (repeatable)
        #[arg(long = "peer", value_name = "ADDR")]
        peers: Vec<SocketAddr>,
    },
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
