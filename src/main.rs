//! bitfetch - Main entry point
//!
//! A minimal BitTorrent client: inspect torrents, talk to trackers and peers,
//! and download verified pieces.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use bitfetch::{
    bencode, CliArgs, Client, Command, Config, FileSink, TorrentMetadata, TorrentParser,
};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse_args();

    // Initialize logging
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args).context("Invalid configuration")?;
    config.validate().context("Invalid configuration")?;
    let client = Client::new(config.client_config());

    match args.command {
        Command::Decode { value } => {
            let decoded = bencode::decode_all(value.as_bytes())
                .with_context(|| format!("Failed to decode {:?}", value))?;
            println!("{}", serde_json::to_string(&decoded.to_json())?);
        }
        Command::Info { torrent, json } => {
            let metadata = load_torrent_file(&torrent)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&metadata.summary())?);
            } else {
                display_torrent_info(&metadata);
            }
        }
        Command::Peers { torrent } => {
            let metadata = load_torrent_file(&torrent)?;
            for peer in discover_peers(&client, &metadata).await? {
                println!("{}", peer);
            }
        }
        Command::Handshake { torrent, peer } => {
            let metadata = load_torrent_file(&torrent)?;
            let connection = client
                .connect(peer, &metadata)
                .await
                .with_context(|| format!("Handshake with {} failed", peer))?;
            println!("Peer ID: {}", hex::encode(connection.remote_peer_id));
        }
        Command::DownloadPiece { output, torrent, piece, peers } => {
            let metadata = load_torrent_file(&torrent)?;
            let peers = resolve_peers(&client, &metadata, peers).await?;
            let data = client
                .fetch_piece(&metadata, &peers, piece)
                .await
                .with_context(|| format!("Failed to download piece {}", piece))?;
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Piece {} downloaded to {}.", piece, output.display());
        }
        Command::Download { output, torrent, peers } => {
            let metadata = load_torrent_file(&torrent)?;
            let peers = resolve_peers(&client, &metadata, peers).await?;
            let mut sink = FileSink::for_torrent(&output, &metadata)
                .await
                .context("Failed to create output file")?;
            client
                .download(&metadata, &peers, &mut sink)
                .await
                .with_context(|| format!("Failed to download {}", metadata.name))?;
            println!("Downloaded {} to {}.", torrent.display(), output.display());
        }
    }

    Ok(())
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level {:?}", level);
}

/// Load and parse the torrent file
fn load_torrent_file(path: &Path) -> Result<TorrentMetadata> {
    let metadata = TorrentParser::parse_file(path)
        .map_err(|e| {
            error!("Failed to load torrent file '{}': {}", path.display(), e);
            e
        })
        .with_context(|| format!("Failed to load torrent file {}", path.display()))?;

    info!("Loaded torrent: {}", metadata.name);
    Ok(metadata)
}

/// Display torrent information
fn display_torrent_info(metadata: &TorrentMetadata) {
    println!("Tracker URL: {}", metadata.announce);
    println!("Length: {}", metadata.length);
    println!("Info Hash: {}", metadata.info_hash_hex());
    println!("Piece Length: {}", metadata.piece_length);
    println!("Piece Hashes:");
    for hash in &metadata.pieces {
        println!("{}", hex::encode(hash));
    }
}

/// Explicit peers win; otherwise ask the trackers
async fn resolve_peers(client: &Client, metadata: &TorrentMetadata, peers: Vec<SocketAddr>) -> Result<Vec<SocketAddr>> {
    if !peers.is_empty() {
        debug!("Using {} peers from the command line", peers.len());
        return Ok(peers);
    }
    discover_peers(client, metadata).await
}

#[cfg(feature = "tracker")]
async fn discover_peers(client: &Client, metadata: &TorrentMetadata) -> Result<Vec<SocketAddr>> {
    let tracker = bitfetch::HttpTracker::new(client.config().port)?;
    let peers = client
        .discover_peers(&tracker, metadata)
        .await
        .context("Failed to get peers from the trackers")?;
    info!("Found {} peers", peers.len());
    Ok(peers)
}

#[cfg(not(feature = "tracker"))]
async fn discover_peers(_client: &Client, _metadata: &TorrentMetadata) -> Result<Vec<SocketAddr>> {
    anyhow::bail!("Built without tracker support; pass peers with --peer")
}
