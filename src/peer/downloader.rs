//! Single-piece download over an established peer connection
//!
//! Drives one peer through interest, unchoke, block requests and block
//! collection. The stream must already be past the handshake.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, TorrentError};
use crate::peer::state::{Bitfield, DownloadState};
use crate::protocol::{read_message, write_message, Message, MessageId, PeerMessage};
use crate::storage::piece::PieceBuffer;

/// Downloads pieces one at a time from a single peer.
///
/// Owns the stream for its whole life. Any I/O or protocol error leaves the
/// downloader [`DownloadState::Failed`], after which it refuses further work.
#[derive(Debug)]
pub struct PieceDownloader<S> {
    stream: S,
    /// Whether we have told the peer we are interested
    interested: bool,
    /// Whether the peer is choking us
    choked: bool,
    bitfield: Bitfield,
    state: DownloadState,
    read_timeout: Option<Duration>,
}

impl<S> PieceDownloader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream that has completed the handshake
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            interested: false,
            choked: true,
            bitfield: Bitfield::default(),
            state: DownloadState::AwaitingBitfield,
            read_timeout: None,
        }
    }

    /// Fail any single read that takes longer than `read_timeout`
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    pub fn is_choked(&self) -> bool {
        self.choked
    }

    pub fn is_interested(&self) -> bool {
        self.interested
    }

    /// Pieces the peer has announced so far
    pub fn bitfield(&self) -> &Bitfield {
        &self.bitfield
    }

    /// Give the stream back, e.g. to close it
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Download one piece of `piece_length` bytes.
    ///
    /// Returns the blocks concatenated in offset order. The data is not hash
    /// checked here; see [`crate::storage::verify_piece`].
    pub async fn download(&mut self, piece_index: u32, piece_length: u32) -> Result<Vec<u8>> {
        if self.state.is_failed() {
            return Err(TorrentError::io_error(
                "Downloader has failed and cannot be reused",
                std::io::ErrorKind::NotConnected,
            ));
        }

        if piece_length == 0 {
            debug!("Piece {} is empty, nothing to request", piece_index);
            self.state = DownloadState::Complete;
            return Ok(Vec::new());
        }

        match self.run(piece_index, piece_length).await {
            Ok(data) => {
                self.state = DownloadState::Complete;
                info!("Downloaded piece {} ({} bytes)", piece_index, data.len());
                Ok(data)
            }
            Err(e) => {
                error!("Download of piece {} failed in state {}: {}", piece_index, self.state, e);
                self.state = DownloadState::Failed;
                Err(e)
            }
        }
    }

    async fn run(&mut self, piece_index: u32, piece_length: u32) -> Result<Vec<u8>> {
        if !self.interested {
            write_message(&mut self.stream, &Message::Interested).await?;
            self.interested = true;
        }
        self.state = DownloadState::Interested { choked: self.choked };

        while self.choked {
            let frame = self.next_frame().await?;
            match frame.message_id() {
                Some(MessageId::Unchoke) => {
                    debug!("Peer unchoked us");
                    self.choked = false;
                }
                Some(MessageId::Bitfield) | Some(MessageId::Have) => self.observe(frame),
                _ => trace!("Ignoring message id {} while choked", frame.id),
            }
        }

        self.state = DownloadState::RequestingBlocks;
        let mut buffer = PieceBuffer::new(piece_index, piece_length);
        for block in buffer.blocks() {
            write_message(
                &mut self.stream,
                &Message::Request {
                    index: block.piece_index,
                    begin: block.begin,
                    length: block.length,
                },
            )
            .await?;
        }
        debug!("Requested {} blocks of piece {}", buffer.expected(), piece_index);

        write_message(&mut self.stream, &Message::NotInterested).await?;
        self.interested = false;

        self.state = DownloadState::CollectingBlocks {
            received: 0,
            expected: buffer.expected(),
        };
        while !buffer.is_complete() {
            let frame = self.next_frame().await?;
            match frame.message_id() {
                Some(MessageId::Piece) => {
                    if let Message::Piece { index, begin, block } = Message::parse(frame)? {
                        if index != piece_index {
                            debug!("Discarding block for piece {} while fetching {}", index, piece_index);
                            continue;
                        }
                        buffer.insert(begin, block)?;
                    }
                }
                Some(MessageId::Choke) => {
                    warn!("Peer choked us mid-piece; waiting for outstanding blocks");
                    self.choked = true;
                }
                Some(MessageId::Unchoke) => self.choked = false,
                Some(MessageId::Bitfield) | Some(MessageId::Have) => self.observe(frame),
                _ => trace!("Ignoring message id {} while collecting", frame.id),
            }
            self.state = DownloadState::CollectingBlocks {
                received: buffer.received(),
                expected: buffer.expected(),
            };
        }

        buffer.assemble()
    }

    /// Record Bitfield and Have announcements. Malformed ones are dropped.
    fn observe(&mut self, frame: PeerMessage) {
        match Message::parse(frame) {
            Ok(Message::Bitfield { bitfield }) => {
                self.bitfield = Bitfield::new(bitfield.to_vec());
                debug!("Peer has {} pieces", self.bitfield.piece_count());
            }
            Ok(Message::Have { piece_index }) => {
                if self.bitfield.set_piece(piece_index as usize) {
                    trace!("Peer announced piece {}", piece_index);
                } else {
                    debug!("Ignoring Have for piece {} outside the peer's bitfield", piece_index);
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Dropping malformed announcement: {}", e),
        }
    }

    async fn next_frame(&mut self) -> Result<PeerMessage> {
        match self.read_timeout {
            Some(limit) => timeout(limit, read_message(&mut self.stream))
                .await
                .map_err(|_| {
                    error!("No message from peer within {:?}", limit);
                    TorrentError::io_error(
                        format!("No message from peer within {:?}", limit),
                        std::io::ErrorKind::TimedOut,
                    )
                })?,
            None => read_message(&mut self.stream).await,
        }
    }
}
