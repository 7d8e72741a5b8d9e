//! Wire framing
//!
//! Every message after the handshake is a 4-byte big-endian length followed
//! by that many bytes: an id byte and the payload. A zero length is a
//! keep-alive.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, trace};

use super::message::{Message, PeerMessage};
use crate::error::{Result, TorrentError};

/// Largest frame accepted from a peer. A 16 KiB block is far below this; the
/// limit exists so a corrupt length prefix cannot trigger a huge allocation.
pub const MAX_MESSAGE_LENGTH: u32 = 4 * 1024 * 1024;

/// Read the next non-keep-alive frame.
///
/// Keep-alives are consumed silently. The stream ending anywhere inside a
/// frame is an IoError.
pub async fn read_message<R>(reader: &mut R) -> Result<PeerMessage>
where
    R: AsyncRead + Unpin,
{
    let length = loop {
        let length = reader.read_u32().await.map_err(|e| {
            TorrentError::io_error_with_source("Failed to read message length", &e)
        })?;
        if length != 0 {
            break length;
        }
        trace!("Received KeepAlive");
    };

    if length > MAX_MESSAGE_LENGTH {
        error!("Message length {} exceeds limit {}", length, MAX_MESSAGE_LENGTH);
        return Err(TorrentError::protocol_error_with_source(
            "Message too large",
            format!("{} bytes declared, limit is {}", length, MAX_MESSAGE_LENGTH),
        ));
    }

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body).await.map_err(|e| {
        TorrentError::io_error_with_source(format!("Failed to read {}-byte message body", length), &e)
    })?;

    let id = body[0];
    let payload = bytes::Bytes::from(body).slice(1..);
    trace!("Received frame id={} payload={} bytes", id, payload.len());
    Ok(PeerMessage { id, payload })
}

/// Write one message, flushing it to the stream. Short writes are fatal.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    trace!("Sending {:?} ({} bytes)", message.message_id(), message.length());
    write_bytes(writer, &message.serialize()).await
}

/// Write a raw frame exactly as given
pub async fn write_frame<W>(writer: &mut W, frame: &PeerMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let message = Message::Unknown {
        id: frame.id,
        payload: frame.payload.clone(),
    };
    write_bytes(writer, &message.serialize()).await
}

async fn write_bytes<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(bytes)
        .await
        .map_err(|e| TorrentError::io_error_with_source("Failed to write message", &e))?;
    writer
        .flush()
        .await
        .map_err(|e| TorrentError::io_error_with_source("Failed to flush message", &e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io::Cursor;
    use tokio::io::duplex;

    async fn round_trip(frame: PeerMessage) -> PeerMessage {
        let (mut a, mut b) = duplex(64 * 1024);
        let expected = frame.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut a, &expected).await.unwrap();
        });
        let received = read_message(&mut b).await.unwrap();
        writer.await.unwrap();
        received
    }

    #[tokio::test]
    async fn test_frame_round_trip_various_sizes() {
        for len in [0usize, 1, 16385, 40000] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let frame = PeerMessage::new(7, payload);
            assert_eq!(round_trip(frame.clone()).await, frame);
        }
    }

    #[tokio::test]
    async fn test_write_message_layout() {
        let mut out = Vec::new();
        write_message(&mut out, &Message::Interested).await.unwrap();
        write_message(&mut out, &Message::KeepAlive).await.unwrap();
        assert_eq!(out, vec![0, 0, 0, 1, 2, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_keepalives_are_skipped() {
        let mut data = vec![0, 0, 0, 0, 0, 0, 0, 0];
        data.extend_from_slice(&[0, 0, 0, 1, 1]);
        let mut reader = Cursor::new(data);

        let frame = read_message(&mut reader).await.unwrap();
        assert_eq!(frame, PeerMessage::new(1, Bytes::new()));
    }

    #[tokio::test]
    async fn test_unknown_id_passes_through() {
        let mut reader = Cursor::new(vec![0, 0, 0, 3, 20, 0xab, 0xcd]);
        let frame = read_message(&mut reader).await.unwrap();
        assert_eq!(frame.id, 20);
        assert_eq!(&frame.payload[..], &[0xab, 0xcd]);
    }

    #[tokio::test]
    async fn test_truncated_body_is_io_error() {
        let mut reader = Cursor::new(vec![0, 0, 0, 10, 7, 1, 2]);
        let err = read_message(&mut reader).await.unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_truncated_length_is_io_error() {
        let mut reader = Cursor::new(vec![0, 0]);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(err.is_connection_fault());
        assert!(err.io_kind().is_some());
    }

    #[tokio::test]
    async fn test_oversized_length_is_protocol_error() {
        let mut reader = Cursor::new(vec![0xff, 0xff, 0xff, 0xff, 0]);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
    }
}
