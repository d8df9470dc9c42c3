/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Frame format used on named pipes.
//!
//! # Wire Format
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Frame Length (4 bytes, big-endian u32, excludes header)       │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Protocol Version (1 byte, currently 0x01)                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Frame Kind (1 byte)                                           │
//! │   0x01 = Envelope                                             │
//! │   0x02 = Heartbeat                                            │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Payload (JSON encoded wire envelope, empty for heartbeats)    │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::TransportError;
use crate::message::WireEnvelope;

/// Protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Frame kind: a serialized [`WireEnvelope`].
pub const FRAME_ENVELOPE: u8 = 0x01;

/// Frame kind: keep-alive without payload.
pub const FRAME_HEARTBEAT: u8 = 0x02;

/// Frame header size: 4 bytes length + 1 byte version + 1 byte kind.
pub const HEADER_SIZE: usize = 6;

/// Maximum frame size (16 MiB hard limit).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

fn read_error(e: &std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::ConnectionClosed
    } else {
        TransportError::IoError(e.to_string())
    }
}

/// Read a frame header from the stream.
///
/// Returns `(payload_length, frame_kind)`.
async fn read_header<R>(reader: &mut R) -> Result<(u32, u8), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await.map_err(|e| read_error(&e))?;

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let version = header[4];
    let kind = header[5];

    if version != PROTOCOL_VERSION {
        return Err(TransportError::ProtocolError(format!(
            "Unsupported protocol version: {version}, expected {PROTOCOL_VERSION}"
        )));
    }

    if !matches!(kind, FRAME_ENVELOPE | FRAME_HEARTBEAT) {
        return Err(TransportError::ProtocolError(format!(
            "Unknown frame kind: {kind:#04x}"
        )));
    }

    Ok((length, kind))
}

/// Read a complete frame from the stream.
///
/// Returns the frame kind and payload bytes.
///
/// # Errors
///
/// * [`TransportError::ConnectionClosed`] - The stream ended.
/// * [`TransportError::ProtocolError`] - Bad version, unknown kind or oversized frame.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<(u8, Vec<u8>), TransportError>
where
    R: AsyncRead + Unpin,
{
    let (length, kind) = read_header(reader).await?;
    let length = length as usize;

    if length > max_size.min(MAX_FRAME_SIZE) {
        return Err(TransportError::ProtocolError(format!(
            "Frame size {length} exceeds maximum {}",
            max_size.min(MAX_FRAME_SIZE)
        )));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await.map_err(|e| read_error(&e))?;

    Ok((kind, payload))
}

/// Write a frame to the stream and flush it.
///
/// # Errors
///
/// [`TransportError::IoError`] when writing fails, or
/// [`TransportError::ProtocolError`] for payloads beyond `u32`.
pub async fn write_frame<W>(writer: &mut W, kind: u8, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let length: u32 = payload
        .len()
        .try_into()
        .map_err(|_| TransportError::ProtocolError("Payload too large for u32".to_string()))?;

    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&length.to_be_bytes());
    header[4] = PROTOCOL_VERSION;
    header[5] = kind;

    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next envelope, skipping heartbeats.
///
/// # Errors
///
/// Every error of [`read_frame`], plus [`TransportError::SerializationError`]
/// for payloads that are not a wire envelope.
pub async fn read_envelope<R>(reader: &mut R, max_size: usize) -> Result<WireEnvelope, TransportError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let (kind, payload) = read_frame(reader, max_size).await?;
        if kind == FRAME_ENVELOPE {
            return WireEnvelope::from_bytes(&payload);
        }
    }
}

/// Write an envelope frame.
///
/// # Errors
///
/// See [`write_frame`].
pub async fn write_envelope<W>(writer: &mut W, envelope: &WireEnvelope) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let payload = envelope.to_bytes()?;
    write_frame(writer, FRAME_ENVELOPE, &payload).await
}

/// Write a heartbeat frame.
///
/// # Errors
///
/// See [`write_frame`].
pub async fn write_heartbeat<W>(writer: &mut W) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, FRAME_HEARTBEAT, &[]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::message::{Endpoint, MessageId};

    fn envelope() -> WireEnvelope {
        WireEnvelope {
            id: MessageId::from("msg_1"),
            sender: Endpoint::instance("billing", "b-1"),
            recipients: vec![Endpoint::app("pricing")],
            reply_to: None,
            timeout_ms: Some(2_000),
            one_way: false,
            channel: None,
            content_type: None,
            content: None,
            fault: None,
        }
    }

    #[tokio::test]
    async fn test_header_layout() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, FRAME_ENVELOPE, b"abc").await.unwrap();

        assert_eq!(buffer.len(), HEADER_SIZE + 3);
        assert_eq!(&buffer[..4], &3u32.to_be_bytes());
        assert_eq!(buffer[4], PROTOCOL_VERSION);
        assert_eq!(buffer[5], FRAME_ENVELOPE);
        assert_eq!(&buffer[HEADER_SIZE..], b"abc");
    }

    #[tokio::test]
    async fn test_heartbeats_are_skipped() {
        let mut buffer = Vec::new();
        write_heartbeat(&mut buffer).await.unwrap();
        write_envelope(&mut buffer, &envelope()).await.unwrap();

        let mut reader = Cursor::new(buffer);
        let read = read_envelope(&mut reader, 1024).await.unwrap();
        assert_eq!(read, envelope());
    }

    #[tokio::test]
    async fn test_frame_exceeds_max_size() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, FRAME_ENVELOPE, &[0u8; 100]).await.unwrap();

        let mut reader = Cursor::new(buffer);
        let result = read_frame(&mut reader, 50).await;
        assert!(matches!(result, Err(TransportError::ProtocolError(_))));
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let buffer = vec![0, 0, 0, 0, 0x7f, FRAME_ENVELOPE];
        let mut reader = Cursor::new(buffer);
        let result = read_frame(&mut reader, 1024).await;
        assert!(matches!(result, Err(TransportError::ProtocolError(_))));
    }

    #[tokio::test]
    async fn test_unknown_frame_kind() {
        let buffer = vec![0, 0, 0, 0, PROTOCOL_VERSION, 0x09];
        let mut reader = Cursor::new(buffer);
        let result = read_frame(&mut reader, 1024).await;
        assert!(matches!(result, Err(TransportError::ProtocolError(_))));
    }

    #[tokio::test]
    async fn test_truncated_stream_is_connection_closed() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, FRAME_ENVELOPE, b"abcdef").await.unwrap();
        buffer.truncate(HEADER_SIZE + 2);

        let mut reader = Cursor::new(buffer);
        let result = read_frame(&mut reader, 1024).await;
        assert_eq!(result, Err(TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_duplex_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_envelope(&mut client, &envelope()).await.unwrap();
        let read = read_envelope(&mut server, 1024).await.unwrap();
        assert_eq!(read.id, envelope().id);
    }
}
