//! Event framing.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of a DAG-CBOR
//! encoded event record `{op, path, data, time}`. Frames are read and written whole, so a
//! message larger than any single transport read still decodes as one event, and several
//! frames on one stream come out in the order they were written.

use std::time::SystemTime;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::event::{Event, Op};

/// Largest frame body accepted in either direction
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

const LEN_PREFIX: usize = 4;
const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode event: {0}")]
    Encode(String),
    #[error("failed to decode event: {0}")]
    Decode(String),
    #[error("unsupported operation code {0}")]
    UnsupportedOperation(u8),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),
    #[error("stream ended in the middle of a frame")]
    UnexpectedEof,
    #[error("stream i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize, Deserialize)]
struct WireEvent {
    op: u8,
    path: String,
    data: Bytes,
    time: Option<SystemTime>,
}

pub fn encode(event: &Event) -> Result<Vec<u8>, WireError> {
    let record = WireEvent {
        op: event.op.code(),
        path: event.path.clone(),
        data: event.data.clone(),
        time: event.time,
    };
    serde_ipld_dagcbor::to_vec(&record).map_err(|e| WireError::Encode(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<Event, WireError> {
    let record: WireEvent =
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| WireError::Decode(e.to_string()))?;
    let op = Op::from_code(record.op).ok_or(WireError::UnsupportedOperation(record.op))?;
    Ok(Event {
        op,
        path: record.path,
        data: record.data,
        time: record.time,
    })
}

pub async fn write_frame<W>(stream: &mut W, event: &Event) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let body = encode(event)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(body.len()));
    }
    let mut frame = Vec::with_capacity(LEN_PREFIX + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);

    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Read the next event from `stream`.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
pub async fn read_frame<R>(stream: &mut R) -> Result<Option<Event>, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LEN_PREFIX];
    let mut filled = 0;
    while filled < LEN_PREFIX {
        let n = stream.read(&mut prefix[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(WireError::UnexpectedEof)
            };
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }

    // grow with the bytes that actually arrive, not with the claimed length
    let mut body = Vec::with_capacity(len.min(INITIAL_BODY_CAPACITY));
    let received = (&mut *stream).take(len as u64).read_to_end(&mut body).await?;
    if received < len {
        return Err(WireError::UnexpectedEof);
    }

    decode(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_large_body_survives_small_pipe() {
        // pipe buffer is far smaller than the frame
        let (mut client, mut server) = duplex(1024);
        let data: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
        let event = Event::write(
            "big.bin",
            data.clone(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(42)),
        );

        let writer = tokio::spawn(async move {
            write_frame(&mut client, &event).await.unwrap();
        });
        let received = read_frame(&mut server).await.unwrap().unwrap();
        writer.await.unwrap();

        assert_eq!(received.op, Op::Write);
        assert_eq!(received.path, "big.bin");
        assert_eq!(received.data.as_ref(), data.as_slice());
        assert_eq!(
            received.time,
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(42))
        );
    }

    #[tokio::test]
    async fn test_single_byte_body() {
        let (mut client, mut server) = duplex(64);
        let event = Event::write("one", vec![0x2a], None);
        write_frame(&mut client, &event).await.unwrap();

        let received = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(received.data.as_ref(), &[0x2a]);
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_claimed_length_without_body() {
        let (mut client, mut server) = duplex(1024);
        client
            .write_all(&(MAX_FRAME_LEN as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(b"short").await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (mut client, mut server) = duplex(64 * 1024);
        let events = vec![
            Event::read_request("a"),
            Event::write("b", "bee", None),
            Event::remove("c"),
            Event::write("empty", Bytes::new(), None),
        ];
        for event in &events {
            write_frame(&mut client, event).await.unwrap();
        }
        drop(client);

        let mut received = Vec::new();
        while let Some(event) = read_frame(&mut server).await.unwrap() {
            received.push(event);
        }
        assert_eq!(received, events);
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let (client, mut server) = duplex(64);
        drop(client);
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_frame() {
        let (mut client, mut server) = duplex(1024);
        let body = encode(&Event::write("x", "payload", None)).unwrap();
        client
            .write_all(&(body.len() as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(&body[..body.len() / 2]).await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::UnexpectedEof));

        let (mut client, mut server) = duplex(1024);
        client.write_all(&[0, 0]).await.unwrap();
        drop(client);
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_unknown_operation_rejected() {
        let record = WireEvent {
            op: 9,
            path: "x".to_string(),
            data: Bytes::new(),
            time: None,
        };
        let body = serde_ipld_dagcbor::to_vec(&record).unwrap();
        let (mut client, mut server) = duplex(1024);
        client
            .write_all(&(body.len() as u32).to_be_bytes())
            .await
            .unwrap();
        client.write_all(&body).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::UnsupportedOperation(9)));
    }

    #[tokio::test]
    async fn test_garbage_body_and_oversized_prefix() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(&3u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0xff, 0x00, 0x13]).await.unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));

        let (mut client, mut server) = duplex(1024);
        client
            .write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes())
            .await
            .unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge(_)));
    }
}
