//! Length-prefixed JSON over a byte stream.
//!
//! Each message travels as a 4-byte big-endian length followed by its UTF-8
//! JSON encoding:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Writes go through a channel to a single writer task, so [`Transport::send`]
//! never blocks and frames never interleave.

use super::Transport;
use crate::codec::Message;
use crate::config::RpcConfig;
use crate::error::{Result, TransportError};
use crate::peer::{RpcPeer, RpcPeerBuilder};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > RpcConfig::MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: RpcConfig::MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > RpcConfig::MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: RpcConfig::MAX_FRAME_SIZE,
        });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Transport half backed by a writer task.
#[derive(Debug, Clone)]
pub struct FramedTransport {
    tx: mpsc::UnboundedSender<Message>,
}

impl Transport for FramedTransport {
    fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }
}

/// Spawn a task that writes every sent message to `writer` as a frame.
///
/// The task ends when every [`FramedTransport`] clone is dropped or a write
/// fails; after that, sends report [`TransportError::Closed`].
pub fn spawn_writer<W>(mut writer: W) -> (FramedTransport, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let payload = serde_json::to_vec(&message)?;
            write_frame(&mut writer, &payload).await?;
        }
        Ok::<(), TransportError>(())
    });
    (FramedTransport { tx }, task)
}

/// Feed every frame from `reader` to `peer` until EOF.
///
/// Frames that are not valid JSON are logged and skipped. An oversized frame
/// or an IO error ends the loop with an error.
pub async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, peer: &RpcPeer) -> Result<()> {
    while let Some(frame) = read_frame(&mut reader).await? {
        match serde_json::from_slice::<Value>(&frame) {
            Ok(raw) => peer.handle_raw(raw),
            Err(e) => warn!(
                side = %peer.options().label,
                error = %e,
                len = frame.len(),
                "Dropping frame that is not valid JSON"
            ),
        }
    }
    debug!(side = %peer.options().label, "Stream closed by remote side");
    Ok(())
}

// Tears down the write side when the read task finishes or is aborted.
struct StreamGuard {
    peer: RpcPeer,
    writer: JoinHandle<Result<()>>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.peer.close();
        self.writer.abort();
    }
}

/// Run a peer over a bidirectional byte stream.
///
/// Returns the peer and the task driving the read side. When the stream
/// ends or the task is aborted, outstanding calls fail with `Closed` and the
/// stream is dropped.
pub fn attach<S>(stream: S, builder: RpcPeerBuilder) -> (RpcPeer, JoinHandle<Result<()>>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (transport, writer_task) = spawn_writer(writer);
    let peer = builder.build(transport);

    let guard = StreamGuard {
        peer: peer.clone(),
        writer: writer_task,
    };
    let task = tokio::spawn(async move {
        let result = read_loop(reader, &guard.peer).await;
        drop(guard);
        result
    });

    (peer, task)
}
