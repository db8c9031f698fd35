//! Per-connection transport (§4.7): one reader task decoding Levin
//! frames off a [`TcpStream`], one writer task draining a bounded
//! queue, and a [`CancellationToken`] so either side — or the buffer
//! filling up — can tear the connection down from outside.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::constants::{
    P2P_CONNECTION_MAX_WRITE_BUFFER_SIZE, P2P_DEFAULT_INVOKE_TIMEOUT_SECS, P2P_DEFAULT_PACKET_MAX_SIZE,
};
use crate::error::{ProtocolError, Result};
use crate::wire::Frame;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Handle a connection's writer task keeps on the other end of its
/// mpsc queue. Cloning it and sending a frame is the only way the rest
/// of the handler talks to the peer.
#[derive(Clone)]
pub struct PeerHandle {
    addr: SocketAddr,
    outbox: mpsc::Sender<Frame>,
    cancel: CancellationToken,
}

impl PeerHandle {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queues `frame` for delivery; fails if the writer's queue is over
    /// [`P2P_CONNECTION_MAX_WRITE_BUFFER_SIZE`]-worth of frames or the
    /// connection has already been interrupted.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ProtocolError::OutOfOrder);
        }
        self.outbox.send(frame).await.map_err(|_| ProtocolError::OutOfOrder)
    }

    pub fn interrupt(&self) {
        self.cancel.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A live TCP connection to one peer, split into a reader half driven
/// by [`Connection::next_frame`] and a writer half drained by an
/// internally spawned task.
pub struct Connection {
    addr: SocketAddr,
    read_half: tokio::net::tcp::OwnedReadHalf,
    read_buf: Vec<u8>,
    handle: PeerHandle,
    writer_task: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Splits `stream`, spawns the writer task draining a queue of at
    /// most `queue_capacity` frames, and returns the connection plus a
    /// cloneable handle other tasks use to enqueue outbound frames.
    pub fn new(stream: TcpStream, addr: SocketAddr, queue_capacity: usize) -> (Self, PeerHandle) {
        let (read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::channel::<Frame>(queue_capacity);
        let cancel = CancellationToken::new();

        let handle = PeerHandle { addr, outbox: tx, cancel: cancel.clone() };
        let writer_cancel = cancel.clone();

        let writer_task = tokio::spawn(async move {
            let mut buffered_bytes = 0usize;
            loop {
                let frame = tokio::select! {
                    () = writer_cancel.cancelled() => break,
                    frame = rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                let Ok(encoded) = frame.encode(P2P_DEFAULT_PACKET_MAX_SIZE) else { continue };
                buffered_bytes += encoded.len();
                if buffered_bytes > P2P_CONNECTION_MAX_WRITE_BUFFER_SIZE {
                    tracing::warn!(%addr, "write buffer exceeded, dropping peer");
                    writer_cancel.cancel();
                    break;
                }
                let write_result = timeout(
                    Duration::from_secs(P2P_DEFAULT_INVOKE_TIMEOUT_SECS),
                    write_half.write_all(&encoded),
                )
                .await;
                buffered_bytes = buffered_bytes.saturating_sub(encoded.len());
                match write_result {
                    Ok(Ok(())) => {}
                    _ => {
                        tracing::warn!(%addr, "write failed or timed out, dropping peer");
                        writer_cancel.cancel();
                        break;
                    }
                }
            }
            let _ = write_half.shutdown().await;
        });

        (Connection { addr, read_half, read_buf: Vec::with_capacity(READ_CHUNK_SIZE), handle: handle.clone(), writer_task }, handle)
    }

    #[must_use]
    pub fn handle(&self) -> PeerHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Reads and decodes the next complete frame, pulling more bytes
    /// off the socket as needed. Returns `Ok(None)` on a clean EOF.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some((frame, consumed)) = Frame::decode(&self.read_buf, P2P_DEFAULT_PACKET_MAX_SIZE)? {
                self.read_buf.drain(..consumed);
                return Ok(Some(frame));
            }
            if self.handle.is_interrupted() {
                return Ok(None);
            }
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let n = tokio::select! {
                () = self.handle.cancel.cancelled() => return Ok(None),
                result = self.read_half.read(&mut chunk) => result?,
            };
            if n == 0 {
                return Ok(None);
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    pub fn interrupt(&self) {
        self.handle.interrupt();
    }

    pub async fn shutdown(self) {
        self.handle.interrupt();
        let _ = self.writer_task.await;
    }
}
