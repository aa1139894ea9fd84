//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! In-process duplex byte pipes with bounded buffering.
//!
//! A connection is built around a [`DuplexPipePair`]: two linked byte streams
//! where bytes written on the transport side become readable on the
//! application side and vice versa. The pair decouples the physical transport
//! (socket or pipe pumps) from the framing layer above it.
//!
//! Buffering is bounded: each direction holds at most
//! [`PipeOptions::capacity`] chunks in flight. A writer that outruns its
//! reader suspends on the next write until the reader catches up; there is no
//! unbounded queueing and no busy-waiting.
//!
//! The only failure mode is "pipe closed": closing or dropping either end
//! yields end-of-stream on the other end's next read, and writes to a closed
//! pipe fail with [`std::io::ErrorKind::BrokenPipe`].
//!
//! # Examples
//!
//! ```rust
//! use botstream::pipe::{create_connection_pair, PipeOptions};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! # async fn example() -> std::io::Result<()> {
//! let pair = create_connection_pair(&PipeOptions::default());
//! let (mut transport, mut application) = (pair.transport, pair.application);
//!
//! transport.write_all(b"frame bytes").await?;
//!
//! let mut buf = vec![0u8; 16];
//! let n = application.read(&mut buf).await?;
//! assert_eq!(&buf[..n], b"frame bytes");
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, Bytes};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// Largest chunk a single write produces.
///
/// Larger writes are split so the bounded chunk queue keeps exerting
/// backpressure at byte granularity rather than per-call granularity.
const MAX_WRITE_CHUNK: usize = 8 * 1024;

/// Options controlling duplex pipe buffering.
#[derive(Debug, Clone)]
pub struct PipeOptions {
    /// Maximum number of in-flight chunks per direction.
    ///
    /// With writes capped at 8 KB per chunk this bounds each direction's
    /// buffer to roughly `capacity * 8 KB`.
    pub capacity: usize,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// The two linked ends of a duplex pipe.
///
/// By convention the `transport` end is handed to the physical transport
/// pumps and the `application` end to the framing layer, but the two ends are
/// symmetric.
#[derive(Debug)]
pub struct DuplexPipePair {
    /// End owned by the physical transport.
    pub transport: PipeEnd,
    /// End owned by the transport handler (framing layer).
    pub application: PipeEnd,
}

/// Creates a linked pair of pipe ends.
///
/// Bytes written to either end become readable on the other. Each direction
/// buffers at most [`PipeOptions::capacity`] chunks before suspending the
/// writer.
#[must_use]
pub fn create_connection_pair(options: &PipeOptions) -> DuplexPipePair {
    let capacity = options.capacity.max(1);
    let (tx1, rx1) = mpsc::channel(capacity);
    let (tx2, rx2) = mpsc::channel(capacity);

    DuplexPipePair {
        transport: PipeEnd {
            reader: PipeReader {
                rx: rx2,
                current: None,
            },
            writer: PipeWriter {
                tx: PollSender::new(tx1),
            },
        },
        application: PipeEnd {
            reader: PipeReader {
                rx: rx1,
                current: None,
            },
            writer: PipeWriter {
                tx: PollSender::new(tx2),
            },
        },
    }
}

/// One end of a duplex pipe.
///
/// Implements [`AsyncRead`] and [`AsyncWrite`]; [`split`](Self::split)
/// separates the halves so reading and writing can proceed from different
/// tasks.
#[derive(Debug)]
pub struct PipeEnd {
    reader: PipeReader,
    writer: PipeWriter,
}

impl PipeEnd {
    /// Splits this end into its read and write halves.
    #[must_use]
    pub fn split(self) -> (PipeReader, PipeWriter) {
        (self.reader, self.writer)
    }
}

impl AsyncRead for PipeEnd {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for PipeEnd {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}

/// Read half of a pipe end.
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Bytes>,
    current: Option<Bytes>,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // Drain the partially consumed chunk first.
        if let Some(chunk) = &mut this.current {
            let n = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..n]);
            chunk.advance(n);
            if chunk.is_empty() {
                this.current = None;
            }
            return Poll::Ready(Ok(()));
        }

        match ready!(this.rx.poll_recv(cx)) {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                chunk.advance(n);
                if !chunk.is_empty() {
                    this.current = Some(chunk);
                }
                Poll::Ready(Ok(()))
            }
            // All writers gone: end-of-stream.
            None => Poll::Ready(Ok(())),
        }
    }
}

/// Write half of a pipe end.
///
/// `poll_write` suspends while the chunk queue is full, which is what
/// propagates backpressure to the producer.
#[derive(Debug)]
pub struct PipeWriter {
    tx: PollSender<Bytes>,
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if ready!(this.tx.poll_reserve(cx)).is_err() {
            return Poll::Ready(Err(closed()));
        }

        let n = buf.len().min(MAX_WRITE_CHUNK);
        if this
            .tx
            .send_item(Bytes::copy_from_slice(&buf[..n]))
            .is_err()
        {
            return Poll::Ready(Err(closed()));
        }

        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Chunks are handed to the reader as soon as they are queued.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().tx.close();
        Poll::Ready(Ok(()))
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "duplex pipe closed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_pipe_basic() {
        let pair = create_connection_pair(&PipeOptions::default());
        let (mut transport, mut application) = (pair.transport, pair.application);

        transport.write_all(b"hello").await.unwrap();

        let mut buf = vec![0u8; 16];
        let n = application.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn test_pipe_bidirectional() {
        let pair = create_connection_pair(&PipeOptions::default());
        let (mut transport, mut application) = (pair.transport, pair.application);

        transport.write_all(b"to app").await.unwrap();
        application.write_all(b"to transport").await.unwrap();

        let mut buf = vec![0u8; 32];
        let n = application.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"to app");
        let n = transport.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"to transport");
    }

    #[tokio::test]
    async fn test_pipe_large_payload() {
        let pair = create_connection_pair(&PipeOptions::default());
        let (mut transport, mut application) = (pair.transport, pair.application);

        let payload = vec![0xABu8; 100 * 1024];
        let writer = tokio::spawn({
            let payload = payload.clone();
            async move {
                transport.write_all(&payload).await.unwrap();
                transport.shutdown().await.unwrap();
            }
        });

        let mut received = Vec::new();
        application.read_to_end(&mut received).await.unwrap();
        writer.await.unwrap();

        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn test_pipe_eof_on_drop() {
        let pair = create_connection_pair(&PipeOptions::default());
        let (transport, mut application) = (pair.transport, pair.application);

        drop(transport);

        let mut buf = vec![0u8; 16];
        let n = application.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_pipe_eof_on_shutdown() {
        let pair = create_connection_pair(&PipeOptions::default());
        let (mut transport, mut application) = (pair.transport, pair.application);

        transport.write_all(b"last").await.unwrap();
        transport.shutdown().await.unwrap();

        let mut received = Vec::new();
        application.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"last");
    }

    #[tokio::test]
    async fn test_pipe_write_after_reader_dropped() {
        let pair = create_connection_pair(&PipeOptions { capacity: 1 });
        let (mut transport, application) = (pair.transport, pair.application);

        drop(application);

        // The queue may absorb a chunk or two; eventually writes must fail.
        let mut failed = false;
        for _ in 0..8 {
            if transport.write_all(b"x").await.is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn test_pipe_backpressure_releases() {
        // One chunk of buffer: the second write must suspend until the reader
        // drains the first.
        let pair = create_connection_pair(&PipeOptions { capacity: 1 });
        let (mut transport, mut application) = (pair.transport, pair.application);

        transport.write_all(b"first").await.unwrap();

        let writer = tokio::spawn(async move {
            transport.write_all(b"second").await.unwrap();
            transport
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        let mut buf = vec![0u8; 16];
        let n = application.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"first");

        writer.await.unwrap();

        let n = application.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"second");
    }
}
