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

//! Physical transports and the framing handler.
//!
//! A transport pumps raw bytes between a physical connection (WebSocket or
//! named pipe) and its assigned side of the duplex pipe; it is
//! transport-specific and protocol-agnostic. The [`TransportHandler`] sits on
//! the other pipe side and speaks the framing protocol.
//!
//! # Layering
//!
//! ```text
//! physical connection <-> StreamingTransport <-> duplex pipe <-> TransportHandler <-> session
//! ```
//!
//! Any I/O error on the physical side surfaces by closing the duplex pipe, so
//! the handler observes end-of-stream instead of an exception crossing loop
//! boundaries.

mod error;
mod handler;
mod named_pipe;
mod websocket;

pub use error::TransportError;
pub use handler::{PayloadDispatcher, TransportHandler};
pub use named_pipe::NamedPipeTransport;
pub use websocket::WebSocketTransport;

use crate::pipe::PipeEnd;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Read buffer size for the byte pumps.
const PUMP_BUFFER: usize = 8 * 1024;

/// How long a pump waits for its sibling to drain after one side finishes.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// A physical transport bound to one side of a duplex pipe.
///
/// Implementations run two concurrent loops: one reading the physical
/// connection and writing into the pipe, one reading the pipe and writing to
/// the physical connection. Both loops terminate together on close, error, or
/// cancellation.
#[async_trait::async_trait]
pub trait StreamingTransport: Send {
    /// Pumps bytes until the connection closes.
    ///
    /// Completion of this future is the connection-closed signal: an orderly
    /// peer close or local cancellation resolves with `Ok(())`, and an I/O
    /// fault resolves with the error after closing the pipe so the framing
    /// layer observes end-of-stream.
    async fn process(self: Box<Self>, token: CancellationToken) -> Result<(), TransportError>;

    /// Short transport name for diagnostics.
    fn transport_type(&self) -> &'static str;
}

/// Pumps a raw byte stream (named pipe, socket) against a pipe end.
///
/// Shared by every transport whose physical connection is itself an ordered
/// byte stream; the WebSocket transport has its own message-based pumps.
pub(crate) async fn pump_byte_stream<S>(
    stream: S,
    pipe: PipeEnd,
    token: CancellationToken,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut stream_reader, mut stream_writer) = tokio::io::split(stream);
    let (mut pipe_reader, mut pipe_writer) = pipe.split();

    // Physical connection -> pipe.
    let mut receiving = tokio::spawn(async move {
        let result = async {
            let mut buf = [0u8; PUMP_BUFFER];
            loop {
                let n = stream_reader
                    .read(&mut buf)
                    .await
                    .map_err(|source| TransportError::ConnectionLost {
                        reason: "transport read failed".to_string(),
                        source: Some(source),
                    })?;
                if n == 0 {
                    debug!("transport read loop observed end-of-stream");
                    break;
                }
                // A closed pipe means the framing layer is gone; nothing left
                // to deliver to.
                if pipe_writer.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
            Ok(())
        }
        .await;

        let _ = pipe_writer.shutdown().await;
        result
    });

    // Pipe -> physical connection.
    let mut sending = tokio::spawn(async move {
        let result = async {
            let mut buf = [0u8; PUMP_BUFFER];
            loop {
                let n = pipe_reader
                    .read(&mut buf)
                    .await
                    .map_err(|source| TransportError::ReadFailed { source })?;
                if n == 0 {
                    break;
                }
                stream_writer
                    .write_all(&buf[..n])
                    .await
                    .map_err(|source| TransportError::ConnectionLost {
                        reason: "transport write failed".to_string(),
                        source: Some(source),
                    })?;
                stream_writer
                    .flush()
                    .await
                    .map_err(|source| TransportError::ConnectionLost {
                        reason: "transport flush failed".to_string(),
                        source: Some(source),
                    })?;
            }
            Ok(())
        }
        .await;

        let _ = stream_writer.shutdown().await;
        result
    });

    tokio::select! {
        received = &mut receiving => {
            // The physical side closed; give the send loop a moment to flush
            // queued frames, then abort it.
            if tokio::time::timeout(DRAIN_GRACE, &mut sending).await.is_err() {
                debug!("timed out waiting for send loop to drain, aborting");
                sending.abort();
                let _ = sending.await;
            }
            flatten_pump(received)
        }
        sent = &mut sending => {
            if tokio::time::timeout(DRAIN_GRACE, &mut receiving).await.is_err() {
                debug!("timed out waiting for receive loop to drain, aborting");
                receiving.abort();
                let _ = receiving.await;
            }
            flatten_pump(sent)
        }
        _ = token.cancelled() => {
            receiving.abort();
            sending.abort();
            let _ = receiving.await;
            let _ = sending.await;
            Ok(())
        }
    }
}

/// Collapses a pump task result; an aborted pump is an orderly stop.
pub(crate) fn flatten_pump(
    result: Result<Result<(), TransportError>, JoinError>,
) -> Result<(), TransportError> {
    match result {
        Ok(result) => {
            if let Err(e) = &result {
                error!(error = %e, "streaming transport error detected");
            }
            result
        }
        Err(join_error) if join_error.is_cancelled() => Ok(()),
        Err(join_error) => Err(TransportError::ConnectionLost {
            reason: format!("transport pump panicked: {join_error}"),
            source: None,
        }),
    }
}
