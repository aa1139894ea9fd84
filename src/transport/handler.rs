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

//! Framing layer over the application side of the duplex pipe.
//!
//! The [`TransportHandler`] turns the pipe's byte stream into frames and
//! frames back into bytes:
//!
//! - [`listen`](TransportHandler::listen) reads frames continuously and hands
//!   each `(Header, Bytes)` pair to a [`PayloadDispatcher`] (the session).
//! - The `send_*` methods serialize a header plus payload and write them
//!   atomically: a write lock guarantees that one logical frame is never
//!   interleaved with another frame's bytes. Stream bodies are chunked at
//!   [`MAX_CHUNK_LENGTH`] and the lock is released between chunks, so frames
//!   for different correlation ids may interleave chunk-by-chunk.
//!
//! The protocol is multiplexed: multiple logical exchanges share the pipe
//! concurrently, and the only ordering guarantee is that the bytes of a
//! single frame are contiguous.

use crate::payloads::{
    Header, PayloadType, ProtocolError, RequestPayload, ResponsePayload, HEADER_LENGTH,
    MAX_CHUNK_LENGTH, MAX_PAYLOAD_LENGTH,
};
use crate::pipe::{PipeEnd, PipeReader, PipeWriter};
use crate::transport::TransportError;
use bytes::Bytes;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Receiver of deframed payloads.
///
/// The session implements this to route inbound frames: responses complete
/// pending futures, requests go to the request handler, stream frames feed
/// payload assembly.
#[async_trait::async_trait]
pub trait PayloadDispatcher: Send + Sync {
    /// Handles one complete inbound frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when the frame's payload violates the
    /// protocol (for example malformed request metadata). Protocol faults are
    /// fatal: the listen loop stops and the connection tears down.
    async fn dispatch(&self, header: Header, payload: Bytes) -> Result<(), ProtocolError>;
}

/// Frames and deframes protocol messages over the duplex pipe.
///
/// One handler exists per connection. The listen loop is driven by the
/// connection; sends may come from any task.
pub struct TransportHandler {
    input: Mutex<PipeReader>,
    output: Mutex<PipeWriter>,
    stop_token: CancellationToken,
}

impl TransportHandler {
    /// Creates a handler over the application side of a duplex pipe pair.
    #[must_use]
    pub fn new(application: PipeEnd) -> Self {
        let (reader, writer) = application.split();
        Self {
            input: Mutex::new(reader),
            output: Mutex::new(writer),
            stop_token: CancellationToken::new(),
        }
    }

    /// Reads frames until end-of-stream, cancellation, or a protocol fault.
    ///
    /// Every complete frame is handed to `dispatcher`. A clean end-of-stream
    /// (the transport closed the pipe at a frame boundary) completes the loop
    /// with `Ok(())`; [`stop`](Self::stop) and `token` cancellation do the
    /// same.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Protocol`] on a malformed header and
    /// [`TransportError::ConnectionLost`] if the pipe closes mid-frame.
    /// Both are fatal: the caller must tear down the connection.
    pub async fn listen(
        &self,
        dispatcher: std::sync::Arc<dyn PayloadDispatcher>,
        token: &CancellationToken,
    ) -> Result<(), TransportError> {
        let mut input = self.input.lock().await;

        loop {
            let header = tokio::select! {
                _ = token.cancelled() => break,
                _ = self.stop_token.cancelled() => break,
                header = read_header(&mut *input) => match header? {
                    Some(header) => header,
                    // Clean end-of-stream at a frame boundary.
                    None => break,
                },
            };

            debug!(header = %header, "payload received");

            let payload = if header.payload_length > 0 {
                let mut buf = vec![0u8; header.payload_length as usize];
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = self.stop_token.cancelled() => break,
                    result = input.read_exact(&mut buf) => {
                        result.map_err(|source| {
                            error!(header = %header, "failed to read frame payload");
                            TransportError::ConnectionLost {
                                reason: "connection closed mid-frame".to_string(),
                                source: Some(source),
                            }
                        })?;
                        Bytes::from(buf)
                    }
                }
            } else {
                Bytes::new()
            };

            dispatcher
                .dispatch(header, payload)
                .await
                .map_err(TransportError::Protocol)?;
        }

        info!("transport handler listen loop completed");
        Ok(())
    }

    /// Signals the listen loop to end.
    ///
    /// Idempotent; safe to call from any task.
    pub fn stop(&self) {
        self.stop_token.cancel();
    }

    /// Sends a request metadata frame tagged with `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if serialization fails, the payload
    /// exceeds [`MAX_PAYLOAD_LENGTH`], or the pipe is closed.
    pub async fn send_request(
        &self,
        id: u64,
        request: &RequestPayload,
    ) -> Result<(), TransportError> {
        let bytes = serde_json::to_vec(request)?;
        self.send_payload(PayloadType::Request, id, &bytes).await
    }

    /// Sends a response metadata frame tagged with `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if serialization fails, the payload
    /// exceeds [`MAX_PAYLOAD_LENGTH`], or the pipe is closed.
    pub async fn send_response(
        &self,
        id: u64,
        response: &ResponsePayload,
    ) -> Result<(), TransportError> {
        let bytes = serde_json::to_vec(response)?;
        self.send_payload(PayloadType::Response, id, &bytes).await
    }

    /// Sends stream content tagged with `id`, chunking bodies larger than
    /// [`MAX_CHUNK_LENGTH`].
    ///
    /// Every chunk except the last carries `end = false`. The write lock is
    /// released between chunks so other frames may interleave.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the pipe is closed.
    pub async fn send_stream(&self, id: u64, body: &[u8]) -> Result<(), TransportError> {
        if body.len() <= MAX_CHUNK_LENGTH {
            let header = Header::new(PayloadType::Stream, id, body.len() as u32, true);
            return self.write_frame(header, body).await;
        }

        let mut remaining = body;
        while !remaining.is_empty() {
            let take = remaining.len().min(MAX_CHUNK_LENGTH);
            let (chunk, rest) = remaining.split_at(take);
            let header = Header::new(PayloadType::Stream, id, take as u32, rest.is_empty());
            self.write_frame(header, chunk).await?;
            remaining = rest;
        }

        Ok(())
    }

    /// Sends a cancel-stream frame for `id`, telling the peer to discard any
    /// partially assembled content for that stream.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the pipe is closed.
    pub async fn send_cancel_stream(&self, id: u64) -> Result<(), TransportError> {
        self.write_frame(Header::new(PayloadType::CancelStream, id, 0, true), &[])
            .await
    }

    /// Sends a cancel-all frame, telling the peer to discard every partially
    /// assembled payload on the connection.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the pipe is closed.
    pub async fn send_cancel_all(&self) -> Result<(), TransportError> {
        self.write_frame(Header::new(PayloadType::CancelAll, 0, 0, true), &[])
            .await
    }

    async fn send_payload(
        &self,
        payload_type: PayloadType,
        id: u64,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        if bytes.len() > MAX_PAYLOAD_LENGTH as usize {
            return Err(TransportError::Protocol(
                crate::payloads::ProtocolError::PayloadTooLarge {
                    length: bytes.len() as u32,
                },
            ));
        }

        let header = Header::new(payload_type, id, bytes.len() as u32, true);
        self.write_frame(header, bytes).await
    }

    /// Writes one frame (header + payload) atomically.
    ///
    /// Header and payload go out as a single contiguous write. Frames no
    /// larger than a stream chunk fit one pipe chunk, so a caller dropped
    /// mid-await (cancellation) leaves either a whole frame or nothing on
    /// the wire, never a torn one.
    async fn write_frame(&self, header: Header, payload: &[u8]) -> Result<(), TransportError> {
        debug!(header = %header, "sending payload");

        let mut frame = Vec::with_capacity(HEADER_LENGTH + payload.len());
        frame.extend_from_slice(&header.encode());
        frame.extend_from_slice(payload);

        let mut output = self.output.lock().await;
        output.write_all(&frame).await.map_err(write_failed)?;
        output.flush().await.map_err(write_failed)?;
        Ok(())
    }
}

fn write_failed(source: io::Error) -> TransportError {
    TransportError::WriteFailed { source }
}

/// Reads one frame header; `Ok(None)` means clean end-of-stream.
async fn read_header(input: &mut PipeReader) -> Result<Option<Header>, TransportError> {
    let mut buf = [0u8; HEADER_LENGTH];

    // The first read distinguishes clean EOF from a truncated header.
    let n = input
        .read(&mut buf)
        .await
        .map_err(|source| TransportError::ReadFailed { source })?;
    if n == 0 {
        return Ok(None);
    }

    if n < HEADER_LENGTH {
        input
            .read_exact(&mut buf[n..])
            .await
            .map_err(|source| TransportError::ConnectionLost {
                reason: "connection closed mid-frame".to_string(),
                source: Some(source),
            })?;
    }

    Ok(Some(Header::decode(&buf)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{create_connection_pair, PipeOptions};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct CollectingDispatcher {
        tx: mpsc::UnboundedSender<(Header, Bytes)>,
    }

    #[async_trait::async_trait]
    impl PayloadDispatcher for CollectingDispatcher {
        async fn dispatch(&self, header: Header, payload: Bytes) -> Result<(), ProtocolError> {
            let _ = self.tx.send((header, payload));
            Ok(())
        }
    }

    fn handler_pair() -> (
        Arc<TransportHandler>,
        Arc<TransportHandler>,
        mpsc::UnboundedReceiver<(Header, Bytes)>,
        tokio::task::JoinHandle<Result<(), TransportError>>,
        CancellationToken,
    ) {
        let pair = create_connection_pair(&PipeOptions::default());
        let sender = Arc::new(TransportHandler::new(pair.transport));
        let receiver = Arc::new(TransportHandler::new(pair.application));

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(CollectingDispatcher { tx });
        let token = CancellationToken::new();

        let listen = tokio::spawn({
            let receiver = Arc::clone(&receiver);
            let token = token.clone();
            async move { receiver.listen(dispatcher, &token).await }
        });

        (sender, receiver, rx, listen, token)
    }

    #[tokio::test]
    async fn test_send_and_receive_request() {
        let (sender, _receiver, mut rx, _listen, _token) = handler_pair();

        let payload = RequestPayload {
            verb: "GET".to_string(),
            path: "/api/version".to_string(),
            streams: None,
        };
        sender.send_request(7, &payload).await.unwrap();

        let (header, bytes) = rx.recv().await.unwrap();
        assert_eq!(header.payload_type, PayloadType::Request);
        assert_eq!(header.id, 7);
        assert!(header.end);

        let decoded: RequestPayload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_stream_chunking() {
        let (sender, _receiver, mut rx, _listen, _token) = handler_pair();

        let body = vec![0x5Au8; MAX_CHUNK_LENGTH * 2 + 100];
        sender.send_stream(9, &body).await.unwrap();

        let mut assembled = Vec::new();
        let mut frames = 0;
        loop {
            let (header, bytes) = rx.recv().await.unwrap();
            assert_eq!(header.payload_type, PayloadType::Stream);
            assert_eq!(header.id, 9);
            assembled.extend_from_slice(&bytes);
            frames += 1;
            if header.end {
                break;
            }
            assert_eq!(bytes.len(), MAX_CHUNK_LENGTH);
        }

        assert_eq!(frames, 3);
        assert_eq!(assembled, body);
    }

    #[tokio::test]
    async fn test_empty_stream_frame() {
        let (sender, _receiver, mut rx, _listen, _token) = handler_pair();

        sender.send_stream(3, &[]).await.unwrap();

        let (header, bytes) = rx.recv().await.unwrap();
        assert_eq!(header.payload_type, PayloadType::Stream);
        assert_eq!(header.payload_length, 0);
        assert!(header.end);
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_listen_completes_on_peer_drop() {
        let (sender, _receiver, _rx, listen, _token) = handler_pair();

        drop(sender);

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), listen)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_listen_completes_on_stop() {
        let (_sender, receiver, _rx, listen, _token) = handler_pair();

        receiver.stop();

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), listen)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_header_is_protocol_fault() {
        let pair = create_connection_pair(&PipeOptions::default());
        let (mut raw, application) = (pair.transport, pair.application);
        let receiver = Arc::new(TransportHandler::new(application));

        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(CollectingDispatcher { tx });
        let token = CancellationToken::new();

        let listen = tokio::spawn({
            let receiver = Arc::clone(&receiver);
            let token = token.clone();
            async move { receiver.listen(dispatcher, &token).await }
        });

        let mut garbage = [0u8; HEADER_LENGTH];
        garbage[0] = b'Z';
        raw.write_all(&garbage).await.unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), listen)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_lost() {
        let pair = create_connection_pair(&PipeOptions::default());
        let (mut raw, application) = (pair.transport, pair.application);
        let receiver = Arc::new(TransportHandler::new(application));

        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(CollectingDispatcher { tx });
        let token = CancellationToken::new();

        let listen = tokio::spawn({
            let receiver = Arc::clone(&receiver);
            let token = token.clone();
            async move { receiver.listen(dispatcher, &token).await }
        });

        // Header declares 100 payload bytes but the pipe closes after 3.
        let header = Header::new(PayloadType::Stream, 4, 100, true);
        raw.write_all(&header.encode()).await.unwrap();
        raw.write_all(&[1, 2, 3]).await.unwrap();
        raw.shutdown().await.unwrap();
        drop(raw);

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), listen)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(TransportError::ConnectionLost { .. })));
    }
}
