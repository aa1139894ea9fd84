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

//! Streaming session: request/response correlation over one connection.
//!
//! The session owns outstanding request correlation. Outgoing requests get a
//! fresh correlation id and a pending-response entry before their frames are
//! handed to the [`TransportHandler`]; inbound frames are dispatched either
//! to the waiting caller (responses) or to the consumer-supplied
//! [`RequestHandler`] (requests).
//!
//! # Payload assembly
//!
//! A request or response that declares streams is not delivered until every
//! declared stream has fully arrived. The session keeps per-id assembly
//! state: metadata frames create placeholder buffers, stream frames append
//! to them, and the final chunk (`end = true`) of the last outstanding
//! stream triggers delivery.
//!
//! # Concurrency
//!
//! `send_request` may be called from any task; inbound dispatch runs on the
//! single handler listen loop. The pending-response map is the only shared
//! mutable structure and is guarded accordingly. Handler work runs on
//! spawned tasks so a slow consumer never stalls the listen loop.

mod correlation;
mod error;
mod handler;
mod pending;

pub use correlation::CorrelationIdGenerator;
pub use error::SessionError;
pub use handler::{RequestHandler, RequestHandlerError};
pub use pending::PendingResponses;

use crate::payloads::{
    ContentStream, Header, PayloadType, ProtocolError, ReceiveRequest, ReceiveResponse,
    ReceivedStream, RequestPayload, ResponsePayload, StreamDescription, StreamingRequest,
    StreamingResponse,
};
use crate::transport::{PayloadDispatcher, TransportHandler};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long `send_request` waits for a response before giving up.
    ///
    /// `None` waits until the caller cancels or the connection closes.
    pub request_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Correlates outbound requests with inbound responses and routes inbound
/// requests to the request handler.
///
/// Cheap to clone; clones share the same session state. The session is
/// created by the connection facade together with its transport and handler,
/// and referenced (not owned) by in-flight callers awaiting responses.
#[derive(Clone)]
pub struct StreamingSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    receiver: Arc<dyn RequestHandler>,
    sender: Arc<TransportHandler>,
    ids: CorrelationIdGenerator,
    pending: PendingResponses,
    assembly: Mutex<AssemblyState>,
    connection_token: CancellationToken,
    request_timeout: Option<Duration>,
}

#[derive(Default)]
struct AssemblyState {
    requests: HashMap<u64, RequestAssembly>,
    responses: HashMap<u64, ResponseAssembly>,
    streams: HashMap<u64, StreamBuffer>,
}

struct RequestAssembly {
    verb: String,
    path: String,
    stream_ids: Vec<u64>,
}

struct ResponseAssembly {
    status_code: u16,
    stream_ids: Vec<u64>,
}

struct StreamBuffer {
    payload_id: u64,
    payload_type: PayloadType,
    content_type: Option<String>,
    declared_length: Option<u32>,
    data: Vec<u8>,
    complete: bool,
}

enum CompletedPayload {
    Request(u64, ReceiveRequest),
    Response(u64, ReceiveResponse),
}

impl StreamingSession {
    /// Creates a session with default configuration.
    ///
    /// `receiver` handles inbound requests; `sender` frames outbound
    /// payloads; `connection_token` is the connection-wide cancellation
    /// signal shared with the transport and handler loops.
    #[must_use]
    pub fn new(
        receiver: Arc<dyn RequestHandler>,
        sender: Arc<TransportHandler>,
        connection_token: CancellationToken,
    ) -> Self {
        Self::with_config(receiver, sender, connection_token, SessionConfig::default())
    }

    /// Creates a session with explicit configuration.
    #[must_use]
    pub fn with_config(
        receiver: Arc<dyn RequestHandler>,
        sender: Arc<TransportHandler>,
        connection_token: CancellationToken,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                receiver,
                sender,
                ids: CorrelationIdGenerator::new(),
                pending: PendingResponses::new(),
                assembly: Mutex::new(AssemblyState::default()),
                connection_token,
                request_timeout: config.request_timeout,
            }),
        }
    }

    /// Sends a request and waits for its correlated response.
    ///
    /// A fresh correlation id is allocated per call, so any number of
    /// requests may be in flight concurrently; each caller receives exactly
    /// the response carrying its own id, regardless of arrival order.
    ///
    /// Cancelling `token` retires this exchange only: the pending entry is
    /// removed, the peer is told to discard any partially sent stream, and
    /// other in-flight exchanges continue undisturbed.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotConnected`] if the connection already closed
    /// - [`SessionError::Cancelled`] if `token` fires first
    /// - [`SessionError::RequestTimeout`] if the configured timeout elapses
    /// - [`SessionError::Disconnected`] if the connection closes mid-flight
    /// - [`SessionError::Transport`] if framing or the pipe fails
    pub async fn send_request(
        &self,
        request: &StreamingRequest,
        token: &CancellationToken,
    ) -> Result<ReceiveResponse, SessionError> {
        let inner = &self.inner;

        if inner.connection_token.is_cancelled() {
            return Err(SessionError::NotConnected);
        }

        let id = inner.ids.next();
        let stream_ids: Vec<u64> = request.streams.iter().map(|_| inner.ids.next()).collect();
        let payload = RequestPayload {
            verb: request.verb.clone(),
            path: request.path.clone(),
            streams: describe_streams(&request.streams, &stream_ids),
        };

        let rx = inner.pending.register(id).await;
        if let Err(send_error) = inner.sender.send_request(id, &payload).await {
            inner.pending.cancel(id).await;
            return Err(send_error.into());
        }

        // Stream sends are cancellable between frames; an abandoned stream is
        // announced to the peer so it can discard the partial assembly.
        for (stream, stream_id) in request.streams.iter().zip(&stream_ids) {
            tokio::select! {
                _ = token.cancelled() => {
                    inner.pending.cancel(id).await;
                    let _ = inner.sender.send_cancel_stream(*stream_id).await;
                    return Err(SessionError::Cancelled);
                }
                sent = inner.sender.send_stream(*stream_id, &stream.content) => {
                    if let Err(send_error) = sent {
                        inner.pending.cancel(id).await;
                        return Err(send_error.into());
                    }
                }
            }
        }

        let wait_for_response = async {
            match rx.await {
                Ok(response) => Ok(response),
                Err(_) => Err(SessionError::Disconnected),
            }
        };

        tokio::select! {
            _ = token.cancelled() => {
                inner.pending.cancel(id).await;
                Err(SessionError::Cancelled)
            }
            _ = inner.connection_token.cancelled() => {
                inner.pending.cancel(id).await;
                Err(SessionError::Disconnected)
            }
            result = await_with_timeout(inner.request_timeout, wait_for_response) => {
                if matches!(result, Err(SessionError::RequestTimeout { .. })) {
                    inner.pending.cancel(id).await;
                }
                result
            }
        }
    }

    /// Sends a response for the inbound request tagged `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if framing or the pipe fails.
    pub async fn send_response(
        &self,
        id: u64,
        response: &StreamingResponse,
    ) -> Result<(), SessionError> {
        let inner = &self.inner;
        let stream_ids: Vec<u64> = response.streams.iter().map(|_| inner.ids.next()).collect();
        let payload = ResponsePayload {
            status_code: response.status_code,
            streams: describe_streams(&response.streams, &stream_ids),
        };

        inner.sender.send_response(id, &payload).await?;
        for (stream, stream_id) in response.streams.iter().zip(&stream_ids) {
            inner.sender.send_stream(*stream_id, &stream.content).await?;
        }
        Ok(())
    }

    /// Number of requests currently awaiting responses.
    pub async fn pending_requests(&self) -> usize {
        self.inner.pending.len().await
    }

    /// Fails every pending caller and discards partial assembly state.
    ///
    /// Called from the connection's single teardown path; idempotent.
    pub async fn shutdown(&self) {
        self.inner.pending.clear().await;
        let mut state = self.inner.assembly.lock().expect("assembly lock poisoned");
        state.requests.clear();
        state.responses.clear();
        state.streams.clear();
    }

    fn accept_request(&self, id: u64, payload: RequestPayload) -> Option<ReceiveRequest> {
        let mut state = self.inner.assembly.lock().expect("assembly lock poisoned");

        if state.requests.contains_key(&id) {
            warn!(correlation_id = id, "duplicate request metadata ignored");
            return None;
        }

        let descriptions = payload.streams.unwrap_or_default();
        if descriptions.is_empty() {
            return Some(ReceiveRequest {
                verb: payload.verb,
                path: payload.path,
                streams: Vec::new(),
            });
        }

        let stream_ids = register_streams(&mut state, id, PayloadType::Request, &descriptions);
        state.requests.insert(
            id,
            RequestAssembly {
                verb: payload.verb,
                path: payload.path,
                stream_ids,
            },
        );
        None
    }

    fn accept_response(&self, id: u64, payload: ResponsePayload) -> Option<ReceiveResponse> {
        let mut state = self.inner.assembly.lock().expect("assembly lock poisoned");

        if state.responses.contains_key(&id) {
            warn!(correlation_id = id, "duplicate response metadata ignored");
            return None;
        }

        let descriptions = payload.streams.unwrap_or_default();
        if descriptions.is_empty() {
            return Some(ReceiveResponse {
                status_code: payload.status_code,
                streams: Vec::new(),
            });
        }

        let stream_ids = register_streams(&mut state, id, PayloadType::Response, &descriptions);
        state.responses.insert(
            id,
            ResponseAssembly {
                status_code: payload.status_code,
                stream_ids,
            },
        );
        None
    }

    fn accept_stream(&self, header: Header, payload: &[u8]) -> Option<CompletedPayload> {
        let mut guard = self.inner.assembly.lock().expect("assembly lock poisoned");
        let state = &mut *guard;

        let Some(buffer) = state.streams.get_mut(&header.id) else {
            error!(header = %header, "stream has no associated payload");
            return None;
        };

        if buffer.complete {
            debug!(header = %header, "late frame for completed stream ignored");
            return None;
        }

        buffer.data.extend_from_slice(payload);
        if !header.end {
            return None;
        }
        buffer.complete = true;

        let payload_id = buffer.payload_id;
        match buffer.payload_type {
            PayloadType::Request => {
                let assembly = state.requests.get(&payload_id)?;
                if !all_complete(&state.streams, &assembly.stream_ids) {
                    return None;
                }
                let assembly = state.requests.remove(&payload_id).expect("assembly present");
                let streams = collect_streams(&mut state.streams, &assembly.stream_ids);
                Some(CompletedPayload::Request(
                    payload_id,
                    ReceiveRequest {
                        verb: assembly.verb,
                        path: assembly.path,
                        streams,
                    },
                ))
            }
            PayloadType::Response => {
                let assembly = state.responses.get(&payload_id)?;
                if !all_complete(&state.streams, &assembly.stream_ids) {
                    return None;
                }
                let assembly = state
                    .responses
                    .remove(&payload_id)
                    .expect("assembly present");
                let streams = collect_streams(&mut state.streams, &assembly.stream_ids);
                Some(CompletedPayload::Response(
                    payload_id,
                    ReceiveResponse {
                        status_code: assembly.status_code,
                        streams,
                    },
                ))
            }
            _ => None,
        }
    }

    fn cancel_stream(&self, id: u64) {
        let mut guard = self.inner.assembly.lock().expect("assembly lock poisoned");
        let state = &mut *guard;

        let Some(buffer) = state.streams.remove(&id) else {
            return;
        };
        debug!(stream_id = id, "peer cancelled stream");

        // The parent payload can never complete; drop it and its siblings.
        match buffer.payload_type {
            PayloadType::Request => {
                if let Some(assembly) = state.requests.remove(&buffer.payload_id) {
                    for stream_id in assembly.stream_ids {
                        state.streams.remove(&stream_id);
                    }
                }
            }
            PayloadType::Response => {
                if let Some(assembly) = state.responses.remove(&buffer.payload_id) {
                    for stream_id in assembly.stream_ids {
                        state.streams.remove(&stream_id);
                    }
                }
            }
            _ => {}
        }
    }

    fn cancel_all(&self) {
        debug!("peer cancelled all in-flight payloads");
        let mut state = self.inner.assembly.lock().expect("assembly lock poisoned");
        state.requests.clear();
        state.responses.clear();
        state.streams.clear();
    }

    async fn complete_response(&self, id: u64, response: ReceiveResponse) {
        if !self.inner.pending.complete(id, response).await {
            // Late or duplicate response, or the caller already cancelled.
            debug!(correlation_id = id, "response without a pending caller ignored");
        }
    }

    fn spawn_process_request(&self, id: u64, request: ReceiveRequest) {
        let session = self.clone();
        tokio::spawn(async move {
            let response = match session.inner.receiver.process_request(request).await {
                Ok(response) => response,
                Err(handler_error) => {
                    error!(
                        correlation_id = id,
                        error = %handler_error,
                        "request handler failed, returning internal server error"
                    );
                    StreamingResponse::internal_server_error()
                }
            };

            if let Err(send_error) = session.send_response(id, &response).await {
                error!(
                    correlation_id = id,
                    error = %send_error,
                    "failed to send response"
                );
            }
        });
    }
}

#[async_trait::async_trait]
impl PayloadDispatcher for StreamingSession {
    async fn dispatch(&self, header: Header, payload: Bytes) -> Result<(), ProtocolError> {
        match header.payload_type {
            PayloadType::Request => {
                let request_payload: RequestPayload = parse_metadata(&payload)?;
                if let Some(request) = self.accept_request(header.id, request_payload) {
                    self.spawn_process_request(header.id, request);
                }
            }
            PayloadType::Response => {
                let response_payload: ResponsePayload = parse_metadata(&payload)?;
                if let Some(response) = self.accept_response(header.id, response_payload) {
                    self.complete_response(header.id, response).await;
                }
            }
            PayloadType::Stream => match self.accept_stream(header, &payload) {
                Some(CompletedPayload::Request(id, request)) => {
                    self.spawn_process_request(id, request);
                }
                Some(CompletedPayload::Response(id, response)) => {
                    self.complete_response(id, response).await;
                }
                None => {}
            },
            PayloadType::CancelStream => self.cancel_stream(header.id),
            PayloadType::CancelAll => self.cancel_all(),
        }
        Ok(())
    }
}

fn parse_metadata<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(payload).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
}

fn describe_streams(
    streams: &[ContentStream],
    stream_ids: &[u64],
) -> Option<Vec<StreamDescription>> {
    if streams.is_empty() {
        return None;
    }
    Some(
        streams
            .iter()
            .zip(stream_ids)
            .map(|(stream, id)| StreamDescription {
                id: *id,
                content_type: stream.content_type.clone(),
                length: Some(stream.content.len() as u32),
            })
            .collect(),
    )
}

fn register_streams(
    state: &mut AssemblyState,
    payload_id: u64,
    payload_type: PayloadType,
    descriptions: &[StreamDescription],
) -> Vec<u64> {
    let mut stream_ids = Vec::with_capacity(descriptions.len());
    for description in descriptions {
        state.streams.insert(
            description.id,
            StreamBuffer {
                payload_id,
                payload_type,
                content_type: description.content_type.clone(),
                declared_length: description.length,
                data: Vec::new(),
                complete: false,
            },
        );
        stream_ids.push(description.id);
    }
    stream_ids
}

fn all_complete(streams: &HashMap<u64, StreamBuffer>, stream_ids: &[u64]) -> bool {
    stream_ids
        .iter()
        .all(|id| streams.get(id).is_some_and(|buffer| buffer.complete))
}

fn collect_streams(
    streams: &mut HashMap<u64, StreamBuffer>,
    stream_ids: &[u64],
) -> Vec<ReceivedStream> {
    stream_ids
        .iter()
        .filter_map(|id| {
            streams.remove(id).map(|buffer| ReceivedStream {
                id: *id,
                content_type: buffer.content_type,
                length: buffer.declared_length,
                body: Bytes::from(buffer.data),
            })
        })
        .collect()
}

async fn await_with_timeout<F>(
    timeout: Option<Duration>,
    future: F,
) -> Result<ReceiveResponse, SessionError>
where
    F: std::future::Future<Output = Result<ReceiveResponse, SessionError>>,
{
    match timeout {
        Some(duration) => match tokio::time::timeout(duration, future).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::RequestTimeout { timeout: duration }),
        },
        None => future.await,
    }
}
