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

//! Streaming connection facades and the transport client.
//!
//! A [`StreamingConnection`] wires one transport, one transport handler, and
//! one session together and exposes two operations to the hosting
//! application: `listen` (serve the connection until it closes) and
//! `send_streaming_request`. Implementations exist per transport,
//! [`WebSocketStreamingConnection`] and [`NamedPipeStreamingConnection`],
//! selected by constructor; upper layers stay transport-agnostic.
//!
//! [`StreamingTransportClient`] is the client-side counterpart for processes
//! that initiate the physical connection, adding the keep-alive probe loop
//! and disconnect notification.

mod client;
mod named_pipe;
mod websocket;

pub use client::{ClientConfig, DisconnectedEvent, StreamingTransportClient};
pub use named_pipe::NamedPipeStreamingConnection;
pub use websocket::WebSocketStreamingConnection;

use crate::error::StreamingError;
use crate::payloads::{ReceiveResponse, StreamingRequest};
use crate::pipe::PipeEnd;
use crate::session::{RequestHandler, SessionError, StreamingSession};
use crate::transport::{
    PayloadDispatcher, StreamingTransport, TransportError, TransportHandler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How long teardown waits for the second loop after the first one finishes.
const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of a streaming connection facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed; `listen` has not been called.
    Idle,
    /// `listen` is running and the session is (or is becoming) available.
    Listening,
    /// The connection ended; it cannot be reused.
    Closed,
}

/// A transport-agnostic streaming connection.
///
/// One connection owns exactly one transport, one transport handler, and one
/// session; they are created together inside `listen` and torn down together
/// when it returns.
#[async_trait::async_trait]
pub trait StreamingConnection: Send + Sync {
    /// Serves the connection until it closes.
    ///
    /// Builds the duplex pipe pair, transport, transport handler, and
    /// session (wiring `request_handler` into the session), runs the
    /// transport pumps and the handler listen loop concurrently, and returns
    /// when either terminates. Transport I/O failure, `token` cancellation,
    /// and disposal all converge on the same teardown: pending session
    /// futures are cancelled and the transport is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StreamingError::InvalidState`] if the connection is not
    /// idle, or the transport fault that ended the connection.
    async fn listen(
        &self,
        request_handler: Arc<dyn RequestHandler>,
        token: CancellationToken,
    ) -> Result<(), StreamingError>;

    /// Sends a request over the connection and awaits the response.
    ///
    /// Safe to call while `listen` is still starting up: callers are gated
    /// on a readiness signal set once the session exists, rather than
    /// failing the race.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamingError`] if the connection closed or the exchange
    /// failed.
    async fn send_streaming_request(
        &self,
        request: &StreamingRequest,
        token: &CancellationToken,
    ) -> Result<ReceiveResponse, StreamingError>;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;
}

/// Shared plumbing for the concrete connection facades: state tracking, the
/// session readiness signal, and the run/teardown sequence.
pub(crate) struct ConnectionCore {
    state: std::sync::Mutex<ConnectionState>,
    session: watch::Sender<Option<StreamingSession>>,
}

impl ConnectionCore {
    pub(crate) fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            state: std::sync::Mutex::new(ConnectionState::Idle),
            session,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Runs one connection to completion over an already-built transport.
    pub(crate) async fn run(
        &self,
        transport: Box<dyn StreamingTransport>,
        application: PipeEnd,
        request_handler: Arc<dyn RequestHandler>,
        token: CancellationToken,
    ) -> Result<(), StreamingError> {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state != ConnectionState::Idle {
                return Err(StreamingError::InvalidState {
                    reason: "listen requires an idle connection",
                });
            }
            *state = ConnectionState::Listening;
        }

        let transport_type = transport.transport_type();
        let connection_token = token.child_token();
        let handler = Arc::new(TransportHandler::new(application));
        let session = StreamingSession::new(
            request_handler,
            Arc::clone(&handler),
            connection_token.clone(),
        );

        // Readiness signal: senders racing connection bring-up unblock here.
        // send_replace updates the value even with no subscriber yet.
        self.session.send_replace(Some(session.clone()));
        info!(transport_type, "streaming connection listening");

        let mut transport_task = tokio::spawn(transport.process(connection_token.clone()));
        let mut listen_task = {
            let handler = Arc::clone(&handler);
            let dispatcher: Arc<dyn PayloadDispatcher> = Arc::new(session.clone());
            let loop_token = connection_token.clone();
            tokio::spawn(async move { handler.listen(dispatcher, &loop_token).await })
        };

        enum First {
            Transport(Result<(), TransportError>),
            Listen(Result<(), TransportError>),
        }

        let first = tokio::select! {
            result = &mut transport_task => First::Transport(flatten_task(result)),
            result = &mut listen_task => First::Listen(flatten_task(result)),
        };

        // All exit paths converge here: cancel the shared token, stop the
        // handler, fail pending callers, release the transport.
        connection_token.cancel();
        handler.stop();

        let result = match first {
            First::Transport(result) => {
                debug!("transport completed first, draining listen loop");
                drain_sibling(listen_task).await;
                result
            }
            First::Listen(result) => {
                debug!("listen loop completed first, draining transport");
                drain_sibling(transport_task).await;
                result
            }
        };

        session.shutdown().await;
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            *state = ConnectionState::Closed;
        }
        // Closed is visible before the wake-up, so gated senders that observe
        // the change see the final state.
        self.session.send_replace(None);

        info!(transport_type, "streaming connection closed");
        result.map_err(StreamingError::Transport)
    }

    /// Resolves the session, waiting for readiness if `listen` is still
    /// bringing the connection up.
    pub(crate) async fn send_streaming_request(
        &self,
        request: &StreamingRequest,
        token: &CancellationToken,
    ) -> Result<ReceiveResponse, StreamingError> {
        let session = self.wait_for_session(token).await?;
        session
            .send_request(request, token)
            .await
            .map_err(StreamingError::Session)
    }

    async fn wait_for_session(
        &self,
        token: &CancellationToken,
    ) -> Result<StreamingSession, StreamingError> {
        let mut rx = self.session.subscribe();
        loop {
            if self.state() == ConnectionState::Closed {
                return Err(StreamingError::Session(SessionError::NotConnected));
            }
            if let Some(session) = rx.borrow_and_update().clone() {
                return Ok(session);
            }
            tokio::select! {
                _ = token.cancelled() => {
                    return Err(StreamingError::Session(SessionError::Cancelled));
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(StreamingError::Session(SessionError::NotConnected));
                    }
                }
            }
        }
    }
}

async fn drain_sibling(mut task: tokio::task::JoinHandle<Result<(), TransportError>>) {
    if tokio::time::timeout(TEARDOWN_GRACE, &mut task).await.is_err() {
        debug!("sibling loop did not stop within grace period, aborting");
        task.abort();
        let _ = task.await;
    }
}

fn flatten_task(
    result: Result<Result<(), TransportError>, JoinError>,
) -> Result<(), TransportError> {
    match result {
        Ok(result) => {
            if let Err(e) = &result {
                error!(error = %e, "connection loop failed");
            }
            result
        }
        Err(join_error) if join_error.is_cancelled() => Ok(()),
        Err(join_error) => Err(TransportError::ConnectionLost {
            reason: format!("connection loop panicked: {join_error}"),
            source: None,
        }),
    }
}
