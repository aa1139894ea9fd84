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

//! Client-side streaming transport with liveness probing.
//!
//! [`StreamingTransportClient`] is used when this process initiates the
//! physical connection rather than accepting one. On connect it starts the
//! transport pumps and the handler listen loop, plus an optional keep-alive
//! timer that probes `GET /api/version` through the session at a configured
//! interval.
//!
//! A failed probe (non-2xx status or error) marks the client disconnected
//! and raises one [`DisconnectedEvent`] with a reason string; it never
//! retries. Reconnection is the caller's responsibility: build a new client.

use crate::connection::{drain_sibling, flatten_task};
use crate::error::StreamingError;
use crate::payloads::{ReceiveResponse, StreamingRequest};
use crate::pipe::{create_connection_pair, PipeOptions};
use crate::session::{RequestHandler, SessionConfig, SessionError, StreamingSession};
use crate::transport::{
    NamedPipeTransport, PayloadDispatcher, StreamingTransport, TransportHandler,
    WebSocketTransport,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Well-known path probed by the keep-alive timer.
const KEEP_ALIVE_PATH: &str = "/api/version";

/// Raised when the client detects it is no longer connected.
#[derive(Debug, Clone)]
pub struct DisconnectedEvent {
    /// Human-readable cause of the disconnect.
    pub reason: String,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Spacing between keep-alive probes; `None` disables probing.
    pub keep_alive: Option<Duration>,
    /// Per-request response timeout; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Duplex pipe buffering options.
    pub pipe: PipeOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            keep_alive: None,
            request_timeout: Some(Duration::from_secs(30)),
            pipe: PipeOptions::default(),
        }
    }
}

enum TransportTarget {
    WebSocket { url: String },
    NamedPipe { path: String },
}

/// Client-side counterpart of the streaming connection facades.
///
/// Cheap to clone; clones share the same connection. A client connects once:
/// after a disconnect, create a new client to reconnect.
///
/// # Examples
///
/// ```rust,no_run
/// use botstream::connection::{ClientConfig, StreamingTransportClient};
/// use botstream::payloads::{ReceiveRequest, StreamingRequest, StreamingResponse};
/// use botstream::session::{RequestHandler, RequestHandlerError};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// struct Handler;
///
/// #[async_trait::async_trait]
/// impl RequestHandler for Handler {
///     async fn process_request(
///         &self,
///         _request: ReceiveRequest,
///     ) -> Result<StreamingResponse, RequestHandlerError> {
///         Ok(StreamingResponse::ok())
///     }
/// }
///
/// # async fn example() -> Result<(), botstream::StreamingError> {
/// let config = ClientConfig {
///     keep_alive: Some(Duration::from_secs(30)),
///     ..ClientConfig::default()
/// };
/// let client = StreamingTransportClient::web_socket_with_config(
///     "ws://localhost:8080/api/messages",
///     Arc::new(Handler),
///     config,
/// );
/// client.connect(None, &CancellationToken::new()).await?;
///
/// let response = client
///     .send(
///         &StreamingRequest::post("/api/messages").with_text_body("hello"),
///         &CancellationToken::new(),
///     )
///     .await?;
/// println!("status: {}", response.status_code);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StreamingTransportClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    target: TransportTarget,
    request_handler: Arc<dyn RequestHandler>,
    config: ClientConfig,
    session: watch::Sender<Option<StreamingSession>>,
    handler: Mutex<Option<Arc<TransportHandler>>>,
    connected: AtomicBool,
    connect_started: AtomicBool,
    disconnect_emitted: AtomicBool,
    disconnect_tx: mpsc::UnboundedSender<DisconnectedEvent>,
    disconnect_rx: Mutex<Option<mpsc::UnboundedReceiver<DisconnectedEvent>>>,
    lifetime_token: CancellationToken,
    keep_alive_token: Mutex<Option<CancellationToken>>,
}

impl StreamingTransportClient {
    /// Creates a WebSocket client with default configuration.
    #[must_use]
    pub fn web_socket(url: impl Into<String>, request_handler: Arc<dyn RequestHandler>) -> Self {
        Self::web_socket_with_config(url, request_handler, ClientConfig::default())
    }

    /// Creates a WebSocket client.
    #[must_use]
    pub fn web_socket_with_config(
        url: impl Into<String>,
        request_handler: Arc<dyn RequestHandler>,
        config: ClientConfig,
    ) -> Self {
        Self::build(
            TransportTarget::WebSocket { url: url.into() },
            request_handler,
            config,
        )
    }

    /// Creates a named pipe client with default configuration.
    #[must_use]
    pub fn named_pipe(path: impl Into<String>, request_handler: Arc<dyn RequestHandler>) -> Self {
        Self::named_pipe_with_config(path, request_handler, ClientConfig::default())
    }

    /// Creates a named pipe client.
    #[must_use]
    pub fn named_pipe_with_config(
        path: impl Into<String>,
        request_handler: Arc<dyn RequestHandler>,
        config: ClientConfig,
    ) -> Self {
        Self::build(
            TransportTarget::NamedPipe { path: path.into() },
            request_handler,
            config,
        )
    }

    fn build(
        target: TransportTarget,
        request_handler: Arc<dyn RequestHandler>,
        config: ClientConfig,
    ) -> Self {
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        let (session, _) = watch::channel(None);
        Self {
            inner: Arc::new(ClientInner {
                target,
                request_handler,
                config,
                session,
                handler: Mutex::new(None),
                connected: AtomicBool::new(false),
                connect_started: AtomicBool::new(false),
                disconnect_emitted: AtomicBool::new(false),
                disconnect_tx,
                disconnect_rx: Mutex::new(Some(disconnect_rx)),
                lifetime_token: CancellationToken::new(),
                keep_alive_token: Mutex::new(None),
            }),
        }
    }

    /// Establishes the physical connection and starts the connection loops.
    ///
    /// `headers` (channel id, authorization) are passed only on the first
    /// handshake and only apply to WebSocket targets. On success the
    /// transport pumps, the handler listen loop, and the optional keep-alive
    /// timer are running in background tasks.
    ///
    /// # Errors
    ///
    /// Returns [`StreamingError::InvalidState`] if the client already
    /// connected or was closed, or the transport fault that prevented the
    /// connection.
    pub async fn connect(
        &self,
        headers: Option<&HashMap<String, String>>,
        token: &CancellationToken,
    ) -> Result<(), StreamingError> {
        let inner = &self.inner;

        if inner.lifetime_token.is_cancelled() {
            return Err(StreamingError::InvalidState {
                reason: "client is closed",
            });
        }
        if inner.connect_started.swap(true, Ordering::SeqCst) {
            return Err(StreamingError::InvalidState {
                reason: "client already connected",
            });
        }

        let pair = create_connection_pair(&inner.config.pipe);
        let (transport_end, application) = (pair.transport, pair.application);

        let dial = async {
            match &inner.target {
                TransportTarget::WebSocket { url } => {
                    WebSocketTransport::connect(url, headers, transport_end)
                        .await
                        .map(|t| Box::new(t) as Box<dyn StreamingTransport>)
                }
                TransportTarget::NamedPipe { path } => {
                    NamedPipeTransport::connect(path, transport_end)
                        .await
                        .map(|t| Box::new(t) as Box<dyn StreamingTransport>)
                }
            }
        };

        let transport = tokio::select! {
            _ = token.cancelled() => {
                inner.connect_started.store(false, Ordering::SeqCst);
                return Err(StreamingError::Session(SessionError::Cancelled));
            }
            dialed = dial => match dialed {
                Ok(transport) => transport,
                Err(transport_error) => {
                    inner.connect_started.store(false, Ordering::SeqCst);
                    return Err(transport_error.into());
                }
            },
        };

        let connection_token = inner.lifetime_token.child_token();
        let handler = Arc::new(TransportHandler::new(application));
        let session = StreamingSession::with_config(
            Arc::clone(&inner.request_handler),
            Arc::clone(&handler),
            connection_token.clone(),
            SessionConfig {
                request_timeout: inner.config.request_timeout,
            },
        );

        *inner.handler.lock().expect("handler lock poisoned") = Some(Arc::clone(&handler));
        inner.session.send_replace(Some(session.clone()));
        inner.connected.store(true, Ordering::SeqCst);
        info!("streaming transport client connected");

        // Connection loops run in the background; `connect` returns as soon
        // as the session is ready.
        tokio::spawn(run_connection(
            Arc::clone(&self.inner),
            transport,
            handler,
            session.clone(),
            connection_token.clone(),
        ));

        if let Some(interval) = inner.config.keep_alive {
            let keep_alive_token = connection_token.child_token();
            *inner
                .keep_alive_token
                .lock()
                .expect("keep-alive lock poisoned") = Some(keep_alive_token.clone());
            tokio::spawn(keep_alive_loop(
                Arc::clone(&self.inner),
                session,
                interval,
                keep_alive_token,
            ));
        }

        Ok(())
    }

    /// Sends a request through the session and awaits the response.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] (wrapped) if called before
    /// [`connect`](Self::connect) established a session, or the session
    /// error that failed the exchange.
    pub async fn send(
        &self,
        request: &StreamingRequest,
        token: &CancellationToken,
    ) -> Result<ReceiveResponse, StreamingError> {
        let session = self
            .inner
            .session
            .subscribe()
            .borrow()
            .clone()
            .ok_or(StreamingError::Session(SessionError::NotConnected))?;
        session
            .send_request(request, token)
            .await
            .map_err(StreamingError::Session)
    }

    /// Returns `true` while the client believes the connection is healthy.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Takes the disconnect event receiver.
    ///
    /// Returns `Some` on the first call and `None` afterwards; at most one
    /// event is ever delivered per client.
    #[must_use]
    pub fn disconnect_events(&self) -> Option<mpsc::UnboundedReceiver<DisconnectedEvent>> {
        self.inner
            .disconnect_rx
            .lock()
            .expect("disconnect lock poisoned")
            .take()
    }

    /// Stops the application listener and marks the client not-connected.
    ///
    /// Idempotent and safe to call multiple times.
    pub fn disconnect(&self) {
        let handler = self
            .inner
            .handler
            .lock()
            .expect("handler lock poisoned")
            .clone();
        if let Some(handler) = handler {
            handler.stop();
        }
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    /// Releases the client: stop the keep-alive timer, disconnect, dispose
    /// the transport and handler, then cancel the shared token.
    ///
    /// Idempotent. After `close` the client cannot reconnect.
    pub fn close(&self) {
        let keep_alive = self
            .inner
            .keep_alive_token
            .lock()
            .expect("keep-alive lock poisoned")
            .take();
        if let Some(keep_alive) = keep_alive {
            keep_alive.cancel();
        }
        self.disconnect();
        self.inner.lifetime_token.cancel();
    }
}

async fn run_connection(
    inner: Arc<ClientInner>,
    transport: Box<dyn StreamingTransport>,
    handler: Arc<TransportHandler>,
    session: StreamingSession,
    connection_token: CancellationToken,
) {
    let mut transport_task = tokio::spawn(transport.process(connection_token.clone()));
    let mut listen_task = {
        let handler = Arc::clone(&handler);
        let dispatcher: Arc<dyn PayloadDispatcher> = Arc::new(session.clone());
        let loop_token = connection_token.clone();
        tokio::spawn(async move { handler.listen(dispatcher, &loop_token).await })
    };

    enum First {
        Transport,
        Listen,
    }

    let (which, first) = tokio::select! {
        result = &mut transport_task => (First::Transport, flatten_task(result)),
        result = &mut listen_task => (First::Listen, flatten_task(result)),
    };

    connection_token.cancel();
    handler.stop();
    match which {
        First::Transport => drain_sibling(listen_task).await,
        First::Listen => drain_sibling(transport_task).await,
    }

    session.shutdown().await;
    inner.connected.store(false, Ordering::SeqCst);
    inner.session.send_replace(None);

    // A locally requested close is not a disconnect worth announcing.
    if !inner.lifetime_token.is_cancelled() {
        let reason = match first {
            Ok(()) => "Connection closed by remote host.".to_string(),
            Err(transport_error) => format!("Transport disconnected: {transport_error}."),
        };
        emit_disconnect(&inner, reason);
    }

    info!("streaming transport client connection completed");
}

async fn keep_alive_loop(
    inner: Arc<ClientInner>,
    session: StreamingSession,
    period: Duration,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so probing starts one period
    // after connect.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = interval.tick() => {}
        }

        let probe = StreamingRequest::get(KEEP_ALIVE_PATH);
        match session.send_request(&probe, &token).await {
            Ok(response) if response.is_success() => {
                debug!("keep-alive heartbeat succeeded");
            }
            Ok(response) => {
                error!(
                    status_code = response.status_code,
                    "keep-alive heartbeat failed"
                );
                inner.connected.store(false, Ordering::SeqCst);
                emit_disconnect(
                    &inner,
                    format!(
                        "Received failure from server heartbeat: {}.",
                        response.status_code
                    ),
                );
                return;
            }
            Err(SessionError::Cancelled) => return,
            Err(session_error) => {
                error!(error = %session_error, "keep-alive heartbeat failed");
                inner.connected.store(false, Ordering::SeqCst);
                emit_disconnect(
                    &inner,
                    format!("Received failure from server heartbeat: {session_error}."),
                );
                return;
            }
        }
    }
}

/// Delivers at most one disconnect event per client.
fn emit_disconnect(inner: &ClientInner, reason: String) {
    if !inner.disconnect_emitted.swap(true, Ordering::SeqCst) {
        let _ = inner.disconnect_tx.send(DisconnectedEvent { reason });
    }
}
