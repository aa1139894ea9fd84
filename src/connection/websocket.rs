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

//! WebSocket streaming connection facade.

use crate::connection::{ConnectionCore, ConnectionState, StreamingConnection};
use crate::error::StreamingError;
use crate::payloads::{ReceiveResponse, StreamingRequest};
use crate::pipe::{create_connection_pair, PipeOptions};
use crate::session::RequestHandler;
use crate::transport::WebSocketTransport;
use std::sync::Arc;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

/// Streaming connection over an accepted WebSocket.
///
/// Used on the server side of the exchange: the HTTP host upgrades the
/// request to a WebSocket and hands the accepted stream to this facade.
///
/// # Examples
///
/// ```rust,no_run
/// use botstream::connection::{StreamingConnection, WebSocketStreamingConnection};
/// use botstream::payloads::{ReceiveRequest, StreamingResponse};
/// use botstream::session::{RequestHandler, RequestHandlerError};
/// use std::sync::Arc;
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
/// # async fn example(
/// #     socket: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
/// # ) -> Result<(), botstream::StreamingError> {
/// let connection = WebSocketStreamingConnection::new(socket);
/// connection
///     .listen(Arc::new(Handler), CancellationToken::new())
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct WebSocketStreamingConnection<S> {
    socket: std::sync::Mutex<Option<WebSocketStream<S>>>,
    options: PipeOptions,
    core: ConnectionCore,
}

impl<S> WebSocketStreamingConnection<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
{
    /// Wraps an accepted WebSocket with default pipe options.
    #[must_use]
    pub fn new(socket: WebSocketStream<S>) -> Self {
        Self::with_pipe_options(socket, PipeOptions::default())
    }

    /// Wraps an accepted WebSocket with explicit pipe options.
    #[must_use]
    pub fn with_pipe_options(socket: WebSocketStream<S>, options: PipeOptions) -> Self {
        Self {
            socket: std::sync::Mutex::new(Some(socket)),
            options,
            core: ConnectionCore::new(),
        }
    }
}

#[async_trait::async_trait]
impl<S> StreamingConnection for WebSocketStreamingConnection<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
{
    async fn listen(
        &self,
        request_handler: Arc<dyn RequestHandler>,
        token: CancellationToken,
    ) -> Result<(), StreamingError> {
        let socket = self
            .socket
            .lock()
            .expect("socket lock poisoned")
            .take()
            .ok_or(StreamingError::InvalidState {
                reason: "listen requires an idle connection",
            })?;

        let pair = create_connection_pair(&self.options);
        let transport = Box::new(WebSocketTransport::from_stream(socket, pair.transport));
        self.core
            .run(transport, pair.application, request_handler, token)
            .await
    }

    async fn send_streaming_request(
        &self,
        request: &StreamingRequest,
        token: &CancellationToken,
    ) -> Result<ReceiveResponse, StreamingError> {
        self.core.send_streaming_request(request, token).await
    }

    fn state(&self) -> ConnectionState {
        self.core.state()
    }
}
