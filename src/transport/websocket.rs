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

//! WebSocket transport implementation.
//!
//! Pumps bytes between a WebSocket connection and the transport side of a
//! duplex pipe. All protocol frames travel as binary WebSocket messages; the
//! framing layer above the pipe is unaware of message boundaries, it only
//! sees an ordered byte stream.
//!
//! # Examples
//!
//! ## Client connection
//!
//! ```rust,no_run
//! use botstream::pipe::{create_connection_pair, PipeOptions};
//! use botstream::transport::WebSocketTransport;
//!
//! # async fn example() -> Result<(), botstream::transport::TransportError> {
//! let pair = create_connection_pair(&PipeOptions::default());
//! let transport = WebSocketTransport::connect(
//!     "ws://localhost:8080/api/messages",
//!     None,
//!     pair.transport,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::pipe::PipeEnd;
use crate::transport::{flatten_pump, StreamingTransport, TransportError, DRAIN_GRACE, PUMP_BUFFER};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// WebSocket transport bound to one side of a duplex pipe.
///
/// Construct with [`connect`](Self::connect) when this process initiates the
/// connection, or [`from_stream`](Self::from_stream) for a connection
/// accepted by a server.
pub struct WebSocketTransport<S> {
    stream: WebSocketStream<S>,
    pipe: PipeEnd,
}

impl WebSocketTransport<MaybeTlsStream<TcpStream>> {
    /// Connects to a WebSocket server.
    ///
    /// `headers` are sent only on the handshake (channel id, authorization),
    /// never per message.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the URL is invalid, a header cannot be
    /// encoded, or the handshake fails.
    pub async fn connect(
        url: &str,
        headers: Option<&HashMap<String, String>>,
        pipe: PipeEnd,
    ) -> Result<Self, TransportError> {
        let mut request = url.into_client_request()?;

        if let Some(headers) = headers {
            let header_map = request.headers_mut();
            for (name, value) in headers {
                let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                    TransportError::InvalidHeader { name: name.clone() }
                })?;
                let header_value = HeaderValue::from_str(value).map_err(|_| {
                    TransportError::InvalidHeader { name: name.clone() }
                })?;
                header_map.insert(header_name, header_value);
            }
        }

        let (stream, _response) = connect_async(request).await?;
        info!(url, "websocket transport connected");

        Ok(Self { stream, pipe })
    }
}

impl<S> WebSocketTransport<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
{
    /// Wraps an already accepted WebSocket connection (server role).
    #[must_use]
    pub fn from_stream(stream: WebSocketStream<S>, pipe: PipeEnd) -> Self {
        Self { stream, pipe }
    }
}

#[async_trait::async_trait]
impl<S> StreamingTransport for WebSocketTransport<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
{
    async fn process(self: Box<Self>, token: CancellationToken) -> Result<(), TransportError> {
        let (mut sink, mut source) = self.stream.split();
        let (mut pipe_reader, mut pipe_writer) = self.pipe.split();

        // WebSocket -> pipe.
        let mut receiving = tokio::spawn(async move {
            let result = async {
                while let Some(message) = source.next().await {
                    match message.map_err(TransportError::WebSocket)? {
                        Message::Binary(data) => {
                            if pipe_writer.write_all(&data).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => {
                            debug!("websocket close frame received");
                            break;
                        }
                        // Pings are answered by tungstenite; text frames are
                        // not part of the protocol and are ignored.
                        _ => {}
                    }
                }
                Ok(())
            }
            .await;

            let _ = pipe_writer.shutdown().await;
            result
        });

        // Pipe -> WebSocket.
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
                    sink.send(Message::Binary(buf[..n].to_vec()))
                        .await
                        .map_err(TransportError::WebSocket)?;
                }
                Ok(())
            }
            .await;

            // Send the close frame before tearing down, if the socket is
            // still writable.
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
            result
        });

        tokio::select! {
            received = &mut receiving => {
                if tokio::time::timeout(DRAIN_GRACE, &mut sending).await.is_err() {
                    sending.abort();
                    let _ = sending.await;
                }
                flatten_pump(received)
            }
            sent = &mut sending => {
                if tokio::time::timeout(DRAIN_GRACE, &mut receiving).await.is_err() {
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

    fn transport_type(&self) -> &'static str {
        "websocket"
    }
}
