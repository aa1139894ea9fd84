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

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # botstream - streaming transport and session layer
//!
//! `botstream` lets two peers (a bot host and a channel client) exchange
//! framed, correlated request/response messages (including binary
//! attachments) over a single long-lived duplex connection, a WebSocket or a
//! named pipe, instead of one HTTP round trip per turn.
//!
//! The protocol is bidirectional and multiplexed: either peer can initiate a
//! request at any time, any number of exchanges may be in flight
//! concurrently, and large payloads are chunked so no single exchange
//! monopolizes the wire.
//!
//! ## Architecture
//!
//! ```text
//! hosting app
//!     |  listen / send_streaming_request
//! StreamingConnection (websocket | named pipe)      connection facade
//!     |
//! StreamingSession         correlation ids, pending responses, dispatch
//!     |
//! TransportHandler         framing: header + payload, chunked streams
//!     |
//! DuplexPipePair           bounded in-process byte pipe (backpressure)
//!     |
//! StreamingTransport       byte pumps over the physical connection
//! ```
//!
//! - [`pipe`]: the backpressure-aware duplex pipe pair decoupling transport
//!   from framing
//! - [`transport`]: WebSocket and named pipe pumps plus the framing
//!   [`TransportHandler`](transport::TransportHandler)
//! - [`payloads`]: frame headers, request/response types, wire metadata
//! - [`session`]: correlation, payload assembly, request handler dispatch
//! - [`connection`]: the [`StreamingConnection`] facades and the
//!   [`StreamingTransportClient`] with keep-alive probing
//!
//! ## Server quick start
//!
//! Accept a WebSocket, wrap it in a connection, and serve it:
//!
//! ```rust,no_run
//! use botstream::connection::{StreamingConnection, WebSocketStreamingConnection};
//! use botstream::payloads::{ReceiveRequest, StreamingResponse};
//! use botstream::session::{RequestHandler, RequestHandlerError};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct EchoHandler;
//!
//! #[async_trait::async_trait]
//! impl RequestHandler for EchoHandler {
//!     async fn process_request(
//!         &self,
//!         request: ReceiveRequest,
//!     ) -> Result<StreamingResponse, RequestHandlerError> {
//!         let body = request.body_as_string().unwrap_or_default();
//!         Ok(StreamingResponse::ok().with_text_body(format!("Echo: {body}")))
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! loop {
//!     let (stream, _) = listener.accept().await?;
//!     tokio::spawn(async move {
//!         let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
//!         let connection = WebSocketStreamingConnection::new(socket);
//!         let _ = connection
//!             .listen(Arc::new(EchoHandler), CancellationToken::new())
//!             .await;
//!     });
//! }
//! # }
//! ```
//!
//! ## Client quick start
//!
//! ```rust,no_run
//! use botstream::connection::StreamingTransportClient;
//! use botstream::payloads::StreamingRequest;
//! # use botstream::payloads::{ReceiveRequest, StreamingResponse};
//! # use botstream::session::{RequestHandler, RequestHandlerError};
//! # use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # struct NoopHandler;
//! # #[async_trait::async_trait]
//! # impl RequestHandler for NoopHandler {
//! #     async fn process_request(
//! #         &self,
//! #         _request: ReceiveRequest,
//! #     ) -> Result<StreamingResponse, RequestHandlerError> {
//! #         Ok(StreamingResponse::ok())
//! #     }
//! # }
//! # async fn example() -> Result<(), botstream::StreamingError> {
//! let client = StreamingTransportClient::web_socket(
//!     "ws://localhost:8080/api/messages",
//!     Arc::new(NoopHandler),
//! );
//! client.connect(None, &CancellationToken::new()).await?;
//!
//! let response = client
//!     .send(
//!         &StreamingRequest::post("/api/messages").with_text_body("hello"),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! assert_eq!(response.status_code, 200);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Errors are layered: [`TransportError`] for connection-level faults
//! (always fatal to the connection), [`SessionError`] for per-exchange
//! faults (a cancelled request leaves the connection intact), and
//! [`StreamingError`] composing both for the facades. This layer never
//! reconnects on its own; it guarantees clean, observable failure so the
//! owning application can decide.
//!
//! ## Safety
//!
//! 100% safe Rust (`#![deny(unsafe_code)]`); all concurrency runs on the
//! Tokio runtime with cooperative cancellation via
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

pub mod connection;
pub mod error;
pub mod payloads;
pub mod pipe;
pub mod session;
pub mod transport;

pub use connection::{
    ClientConfig, ConnectionState, DisconnectedEvent, NamedPipeStreamingConnection,
    StreamingConnection, StreamingTransportClient, WebSocketStreamingConnection,
};
pub use error::StreamingError;
pub use payloads::{
    ContentStream, ReceiveRequest, ReceiveResponse, StreamingRequest, StreamingResponse,
};
pub use session::{RequestHandler, RequestHandlerError, SessionError, StreamingSession};
pub use transport::{TransportError, TransportHandler};
