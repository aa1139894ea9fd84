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

//! Transport layer error types.
//!
//! Transport errors are the lowest layer of the error hierarchy and are
//! always fatal to the connection that produced them: the duplex pipe is
//! closed, the framing handler observes end-of-stream, and every pending
//! session future fails with a disconnect error. Recovery (reconnecting) is
//! the owning application's decision, never this layer's.

use crate::payloads::ProtocolError;
use std::io;
use thiserror::Error;

/// Errors that can occur in the transport layer.
///
/// # Examples
///
/// ```rust
/// use botstream::transport::TransportError;
/// use std::io;
///
/// let error = TransportError::ConnectionFailed {
///     address: "ws://127.0.0.1:8080".to_string(),
///     source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
/// };
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to establish a connection to the remote endpoint.
    #[error("failed to connect to {address}: {source}")]
    ConnectionFailed {
        /// The address that failed to connect.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An established connection was lost during operation.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Description of why the connection was lost.
        reason: String,
        /// The underlying I/O error, if available.
        #[source]
        source: Option<io::Error>,
    },

    /// Failed to read bytes from the transport or pipe.
    #[error("read failed: {source}")]
    ReadFailed {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to write bytes to the transport or pipe.
    #[error("write failed: {source}")]
    WriteFailed {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A server transport failed to bind its listen address.
    #[error("failed to bind to {address}: {source}")]
    BindFailed {
        /// The address that failed to bind.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The transport is already closed.
    #[error("transport is closed")]
    Closed,

    /// The transport has not been connected yet.
    #[error("transport is not connected")]
    NotConnected,

    /// A connect header name or value could not be encoded.
    #[error("invalid connect header: {name}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
    },

    /// The peer violated the framing protocol.
    ///
    /// The byte stream cannot be resynchronized mid-frame, so protocol
    /// faults tear down the connection like any other transport fault.
    #[error("protocol fault: {0}")]
    Protocol(#[from] ProtocolError),

    /// A metadata payload could not be serialized or deserialized.
    #[error("payload serialization failed: {source}")]
    Serialization {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// WebSocket-specific error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An unexpected I/O error occurred.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },
}

impl TransportError {
    /// Returns `true` if retrying the operation (for example reconnecting)
    /// may succeed.
    ///
    /// Protocol and serialization faults indicate a peer or programming
    /// error and are not recoverable; connection-level failures usually are.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. }
            | Self::ConnectionLost { .. }
            | Self::ReadFailed { .. }
            | Self::WriteFailed { .. }
            | Self::NotConnected
            | Self::WebSocket(_)
            | Self::Io { .. } => true,
            Self::BindFailed { .. }
            | Self::Closed
            | Self::InvalidHeader { .. }
            | Self::Protocol(_)
            | Self::Serialization { .. } => false,
        }
    }
}
