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

//! Top-level error type.
//!
//! The error hierarchy is layered:
//!
//! 1. **Transport layer**: connection-level failures ([`TransportError`]),
//!    fatal to the connection, surfaced by closing the duplex pipe.
//! 2. **Session layer**: per-exchange failures ([`SessionError`]); a
//!    cancelled or timed-out request leaves the connection intact.
//! 3. **Caller layer**: using a connection in the wrong state
//!    ([`StreamingError::InvalidState`]), reported synchronously and never
//!    silently dropped.
//!
//! [`StreamingError`] composes these for the connection facade and client.

use crate::session::SessionError;
use crate::transport::TransportError;
use thiserror::Error;

/// Top-level error for streaming connection operations.
///
/// # Examples
///
/// ```rust
/// use botstream::{StreamingError, TransportError};
///
/// let error: StreamingError = TransportError::Closed.into();
/// assert!(error.is_transport_error());
/// ```
#[derive(Debug, Error)]
pub enum StreamingError {
    /// A transport-layer fault; the connection is gone.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A session-layer fault; scoped to one exchange unless it wraps a
    /// transport fault.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The operation is not valid in the connection's current state, for
    /// example calling `listen` twice or connecting a closed client.
    #[error("invalid connection state: {reason}")]
    InvalidState {
        /// What the caller did wrong.
        reason: &'static str,
    },
}

impl StreamingError {
    /// Returns `true` if this is a transport-layer error.
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if this is a session-layer error.
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Returns `true` if the connection is unusable after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Session(e) => !e.is_local(),
            Self::InvalidState { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_classification() {
        let transport: StreamingError = TransportError::Closed.into();
        assert!(transport.is_transport_error());
        assert!(!transport.is_session_error());
        assert!(transport.is_fatal());

        let session: StreamingError = SessionError::Cancelled.into();
        assert!(session.is_session_error());
        assert!(!session.is_fatal());

        let disconnected: StreamingError = SessionError::Disconnected.into();
        assert!(disconnected.is_fatal());

        let state = StreamingError::InvalidState {
            reason: "listen called twice",
        };
        assert!(!state.is_fatal());
        assert!(state.to_string().contains("listen called twice"));
    }
}
