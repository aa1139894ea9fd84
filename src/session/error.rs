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

//! Session layer error types.

use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of session operations.
///
/// Session errors are local to one exchange unless they wrap a transport
/// fault: a cancelled or timed-out request leaves every other in-flight
/// exchange untouched.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The connection closed while the request was in flight.
    ///
    /// All pending requests on a connection fail with this error when the
    /// transport disconnects.
    #[error("connection disconnected before a response arrived")]
    Disconnected,

    /// The operation was attempted before the session existed or after the
    /// connection closed.
    #[error("session is not connected")]
    NotConnected,

    /// The caller's cancellation token fired.
    #[error("request was cancelled by the caller")]
    Cancelled,

    /// No response arrived within the configured request timeout.
    #[error("no response received within {timeout:?}")]
    RequestTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A transport fault occurred while sending.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Returns `true` if the error is local to one exchange and the session
    /// remains usable.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Cancelled | Self::RequestTimeout { .. })
    }
}
