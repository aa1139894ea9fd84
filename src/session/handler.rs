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

//! The consumer-supplied request handler contract.

use crate::payloads::{ReceiveRequest, StreamingResponse};

/// Error type a request handler may return.
pub type RequestHandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes inbound requests and produces responses.
///
/// Supplied by the hosting application; the session guarantees the handler is
/// invoked at most once per inbound correlation id, and that a returned error
/// becomes a `500` response to the peer rather than tearing down the session.
/// One failed turn never takes other in-flight exchanges with it.
///
/// # Examples
///
/// ```rust
/// use botstream::payloads::{ReceiveRequest, StreamingResponse};
/// use botstream::session::{RequestHandler, RequestHandlerError};
///
/// struct EchoHandler;
///
/// #[async_trait::async_trait]
/// impl RequestHandler for EchoHandler {
///     async fn process_request(
///         &self,
///         request: ReceiveRequest,
///     ) -> Result<StreamingResponse, RequestHandlerError> {
///         let body = request.body_as_string().unwrap_or_default();
///         Ok(StreamingResponse::ok().with_text_body(format!("Echo: {body}")))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Processes one inbound request and returns the response to send back.
    ///
    /// # Errors
    ///
    /// Any error is logged and converted into an internal-server-error
    /// response; it is never propagated into the session loops.
    async fn process_request(
        &self,
        request: ReceiveRequest,
    ) -> Result<StreamingResponse, RequestHandlerError>;
}
