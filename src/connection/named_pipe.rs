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

//! Named pipe streaming connection facade.

use crate::connection::{ConnectionCore, ConnectionState, StreamingConnection};
use crate::error::StreamingError;
use crate::payloads::{ReceiveResponse, StreamingRequest};
use crate::pipe::{create_connection_pair, PipeOptions};
use crate::session::RequestHandler;
use crate::transport::{NamedPipeTransport, StreamingTransport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::NamedPipeServer;

enum PipeSource {
    /// An accepted connection (server role).
    #[cfg(unix)]
    Stream(UnixStream),
    #[cfg(windows)]
    Stream(NamedPipeServer),
    /// A pipe path to dial when `listen` starts.
    Path(String),
    Taken,
}

/// Streaming connection over a named pipe.
///
/// Construct with [`from_stream`](Self::from_stream) for an accepted
/// connection or [`with_path`](Self::with_path) to dial the pipe when
/// `listen` starts. Exposes the same [`StreamingConnection`] contract as the
/// WebSocket variant, so upper layers do not care which transport carries
/// the frames.
pub struct NamedPipeStreamingConnection {
    source: std::sync::Mutex<PipeSource>,
    options: PipeOptions,
    core: ConnectionCore,
}

impl NamedPipeStreamingConnection {
    /// Wraps an accepted pipe connection.
    #[cfg(unix)]
    #[must_use]
    pub fn from_stream(stream: UnixStream) -> Self {
        Self::build(PipeSource::Stream(stream), PipeOptions::default())
    }

    /// Wraps an accepted pipe connection.
    #[cfg(windows)]
    #[must_use]
    pub fn from_stream(stream: NamedPipeServer) -> Self {
        Self::build(PipeSource::Stream(stream), PipeOptions::default())
    }

    /// Dials `path` when `listen` starts.
    #[must_use]
    pub fn with_path(path: impl Into<String>) -> Self {
        Self::build(PipeSource::Path(path.into()), PipeOptions::default())
    }

    /// Overrides the duplex pipe buffering options.
    #[must_use]
    pub fn pipe_options(mut self, options: PipeOptions) -> Self {
        self.options = options;
        self
    }

    fn build(source: PipeSource, options: PipeOptions) -> Self {
        Self {
            source: std::sync::Mutex::new(source),
            options,
            core: ConnectionCore::new(),
        }
    }
}

#[async_trait::async_trait]
impl StreamingConnection for NamedPipeStreamingConnection {
    async fn listen(
        &self,
        request_handler: Arc<dyn RequestHandler>,
        token: CancellationToken,
    ) -> Result<(), StreamingError> {
        let source = {
            let mut source = self.source.lock().expect("source lock poisoned");
            std::mem::replace(&mut *source, PipeSource::Taken)
        };

        let pair = create_connection_pair(&self.options);
        let transport: Box<dyn StreamingTransport> = match source {
            PipeSource::Stream(stream) => {
                Box::new(NamedPipeTransport::from_stream(stream, pair.transport))
            }
            PipeSource::Path(path) => {
                Box::new(NamedPipeTransport::connect(&path, pair.transport).await?)
            }
            PipeSource::Taken => {
                return Err(StreamingError::InvalidState {
                    reason: "listen requires an idle connection",
                });
            }
        };

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
