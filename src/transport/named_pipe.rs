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

//! Named pipe transport implementation.
//!
//! On Unix the "named pipe" is a Unix domain socket addressed by filesystem
//! path; on Windows it is a real named pipe under `\\.\pipe\`. Either way the
//! physical connection is an ordered byte stream, so the shared byte pumps do
//! all the work.

use crate::pipe::PipeEnd;
use crate::transport::{pump_byte_stream, StreamingTransport, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient, NamedPipeServer};

/// Named pipe transport bound to one side of a duplex pipe.
///
/// Construct with [`connect`](Self::connect) when this process initiates the
/// connection, or [`from_stream`](Self::from_stream) for an accepted one.
pub struct NamedPipeTransport {
    stream: PipeStream,
    pipe: PipeEnd,
}

#[cfg(unix)]
type PipeStream = UnixStream;

#[cfg(windows)]
enum PipeStream {
    Client(NamedPipeClient),
    Server(NamedPipeServer),
}

impl NamedPipeTransport {
    /// Connects to the named pipe at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the pipe does not
    /// exist or refuses the connection.
    #[cfg(unix)]
    pub async fn connect(path: &str, pipe: PipeEnd) -> Result<Self, TransportError> {
        let stream =
            UnixStream::connect(path)
                .await
                .map_err(|source| TransportError::ConnectionFailed {
                    address: path.to_string(),
                    source,
                })?;
        info!(path, "named pipe transport connected");
        Ok(Self { stream, pipe })
    }

    /// Connects to the named pipe at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the pipe does not
    /// exist or refuses the connection.
    #[cfg(windows)]
    pub async fn connect(path: &str, pipe: PipeEnd) -> Result<Self, TransportError> {
        let client =
            ClientOptions::new()
                .open(path)
                .map_err(|source| TransportError::ConnectionFailed {
                    address: path.to_string(),
                    source,
                })?;
        info!(path, "named pipe transport connected");
        Ok(Self {
            stream: PipeStream::Client(client),
            pipe,
        })
    }

    /// Wraps an already accepted connection (server role).
    #[cfg(unix)]
    #[must_use]
    pub fn from_stream(stream: UnixStream, pipe: PipeEnd) -> Self {
        Self { stream, pipe }
    }

    /// Wraps an already accepted connection (server role).
    #[cfg(windows)]
    #[must_use]
    pub fn from_stream(stream: NamedPipeServer, pipe: PipeEnd) -> Self {
        Self {
            stream: PipeStream::Server(stream),
            pipe,
        }
    }
}

#[async_trait::async_trait]
impl StreamingTransport for NamedPipeTransport {
    #[cfg(unix)]
    async fn process(self: Box<Self>, token: CancellationToken) -> Result<(), TransportError> {
        pump_byte_stream(self.stream, self.pipe, token).await
    }

    #[cfg(windows)]
    async fn process(self: Box<Self>, token: CancellationToken) -> Result<(), TransportError> {
        match self.stream {
            PipeStream::Client(client) => pump_byte_stream(client, self.pipe, token).await,
            PipeStream::Server(server) => pump_byte_stream(server, self.pipe, token).await,
        }
    }

    fn transport_type(&self) -> &'static str {
        "named_pipe"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipe::{create_connection_pair, PipeOptions};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_named_pipe_pumps_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("botstream.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");
            stream.write_all(b"world").await.unwrap();
        });

        let pair = create_connection_pair(&PipeOptions::default());
        let (mut app, transport_end) = (pair.application, pair.transport);
        let transport = NamedPipeTransport::connect(path.to_str().unwrap(), transport_end)
            .await
            .unwrap();
        assert_eq!(transport.transport_type(), "named_pipe");

        let token = CancellationToken::new();
        let pump = tokio::spawn(Box::new(transport).process(token.clone()));

        app.write_all(b"hello").await.unwrap();
        let mut buf = vec![0u8; 5];
        app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");

        server.await.unwrap();
        token.cancel();
        pump.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connect_missing_pipe_fails() {
        let pair = create_connection_pair(&PipeOptions::default());
        let result = NamedPipeTransport::connect("/nonexistent/botstream.sock", pair.transport)
            .await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectionFailed { .. })
        ));
    }
}
