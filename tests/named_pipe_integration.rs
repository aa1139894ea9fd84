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

//! End-to-end tests over named pipes (Unix domain sockets).

#![cfg(unix)]

use botstream::connection::{
    NamedPipeStreamingConnection, StreamingConnection, StreamingTransportClient,
};
use botstream::payloads::StreamingRequest;
use botstream::session::{RequestHandler, RequestHandlerError};
use botstream::{ReceiveRequest, StreamingResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct EchoHandler;

#[async_trait::async_trait]
impl RequestHandler for EchoHandler {
    async fn process_request(
        &self,
        request: ReceiveRequest,
    ) -> Result<StreamingResponse, RequestHandlerError> {
        if request.path == "/api/version" {
            return Ok(StreamingResponse::ok());
        }
        let body = request.body_as_string().unwrap_or_default();
        Ok(StreamingResponse::ok().with_text_body(format!("Echo: {body}")))
    }
}

#[tokio::test]
async fn test_echo_roundtrip_over_named_pipe() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("botstream.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let server_token = CancellationToken::new();

    {
        let server_token = server_token.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let connection = NamedPipeStreamingConnection::from_stream(stream);
            let _ = connection.listen(Arc::new(EchoHandler), server_token).await;
        });
    }

    let client = StreamingTransportClient::named_pipe(
        path.to_str().unwrap(),
        Arc::new(EchoHandler),
    );
    client.connect(None, &CancellationToken::new()).await.unwrap();
    assert!(client.is_connected());

    let request = StreamingRequest::post("/api/messages").with_text_body("hello");
    let response = tokio::time::timeout(
        TEST_TIMEOUT,
        client.send(&request, &CancellationToken::new()),
    )
    .await
    .expect("named pipe round trip timed out")
    .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body_as_string().as_deref(), Some("Echo: hello"));

    client.close();
    server_token.cancel();
}

#[tokio::test]
async fn test_facade_dials_path_and_serves_both_directions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("botstream-dial.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let token = CancellationToken::new();

    // Server side: accepted stream facade.
    let server_connection = {
        let token = token.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let connection = Arc::new(NamedPipeStreamingConnection::from_stream(stream));
            {
                let connection = Arc::clone(&connection);
                let token = token.clone();
                tokio::spawn(async move {
                    let _ = connection.listen(Arc::new(EchoHandler), token).await;
                });
            }
            connection
        })
    };

    // Client side: dialing facade.
    let client_connection = Arc::new(NamedPipeStreamingConnection::with_path(
        path.to_str().unwrap(),
    ));
    {
        let connection = Arc::clone(&client_connection);
        let token = token.clone();
        tokio::spawn(async move {
            let _ = connection.listen(Arc::new(EchoHandler), token).await;
        });
    }

    let server_connection = server_connection.await.unwrap();

    // Client -> server.
    let response = tokio::time::timeout(
        TEST_TIMEOUT,
        client_connection.send_streaming_request(
            &StreamingRequest::post("/api/messages").with_text_body("ping"),
            &CancellationToken::new(),
        ),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.body_as_string().as_deref(), Some("Echo: ping"));

    // Server -> client over the same connection.
    let response = tokio::time::timeout(
        TEST_TIMEOUT,
        server_connection.send_streaming_request(
            &StreamingRequest::post("/api/messages").with_text_body("pong"),
            &CancellationToken::new(),
        ),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.body_as_string().as_deref(), Some("Echo: pong"));

    token.cancel();
}

#[tokio::test]
async fn test_listen_twice_is_invalid_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("botstream-twice.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let token = CancellationToken::new();

    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        // Hold the stream open; the test only exercises facade state.
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });

    let connection = Arc::new(NamedPipeStreamingConnection::with_path(
        path.to_str().unwrap(),
    ));
    {
        let connection = Arc::clone(&connection);
        let token = token.clone();
        tokio::spawn(async move {
            let _ = connection.listen(Arc::new(EchoHandler), token).await;
        });
    }

    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = connection
        .listen(Arc::new(EchoHandler), CancellationToken::new())
        .await;
    assert!(matches!(
        second,
        Err(botstream::StreamingError::InvalidState { .. })
    ));

    token.cancel();
}
