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

//! Integration tests for session correlation and dispatch over an
//! in-process duplex pipe pair (no physical transport).
//!
//! Two sessions are wired directly to the two ends of one pipe pair, which
//! exercises framing, assembly, correlation, and handler dispatch without
//! network I/O.

use botstream::payloads::{
    Header, PayloadType, ProtocolError, ResponsePayload, StreamingRequest,
};
use botstream::pipe::{create_connection_pair, PipeOptions};
use botstream::session::{
    RequestHandler, RequestHandlerError, SessionError, StreamingSession,
};
use botstream::transport::{PayloadDispatcher, TransportHandler};
use botstream::{ReceiveRequest, StreamingResponse};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct EchoHandler;

#[async_trait::async_trait]
impl RequestHandler for EchoHandler {
    async fn process_request(
        &self,
        request: ReceiveRequest,
    ) -> Result<StreamingResponse, RequestHandlerError> {
        let body = request.body_as_string().unwrap_or_default();
        Ok(StreamingResponse::ok().with_text_body(format!("Echo: {body}")))
    }
}

/// Fails requests whose body is exactly "fail", echoes everything else.
struct SelectiveFailHandler;

#[async_trait::async_trait]
impl RequestHandler for SelectiveFailHandler {
    async fn process_request(
        &self,
        request: ReceiveRequest,
    ) -> Result<StreamingResponse, RequestHandlerError> {
        let body = request.body_as_string().unwrap_or_default();
        if body == "fail" {
            return Err("requested failure".into());
        }
        Ok(StreamingResponse::ok().with_text_body(format!("Echo: {body}")))
    }
}

fn session_pair(
    handler_a: Arc<dyn RequestHandler>,
    handler_b: Arc<dyn RequestHandler>,
    options: &PipeOptions,
) -> (StreamingSession, StreamingSession, CancellationToken) {
    let pair = create_connection_pair(options);
    let transport_a = Arc::new(TransportHandler::new(pair.transport));
    let transport_b = Arc::new(TransportHandler::new(pair.application));
    let token = CancellationToken::new();

    let session_a = StreamingSession::new(handler_a, Arc::clone(&transport_a), token.clone());
    let session_b = StreamingSession::new(handler_b, Arc::clone(&transport_b), token.clone());

    for (transport, session) in [
        (transport_a, session_a.clone()),
        (transport_b, session_b.clone()),
    ] {
        let loop_token = token.clone();
        tokio::spawn(async move {
            let dispatcher: Arc<dyn PayloadDispatcher> = Arc::new(session);
            let _ = transport.listen(dispatcher, &loop_token).await;
        });
    }

    (session_a, session_b, token)
}

#[tokio::test]
async fn test_correlation_integrity_under_concurrency() {
    let (client, _server, _token) = session_pair(
        Arc::new(EchoHandler),
        Arc::new(EchoHandler),
        &PipeOptions::default(),
    );

    // N concurrent requests with distinct markers: each caller must get the
    // response carrying its own marker, never another's.
    let mut tasks = Vec::new();
    for marker in 0..20 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let request =
                StreamingRequest::post("/api/messages").with_text_body(format!("marker-{marker}"));
            let response = client
                .send_request(&request, &CancellationToken::new())
                .await
                .unwrap();
            (marker, response)
        }));
    }

    for task in tasks {
        let (marker, response) = tokio::time::timeout(TEST_TIMEOUT, task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(
            response.body_as_string().as_deref(),
            Some(format!("Echo: marker-{marker}").as_str())
        );
    }
}

#[tokio::test]
async fn test_handler_failure_isolated_to_one_exchange() {
    let (client, _server, _token) = session_pair(
        Arc::new(EchoHandler),
        Arc::new(SelectiveFailHandler),
        &PipeOptions::default(),
    );

    let failing = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_request(
                    &StreamingRequest::post("/api/messages").with_text_body("fail"),
                    &CancellationToken::new(),
                )
                .await
        })
    };
    let succeeding = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_request(
                    &StreamingRequest::post("/api/messages").with_text_body("ok"),
                    &CancellationToken::new(),
                )
                .await
        })
    };

    let failed = tokio::time::timeout(TEST_TIMEOUT, failing)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let succeeded = tokio::time::timeout(TEST_TIMEOUT, succeeding)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    // The failed turn becomes a 500; the concurrent exchange is untouched.
    assert_eq!(failed.status_code, 500);
    assert_eq!(succeeded.status_code, 200);
    assert_eq!(succeeded.body_as_string().as_deref(), Some("Echo: ok"));
}

/// Replies twice to every request: once with 200, once (duplicate id) with
/// 500. The duplicate must be ignored by the receiving session.
struct DoubleReplier {
    handler: Arc<TransportHandler>,
}

#[async_trait::async_trait]
impl PayloadDispatcher for DoubleReplier {
    async fn dispatch(&self, header: Header, _payload: Bytes) -> Result<(), ProtocolError> {
        if header.payload_type == PayloadType::Request {
            let first = ResponsePayload {
                status_code: 200,
                streams: None,
            };
            self.handler.send_response(header.id, &first).await.unwrap();

            let duplicate = ResponsePayload {
                status_code: 500,
                streams: None,
            };
            self.handler
                .send_response(header.id, &duplicate)
                .await
                .unwrap();
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_duplicate_response_frames_ignored() {
    let pair = create_connection_pair(&PipeOptions::default());
    let client_transport = Arc::new(TransportHandler::new(pair.transport));
    let peer_transport = Arc::new(TransportHandler::new(pair.application));
    let token = CancellationToken::new();

    let client = StreamingSession::new(
        Arc::new(EchoHandler),
        Arc::clone(&client_transport),
        token.clone(),
    );

    {
        let loop_token = token.clone();
        let session = client.clone();
        let transport = Arc::clone(&client_transport);
        tokio::spawn(async move {
            let dispatcher: Arc<dyn PayloadDispatcher> = Arc::new(session);
            let _ = transport.listen(dispatcher, &loop_token).await;
        });
    }
    {
        let loop_token = token.clone();
        let replier = Arc::new(DoubleReplier {
            handler: Arc::clone(&peer_transport),
        });
        let transport = Arc::clone(&peer_transport);
        tokio::spawn(async move {
            let dispatcher: Arc<dyn PayloadDispatcher> = replier;
            let _ = transport.listen(dispatcher, &loop_token).await;
        });
    }

    // First response (200) wins; the duplicate (500) is dropped without
    // crashing the session.
    let response = tokio::time::timeout(
        TEST_TIMEOUT,
        client.send_request(&StreamingRequest::get("/api/version"), &CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.status_code, 200);

    // The session keeps working after the duplicate arrived.
    let response = tokio::time::timeout(
        TEST_TIMEOUT,
        client.send_request(&StreamingRequest::get("/api/version"), &CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.status_code, 200);
}

#[tokio::test]
async fn test_backpressure_does_not_deadlock() {
    // Tiny pipe buffers: the request body is far larger than what the pipe
    // can hold, so the sender must suspend until the peer's listen loop
    // drains frames.
    let (client, _server, _token) = session_pair(
        Arc::new(EchoHandler),
        Arc::new(EchoHandler),
        &PipeOptions { capacity: 2 },
    );

    let body = "b".repeat(512 * 1024);
    let request = StreamingRequest::post("/api/messages").with_text_body(body.clone());

    let response = tokio::time::timeout(
        Duration::from_secs(10),
        client.send_request(&request, &CancellationToken::new()),
    )
    .await
    .expect("backpressured send deadlocked")
    .unwrap();

    assert_eq!(response.status_code, 200);
    // Frame boundaries survived the chunked, backpressured transfer.
    assert_eq!(
        response.body_as_string().map(|s| s.len()),
        Some("Echo: ".len() + body.len())
    );
}

#[tokio::test]
async fn test_cancelling_one_request_leaves_others_running() {
    struct SlowEchoHandler;

    #[async_trait::async_trait]
    impl RequestHandler for SlowEchoHandler {
        async fn process_request(
            &self,
            request: ReceiveRequest,
        ) -> Result<StreamingResponse, RequestHandlerError> {
            let body = request.body_as_string().unwrap_or_default();
            if body == "slow" {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(StreamingResponse::ok().with_text_body(format!("Echo: {body}")))
        }
    }

    let (client, _server, _token) = session_pair(
        Arc::new(EchoHandler),
        Arc::new(SlowEchoHandler),
        &PipeOptions::default(),
    );

    let cancel_token = CancellationToken::new();
    let cancelled = {
        let client = client.clone();
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            client
                .send_request(
                    &StreamingRequest::post("/api/messages").with_text_body("slow"),
                    &cancel_token,
                )
                .await
        })
    };

    let surviving = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_request(
                    &StreamingRequest::post("/api/messages").with_text_body("slow"),
                    &CancellationToken::new(),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel_token.cancel();

    let cancelled_result = tokio::time::timeout(TEST_TIMEOUT, cancelled)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(cancelled_result, Err(SessionError::Cancelled)));

    let surviving_result = tokio::time::timeout(TEST_TIMEOUT, surviving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        surviving_result.body_as_string().as_deref(),
        Some("Echo: slow")
    );
}

#[tokio::test]
async fn test_shutdown_fails_all_pending_within_bounded_time() {
    struct NeverReplies;

    #[async_trait::async_trait]
    impl RequestHandler for NeverReplies {
        async fn process_request(
            &self,
            _request: ReceiveRequest,
        ) -> Result<StreamingResponse, RequestHandlerError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(StreamingResponse::ok())
        }
    }

    let (client, _server, _token) = session_pair(
        Arc::new(EchoHandler),
        Arc::new(NeverReplies),
        &PipeOptions::default(),
    );

    let mut pending = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        pending.push(tokio::spawn(async move {
            client
                .send_request(
                    &StreamingRequest::post("/api/messages").with_text_body(format!("{i}")),
                    &CancellationToken::new(),
                )
                .await
        }));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    client.shutdown().await;

    for task in pending {
        let result = tokio::time::timeout(TEST_TIMEOUT, task)
            .await
            .expect("pending request did not fail after shutdown")
            .unwrap();
        assert!(matches!(result, Err(SessionError::Disconnected)));
    }
}
