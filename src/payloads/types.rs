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

//! Request and response types carried over a streaming connection.
//!
//! Two families of types live here:
//!
//! - [`StreamingRequest`] / [`StreamingResponse`]: the outgoing forms built
//!   by callers, carrying zero or more [`ContentStream`] attachments.
//! - [`ReceiveRequest`] / [`ReceiveResponse`]: the assembled inbound forms
//!   handed to consumers once every declared stream has fully arrived.
//!
//! The remaining structs ([`RequestPayload`], [`ResponsePayload`],
//! [`StreamDescription`]) are the JSON metadata payloads that describe a
//! request or response on the wire. Stream *content* never goes through
//! JSON; it travels as raw bytes in stream frames.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Content type for JSON bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type for plain text bodies.
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// An outgoing attachment: a typed blob of bytes.
///
/// A request or response may carry one JSON-like metadata stream plus any
/// number of binary attachment streams (audio, files). Stream ids are
/// allocated by the session when the payload is sent, so a `ContentStream`
/// only carries content and its type.
#[derive(Debug, Clone)]
pub struct ContentStream {
    /// MIME content type of the stream, if known.
    pub content_type: Option<String>,
    /// The stream content.
    pub content: Bytes,
}

impl ContentStream {
    /// Creates a content stream from raw bytes.
    #[must_use]
    pub fn new(content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            content: content.into(),
        }
    }
}

/// A request sent over a streaming connection.
///
/// # Examples
///
/// ```rust
/// use botstream::payloads::StreamingRequest;
///
/// let request = StreamingRequest::post("/api/messages").with_text_body("hello");
/// assert_eq!(request.verb, "POST");
/// assert_eq!(request.streams.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct StreamingRequest {
    /// Request verb (`GET`, `POST`, ...).
    pub verb: String,
    /// Request path, opaque to the transport layer.
    pub path: String,
    /// Attachments sent after the request metadata frame.
    pub streams: Vec<ContentStream>,
}

impl StreamingRequest {
    /// The GET verb.
    pub const GET: &'static str = "GET";
    /// The POST verb.
    pub const POST: &'static str = "POST";
    /// The PUT verb.
    pub const PUT: &'static str = "PUT";
    /// The DELETE verb.
    pub const DELETE: &'static str = "DELETE";

    /// Creates a request with the given verb and path and no streams.
    #[must_use]
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
            streams: Vec::new(),
        }
    }

    /// Creates a GET request for the given path.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Self::GET, path)
    }

    /// Creates a POST request for the given path.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Self::POST, path)
    }

    /// Attaches a content stream to the request.
    #[must_use]
    pub fn with_stream(mut self, stream: ContentStream) -> Self {
        self.streams.push(stream);
        self
    }

    /// Attaches a UTF-8 text body.
    #[must_use]
    pub fn with_text_body(self, body: impl Into<String>) -> Self {
        self.with_stream(ContentStream::new(CONTENT_TYPE_TEXT, body.into()))
    }

    /// Attaches a JSON body.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if `body` cannot be serialized.
    pub fn with_json_body<T: Serialize>(self, body: &T) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(body)?;
        Ok(self.with_stream(ContentStream::new(CONTENT_TYPE_JSON, bytes)))
    }
}

/// A response sent back over a streaming connection.
#[derive(Debug, Clone)]
pub struct StreamingResponse {
    /// HTTP-like status code.
    pub status_code: u16,
    /// Attachments sent after the response metadata frame.
    pub streams: Vec<ContentStream>,
}

impl StreamingResponse {
    /// Creates a response with the given status code and no streams.
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            streams: Vec::new(),
        }
    }

    /// A `200 OK` response.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(200)
    }

    /// A `404 Not Found` response.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(404)
    }

    /// A `500 Internal Server Error` response.
    #[must_use]
    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    /// Attaches a content stream to the response.
    #[must_use]
    pub fn with_stream(mut self, stream: ContentStream) -> Self {
        self.streams.push(stream);
        self
    }

    /// Attaches a UTF-8 text body.
    #[must_use]
    pub fn with_text_body(self, body: impl Into<String>) -> Self {
        self.with_stream(ContentStream::new(CONTENT_TYPE_TEXT, body.into()))
    }

    /// Returns `true` if the status code is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code <= 299
    }
}

/// A fully received attachment, assembled from one or more stream frames.
#[derive(Debug, Clone)]
pub struct ReceivedStream {
    /// Stream id from the wire.
    pub id: u64,
    /// MIME content type declared by the sender, if any.
    pub content_type: Option<String>,
    /// Length declared by the sender, if any.
    pub length: Option<u32>,
    /// The assembled stream content.
    pub body: Bytes,
}

/// An inbound request, handed to the request handler once every declared
/// stream has fully arrived.
#[derive(Debug, Clone)]
pub struct ReceiveRequest {
    /// Request verb.
    pub verb: String,
    /// Request path.
    pub path: String,
    /// The assembled attachments, in declaration order.
    pub streams: Vec<ReceivedStream>,
}

impl ReceiveRequest {
    /// Reads the first stream as a UTF-8 string.
    ///
    /// Returns `None` if there are no streams or the body is not valid UTF-8.
    #[must_use]
    pub fn body_as_string(&self) -> Option<String> {
        body_as_string(&self.streams)
    }
}

/// An inbound response, completing a pending `send_request` call.
#[derive(Debug, Clone)]
pub struct ReceiveResponse {
    /// HTTP-like status code.
    pub status_code: u16,
    /// The assembled attachments, in declaration order.
    pub streams: Vec<ReceivedStream>,
}

impl ReceiveResponse {
    /// Returns `true` if the status code is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code <= 299
    }

    /// Reads the first stream as a UTF-8 string.
    ///
    /// Returns `None` if there are no streams or the body is not valid UTF-8.
    #[must_use]
    pub fn body_as_string(&self) -> Option<String> {
        body_as_string(&self.streams)
    }
}

fn body_as_string(streams: &[ReceivedStream]) -> Option<String> {
    streams
        .first()
        .and_then(|s| String::from_utf8(s.body.to_vec()).ok())
}

/// Wire description of one stream attached to a request or response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescription {
    /// Stream id; stream frames with this id carry the content.
    pub id: u64,
    /// MIME content type, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Content length in bytes, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

/// Wire metadata payload of a request frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    /// Request verb.
    pub verb: String,
    /// Request path.
    pub path: String,
    /// Descriptions of the streams that follow, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub streams: Option<Vec<StreamDescription>>,
}

/// Wire metadata payload of a response frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    /// HTTP-like status code.
    pub status_code: u16,
    /// Descriptions of the streams that follow, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub streams: Option<Vec<StreamDescription>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = StreamingRequest::get("/api/version");
        assert_eq!(request.verb, "GET");
        assert_eq!(request.path, "/api/version");
        assert!(request.streams.is_empty());

        let request = StreamingRequest::post("/api/messages").with_text_body("hello");
        assert_eq!(request.verb, "POST");
        assert_eq!(request.streams.len(), 1);
        assert_eq!(
            request.streams[0].content_type.as_deref(),
            Some(CONTENT_TYPE_TEXT)
        );
        assert_eq!(&request.streams[0].content[..], b"hello");
    }

    #[test]
    fn test_json_body() {
        #[derive(Serialize)]
        struct Activity {
            text: String,
        }

        let request = StreamingRequest::post("/api/messages")
            .with_json_body(&Activity {
                text: "hi".to_string(),
            })
            .unwrap();
        assert_eq!(
            request.streams[0].content_type.as_deref(),
            Some(CONTENT_TYPE_JSON)
        );
        assert_eq!(&request.streams[0].content[..], br#"{"text":"hi"}"#);
    }

    #[test]
    fn test_response_status_helpers() {
        assert!(StreamingResponse::ok().is_success());
        assert!(!StreamingResponse::not_found().is_success());
        assert!(!StreamingResponse::internal_server_error().is_success());
        assert_eq!(StreamingResponse::internal_server_error().status_code, 500);
    }

    #[test]
    fn test_receive_body_as_string() {
        let response = ReceiveResponse {
            status_code: 200,
            streams: vec![ReceivedStream {
                id: 7,
                content_type: Some(CONTENT_TYPE_TEXT.to_string()),
                length: Some(5),
                body: Bytes::from_static(b"hello"),
            }],
        };
        assert_eq!(response.body_as_string().as_deref(), Some("hello"));

        let empty = ReceiveResponse {
            status_code: 200,
            streams: Vec::new(),
        };
        assert!(empty.body_as_string().is_none());
    }

    #[test]
    fn test_request_payload_serde() {
        let payload = RequestPayload {
            verb: "POST".to_string(),
            path: "/api/messages".to_string(),
            streams: Some(vec![StreamDescription {
                id: 3,
                content_type: Some(CONTENT_TYPE_JSON.to_string()),
                length: Some(12),
            }]),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains(r#""verb":"POST""#));
        assert!(json.contains(r#""contentType":"application/json""#));

        let decoded: RequestPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_response_payload_without_streams() {
        let payload = ResponsePayload {
            status_code: 200,
            streams: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"statusCode":200}"#);

        let decoded: ResponsePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, payload);
    }
}
