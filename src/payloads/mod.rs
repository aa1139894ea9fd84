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

//! Wire payload model: frame headers, request/response types, and the JSON
//! metadata payloads exchanged between peers.
//!
//! # Payload flow
//!
//! An outgoing [`StreamingRequest`] becomes one request frame carrying a
//! [`RequestPayload`] (verb, path, stream descriptions) followed by one or
//! more stream frames per attached [`ContentStream`]. The receiving side
//! reassembles those frames into a [`ReceiveRequest`] before handing it to
//! the consumer. Responses mirror the same model.

mod header;
mod types;

pub use header::{
    Header, PayloadType, ProtocolError, HEADER_LENGTH, MAX_CHUNK_LENGTH, MAX_PAYLOAD_LENGTH,
};
pub use types::{
    ContentStream, ReceiveRequest, ReceiveResponse, ReceivedStream, RequestPayload,
    ResponsePayload, StreamDescription, StreamingRequest, StreamingResponse, CONTENT_TYPE_JSON,
    CONTENT_TYPE_TEXT,
};
