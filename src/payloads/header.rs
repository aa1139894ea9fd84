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

//! Frame headers for the streaming wire protocol.
//!
//! Every unit written to the wire is a frame: a fixed-size header followed by
//! `payload_length` bytes of payload. The header layout is big-endian and
//! fixed-width:
//!
//! ```text
//! +------+------------------+---------------------+------+
//! | type | id (8 bytes, BE) | length (4 bytes, BE)| end  |
//! +------+------------------+---------------------+------+
//!   1 B          8 B                 4 B             1 B    = 14 bytes
//! ```
//!
//! - **type**: one of the [`PayloadType`] discriminants
//! - **id**: correlation id for requests/responses, stream id for stream frames
//! - **length**: payload byte count of this frame only
//! - **end**: `0` if more frames follow for the same logical payload, `1` on
//!   the final frame
//!
//! A header that fails to decode is a protocol fault: the byte stream cannot
//! be resynchronized mid-frame, so the connection is torn down.

use thiserror::Error;

/// Size of an encoded frame header in bytes.
pub const HEADER_LENGTH: usize = 14;

/// Maximum payload length of a single non-stream frame (16 MB).
///
/// Request and response metadata payloads beyond this size indicate a corrupt
/// or malicious peer and fail the connection.
pub const MAX_PAYLOAD_LENGTH: u32 = 16 * 1024 * 1024;

/// Chunk size for stream payloads.
///
/// Stream bodies larger than this are split into multiple frames so that
/// frames for other correlation ids can interleave between chunks.
pub const MAX_CHUNK_LENGTH: usize = 4096;

/// Errors produced while decoding frame headers.
///
/// All of these are fatal to the connection: once the byte stream is
/// misaligned there is no safe way to find the next frame boundary.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The header's type byte is not a known [`PayloadType`] discriminant.
    #[error("unknown payload type: 0x{0:02x}")]
    UnknownPayloadType(u8),

    /// Fewer than [`HEADER_LENGTH`] bytes were available.
    #[error("header truncated: expected {HEADER_LENGTH} bytes, got {0}")]
    HeaderTooShort(usize),

    /// The header's end flag was neither `0` nor `1`.
    #[error("invalid end flag: 0x{0:02x}")]
    InvalidEndFlag(u8),

    /// The declared payload length exceeds [`MAX_PAYLOAD_LENGTH`].
    #[error("payload length {length} exceeds maximum allowed size {MAX_PAYLOAD_LENGTH}")]
    PayloadTooLarge {
        /// The declared payload length.
        length: u32,
    },

    /// A request or response metadata payload failed to deserialize.
    #[error("malformed metadata payload: {0}")]
    MalformedPayload(String),
}

/// Kind of payload carried by a frame.
///
/// The discriminant values are the ASCII characters used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadType {
    /// Request metadata (verb, path, stream descriptions).
    Request = b'A',
    /// Response metadata (status code, stream descriptions).
    Response = b'B',
    /// A chunk of stream content belonging to a previously declared stream.
    Stream = b'S',
    /// Abandon every in-flight payload on the connection.
    CancelAll = b'X',
    /// Abandon the single stream named by the frame id.
    CancelStream = b'C',
}

impl PayloadType {
    /// Decodes a payload type from its wire byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownPayloadType`] for any other byte.
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            b'A' => Ok(Self::Request),
            b'B' => Ok(Self::Response),
            b'S' => Ok(Self::Stream),
            b'X' => Ok(Self::CancelAll),
            b'C' => Ok(Self::CancelStream),
            other => Err(ProtocolError::UnknownPayloadType(other)),
        }
    }

    /// Returns the wire byte for this payload type.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}

/// Header preceding every frame on the wire.
///
/// # Examples
///
/// ```rust
/// use botstream::payloads::{Header, PayloadType, HEADER_LENGTH};
///
/// let header = Header::new(PayloadType::Request, 42, 128, true);
/// let encoded = header.encode();
/// assert_eq!(encoded.len(), HEADER_LENGTH);
///
/// let decoded = Header::decode(&encoded).unwrap();
/// assert_eq!(decoded, header);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Kind of payload this frame carries.
    pub payload_type: PayloadType,
    /// Correlation id (requests/responses) or stream id (stream frames).
    pub id: u64,
    /// Number of payload bytes following this header.
    pub payload_length: u32,
    /// Whether this is the final frame of its logical payload.
    pub end: bool,
}

impl Header {
    /// Creates a new header.
    #[must_use]
    pub const fn new(payload_type: PayloadType, id: u64, payload_length: u32, end: bool) -> Self {
        Self {
            payload_type,
            id,
            payload_length,
            end,
        }
    }

    /// Encodes the header into its fixed-size wire representation.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        let mut buf = [0u8; HEADER_LENGTH];
        buf[0] = self.payload_type.as_byte();
        buf[1..9].copy_from_slice(&self.id.to_be_bytes());
        buf[9..13].copy_from_slice(&self.payload_length.to_be_bytes());
        buf[13] = u8::from(self.end);
        buf
    }

    /// Decodes a header from the first [`HEADER_LENGTH`] bytes of `buf`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the buffer is too short, the type byte
    /// or end flag is invalid, or the declared length exceeds
    /// [`MAX_PAYLOAD_LENGTH`].
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_LENGTH {
            return Err(ProtocolError::HeaderTooShort(buf.len()));
        }

        let payload_type = PayloadType::from_byte(buf[0])?;

        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&buf[1..9]);
        let id = u64::from_be_bytes(id_bytes);

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[9..13]);
        let payload_length = u32::from_be_bytes(len_bytes);

        if payload_length > MAX_PAYLOAD_LENGTH {
            return Err(ProtocolError::PayloadTooLarge {
                length: payload_length,
            });
        }

        let end = match buf[13] {
            0 => false,
            1 => true,
            other => return Err(ProtocolError::InvalidEndFlag(other)),
        };

        Ok(Self {
            payload_type,
            id,
            payload_length,
            end,
        })
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.payload_type,
            self.id,
            self.payload_length,
            u8::from(self.end)
        )
    }
}
