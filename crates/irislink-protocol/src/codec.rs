//! Binary framing for the local RPC channel.
//!
//! Every frame on the wire is an 8-byte little-endian header followed by a
//! UTF-8 JSON payload:
//!
//! ```text
//! +-----------+-----------+----------------------+
//! | opcode    | length    | payload (JSON)       |
//! | u32 LE    | u32 LE    | `length` bytes       |
//! +-----------+-----------+----------------------+
//! ```
//!
//! The transport gives no message boundaries: one read may hold half a
//! frame, or three frames and the start of a fourth. [`FrameDecoder`]
//! keeps an append-only buffer and hands out whole frames as they
//! complete.

use serde::Serialize;
use serde_json::Value;

use crate::{Frame, Opcode, ProtocolError};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Default upper bound on a single payload (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encodes frames into their wire representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Serializes `payload` and prefixes it with the header.
    ///
    /// The result is meant to be handed to the transport as a single
    /// write, so header and body never interleave with another frame.
    pub fn encode<T: Serialize>(opcode: Opcode, payload: &T) -> Result<Vec<u8>, ProtocolError> {
        let body = serde_json::to_vec(payload).map_err(ProtocolError::Encode)?;
        let len = u32::try_from(body.len()).map_err(|_| ProtocolError::FrameTooLarge {
            len: body.len(),
            max: u32::MAX as usize,
        })?;

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&opcode.as_u32().to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Encodes an already-built [`Frame`].
    pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
        Self::encode(frame.opcode, &frame.payload)
    }
}

/// Reassembles frames from an arbitrarily chunked byte stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Creates a decoder with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates a decoder rejecting payloads longer than `max_frame_len`.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
        }
    }

    /// Appends a chunk received from the transport.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drops everything buffered. Used when the connection goes away.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Pops the next complete frame, if the buffer holds one.
    ///
    /// - `None`: not enough bytes yet; call [`extend`](Self::extend) again.
    /// - `Some(Err(ProtocolError::Decode(_)))`: the frame was complete but
    ///   its payload was not JSON. Its bytes are gone; keep calling.
    /// - `Some(Err(ProtocolError::FrameTooLarge { .. }))`: the header is
    ///   garbage. The buffer has been cleared and the connection should
    ///   be dropped.
    ///
    /// A zero-length payload decodes as JSON `null`.
    pub fn next_frame(&mut self) -> Option<Result<Frame, ProtocolError>> {
        if self.buf.len() < HEADER_LEN {
            return None;
        }

        let opcode = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        let len = u32::from_le_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;

        if len > self.max_frame_len {
            self.buf.clear();
            return Some(Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            }));
        }

        let total = HEADER_LEN + len;
        if self.buf.len() < total {
            return None;
        }

        let payload = if len == 0 {
            Ok(Value::Null)
        } else {
            serde_json::from_slice(&self.buf[HEADER_LEN..total]).map_err(ProtocolError::Decode)
        };
        self.buf.drain(..total);

        Some(payload.map(|payload| Frame {
            opcode: Opcode::from(opcode),
            payload,
        }))
    }
}
