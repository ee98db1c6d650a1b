//! Error types for the protocol layer.
//!
//! Each crate in irislink defines its own error enum. A `ProtocolError`
//! always means the bytes or the JSON were wrong, never that the socket
//! or the session misbehaved.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into JSON).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A frame's payload was not valid JSON, or did not have the shape
    /// we expected. The frame's bytes have already been consumed, so the
    /// decoder is still aligned on the next header.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A frame header declared a payload longer than the decoder accepts.
    ///
    /// This one is unrecoverable for the connection: there is no way to
    /// find the next header without trusting the bogus length.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// The message is well-formed JSON but violates the protocol, e.g.
    /// an AUTHORIZE reply without a code.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
