//! Unified error type for irislink.

use irislink_protocol::ProtocolError;
use irislink_session::SessionError;
use irislink_transport::TransportError;
use irislink_voice::VoiceError;

/// Top-level error returned by [`RpcClient`](crate::RpcClient).
///
/// Wraps errors from every layer so callers can use `?` across them.
#[derive(Debug, thiserror::Error)]
pub enum IrisError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("voice error: {0}")]
    Voice(#[from] VoiceError),
}
