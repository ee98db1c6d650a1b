//! Error types for the session layer.

use irislink_protocol::{ProtocolError, RemoteError};
use irislink_transport::TransportError;

use crate::SessionState;

/// Errors that can occur while driving the RPC session.
///
/// Most of these never reach the caller directly: the session actor
/// logs them and reconnects. They surface through
/// [`SessionHandle`](crate::SessionHandle) methods and rejected
/// [`wait_for`](crate::SessionHandle::wait_for) calls.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The chat client or the user refused authorization.
    #[error("authorization failed: {0}")]
    AuthFailed(String),

    /// The OAuth endpoint rejected a code exchange, refresh, or revoke.
    #[error("token endpoint request failed: {0}")]
    TokenExchange(String),

    /// The command needs a `Ready` session.
    #[error("session is not ready (state: {0})")]
    NotReady(SessionState),

    /// Somebody is already waiting for a transition. Only one waiter is
    /// allowed at a time.
    #[error("a transition to {pending} is already pending (requested {requested})")]
    TransitionAlreadyPending {
        pending: SessionState,
        requested: SessionState,
    },

    /// The connection went away before the awaited state was reached.
    #[error("connection to the chat client was lost")]
    ConnectionLost,

    /// `disconnect()` was called.
    #[error("session was shut down")]
    Shutdown,

    /// The reconnect policy gave up.
    #[error("chat client not found after {scans} scans")]
    ReconnectExhausted { scans: u32 },

    /// Arguments that can never be valid, e.g. an empty channel id.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The chat client answered a command with an error.
    #[error("chat client error: {0}")]
    Remote(RemoteError),

    /// Reading or writing persisted credentials failed.
    #[error("credential store error: {0}")]
    Store(String),

    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// The session task is gone.
    #[error("session task has stopped")]
    Closed,
}
