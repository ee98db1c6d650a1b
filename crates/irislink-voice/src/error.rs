//! Error types for the voice layer.

use irislink_session::SessionError;

/// Errors returned by [`VoiceController`](crate::VoiceController) and
/// [`VoiceAction`](crate::VoiceAction) parsing.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// The session refused or failed to send the command.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// `join` was given an empty channel id.
    #[error("channel id must not be empty")]
    InvalidChannel,

    /// The action name is not one of the known voice actions.
    #[error("unknown voice action: {0}")]
    UnknownAction(String),
}
