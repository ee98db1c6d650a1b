//! Voice commands: mute, deafen, join, leave, and the two queries.
//!
//! Every action is fire-and-forget. The chat client's reply (if any)
//! comes back through the session's event stream and is folded into the
//! call state by the [`CallStateProjector`](crate::CallStateProjector).

use std::fmt;
use std::str::FromStr;

use irislink_protocol::{RpcCommand, SelectVoiceChannelArgs, VoiceSettingsArgs};
use irislink_session::SessionHandle;

use crate::VoiceError;

// ---------------------------------------------------------------------------
// VoiceAction
// ---------------------------------------------------------------------------

/// The closed set of voice actions a host UI can trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceAction {
    Mute,
    Unmute,
    Deafen,
    Undeafen,
    /// Join (or move to) the given voice channel.
    Join(String),
    Leave,
    GetVoiceChannel,
    GetVoiceSettings,
}

impl VoiceAction {
    /// Resolves a host action name, e.g. `"mute"` or `"getVoiceChannel"`.
    ///
    /// `"join"` needs `channel_id`; the other actions ignore it.
    pub fn from_name(name: &str, channel_id: Option<&str>) -> Result<Self, VoiceError> {
        let action = match name {
            "mute" => Self::Mute,
            "unmute" => Self::Unmute,
            "deafen" => Self::Deafen,
            "undeafen" => Self::Undeafen,
            "join" => Self::Join(channel_id.unwrap_or_default().to_string()),
            "leave" => Self::Leave,
            "getVoiceChannel" | "get_voice_channel" => Self::GetVoiceChannel,
            "getVoiceSettings" | "get_voice_settings" => Self::GetVoiceSettings,
            other => return Err(VoiceError::UnknownAction(other.to_string())),
        };
        Ok(action)
    }

    /// The host action name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::Deafen => "deafen",
            Self::Undeafen => "undeafen",
            Self::Join(_) => "join",
            Self::Leave => "leave",
            Self::GetVoiceChannel => "getVoiceChannel",
            Self::GetVoiceSettings => "getVoiceSettings",
        }
    }

    /// Maps the action to the RPC command that performs it.
    pub fn into_command(self) -> Result<RpcCommand, VoiceError> {
        let command = match self {
            Self::Mute => set_voice(Some(true), None),
            Self::Unmute => set_voice(Some(false), None),
            Self::Deafen => set_voice(None, Some(true)),
            Self::Undeafen => set_voice(None, Some(false)),
            Self::Join(channel_id) => {
                if channel_id.trim().is_empty() {
                    return Err(VoiceError::InvalidChannel);
                }
                RpcCommand::SelectVoiceChannel(SelectVoiceChannelArgs {
                    channel_id: Some(channel_id),
                    force: true,
                })
            }
            Self::Leave => RpcCommand::SelectVoiceChannel(SelectVoiceChannelArgs {
                channel_id: None,
                force: false,
            }),
            Self::GetVoiceChannel => RpcCommand::GetSelectedVoiceChannel,
            Self::GetVoiceSettings => RpcCommand::GetVoiceSettings,
        };
        Ok(command)
    }
}

fn set_voice(mute: Option<bool>, deaf: Option<bool>) -> RpcCommand {
    RpcCommand::SetVoiceSettings(VoiceSettingsArgs { mute, deaf })
}

impl fmt::Display for VoiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join(channel_id) => write!(f, "join({channel_id})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Parses argument-less action names. `"join"` must go through
/// [`VoiceAction::from_name`] with a channel id.
impl FromStr for VoiceAction {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match VoiceAction::from_name(s, None)? {
            Self::Join(_) => Err(VoiceError::InvalidChannel),
            action => Ok(action),
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceController
// ---------------------------------------------------------------------------

/// Sends voice actions through a session. Cheap to clone.
#[derive(Clone)]
pub struct VoiceController {
    session: SessionHandle,
}

impl VoiceController {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    pub async fn mute(&self) -> Result<(), VoiceError> {
        self.perform(VoiceAction::Mute).await
    }

    pub async fn unmute(&self) -> Result<(), VoiceError> {
        self.perform(VoiceAction::Unmute).await
    }

    pub async fn deafen(&self) -> Result<(), VoiceError> {
        self.perform(VoiceAction::Deafen).await
    }

    pub async fn undeafen(&self) -> Result<(), VoiceError> {
        self.perform(VoiceAction::Undeafen).await
    }

    /// Joins `channel_id`, leaving the current channel if needed.
    pub async fn join(&self, channel_id: impl Into<String>) -> Result<(), VoiceError> {
        self.perform(VoiceAction::Join(channel_id.into())).await
    }

    pub async fn leave(&self) -> Result<(), VoiceError> {
        self.perform(VoiceAction::Leave).await
    }

    /// Asks for the current channel and its roster.
    pub async fn get_voice_channel(&self) -> Result<(), VoiceError> {
        self.perform(VoiceAction::GetVoiceChannel).await
    }

    /// Asks for the local user's mute/deaf settings.
    pub async fn get_voice_settings(&self) -> Result<(), VoiceError> {
        self.perform(VoiceAction::GetVoiceSettings).await
    }

    /// Sends `action`. Returns once it is written, not when the chat
    /// client answers.
    pub async fn perform(&self, action: VoiceAction) -> Result<(), VoiceError> {
        tracing::debug!(%action, "voice action");
        let command = action.into_command()?;
        self.session.send(command).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args_of(action: VoiceAction) -> serde_json::Value {
        let command = action.into_command().unwrap();
        let envelope = command.into_envelope("n".to_string().into()).unwrap();
        serde_json::to_value(envelope).unwrap()
    }

    #[test]
    fn test_into_command_mute_sets_only_mute() {
        let payload = args_of(VoiceAction::Mute);
        assert_eq!(payload["cmd"], "SET_VOICE_SETTINGS");
        assert_eq!(payload["args"], json!({"mute": true}));
    }

    #[test]
    fn test_into_command_undeafen_sets_only_deaf() {
        let payload = args_of(VoiceAction::Undeafen);
        assert_eq!(payload["args"], json!({"deaf": false}));
    }

    #[test]
    fn test_into_command_join_forces_channel() {
        let payload = args_of(VoiceAction::Join("5".into()));
        assert_eq!(payload["cmd"], "SELECT_VOICE_CHANNEL");
        assert_eq!(payload["args"], json!({"channel_id": "5", "force": true}));
    }

    #[test]
    fn test_into_command_leave_sends_null_channel() {
        let payload = args_of(VoiceAction::Leave);
        assert_eq!(payload["args"], json!({"channel_id": null}));
    }

    #[test]
    fn test_into_command_join_empty_channel_rejected() {
        assert!(matches!(
            VoiceAction::Join("  ".into()).into_command(),
            Err(VoiceError::InvalidChannel)
        ));
    }

    #[test]
    fn test_into_command_queries_have_no_args() {
        assert_eq!(
            VoiceAction::GetVoiceChannel.into_command().unwrap(),
            RpcCommand::GetSelectedVoiceChannel
        );
        assert_eq!(
            VoiceAction::GetVoiceSettings.into_command().unwrap(),
            RpcCommand::GetVoiceSettings
        );
    }

    #[test]
    fn test_from_name_known_actions() {
        assert_eq!(VoiceAction::from_name("deafen", None).unwrap(), VoiceAction::Deafen);
        assert_eq!(
            VoiceAction::from_name("join", Some("42")).unwrap(),
            VoiceAction::Join("42".into())
        );
        assert_eq!(
            "getVoiceSettings".parse::<VoiceAction>().unwrap(),
            VoiceAction::GetVoiceSettings
        );
    }

    #[test]
    fn test_from_name_unknown_action_is_error() {
        let err = VoiceAction::from_name("selfDestruct", None).unwrap_err();
        assert!(matches!(err, VoiceError::UnknownAction(ref name) if name == "selfDestruct"));
    }

    #[test]
    fn test_from_str_join_without_channel_is_error() {
        assert!(matches!("join".parse::<VoiceAction>(), Err(VoiceError::InvalidChannel)));
    }

    #[test]
    fn test_name_round_trips_through_from_name() {
        for action in [
            VoiceAction::Mute,
            VoiceAction::Unmute,
            VoiceAction::Deafen,
            VoiceAction::Undeafen,
            VoiceAction::Leave,
            VoiceAction::GetVoiceChannel,
            VoiceAction::GetVoiceSettings,
        ] {
            assert_eq!(VoiceAction::from_name(action.name(), None).unwrap(), action);
        }
    }
}
