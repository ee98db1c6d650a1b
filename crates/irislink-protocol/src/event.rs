//! Typed views of the events and replies the call-state logic cares about.
//!
//! The session forwards raw [`IncomingMessage`]s; [`RpcEvent::from_message`]
//! turns the interesting ones into Rust types. Messages it doesn't model
//! come back as `Ok(None)` so callers can ignore them cheaply.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{CommandKind, IncomingMessage, ProtocolError};

/// Event names used in `evt` and in SUBSCRIBE commands.
pub mod names {
    pub const READY: &str = "READY";
    pub const ERROR: &str = "ERROR";
    pub const VOICE_CHANNEL_SELECT: &str = "VOICE_CHANNEL_SELECT";
    pub const VOICE_STATE_CREATE: &str = "VOICE_STATE_CREATE";
    pub const VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";
    pub const VOICE_STATE_DELETE: &str = "VOICE_STATE_DELETE";
    pub const SPEAKING_START: &str = "SPEAKING_START";
    pub const SPEAKING_STOP: &str = "SPEAKING_STOP";
    pub const VOICE_SETTINGS_UPDATE: &str = "VOICE_SETTINGS_UPDATE";
    pub const NOTIFICATION_CREATE: &str = "NOTIFICATION_CREATE";
}

/// Message type the chat client uses for an incoming call.
pub const CALL_MESSAGE_TYPE: u64 = 3;

// ---------------------------------------------------------------------------
// Snowflake ids
// ---------------------------------------------------------------------------

// Ids are strings on the wire, except when they aren't: notifications
// have been seen carrying numeric channel ids.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSnowflake {
    Str(String),
    Num(u64),
}

impl From<RawSnowflake> for String {
    fn from(raw: RawSnowflake) -> Self {
        match raw {
            RawSnowflake::Str(s) => s,
            RawSnowflake::Num(n) => n.to_string(),
        }
    }
}

fn snowflake<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawSnowflake::deserialize(d).map(String::from)
}

fn opt_snowflake<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawSnowflake>::deserialize(d)?.map(String::from))
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// `VOICE_CHANNEL_SELECT`: the local user joined (`Some`) or left (`None`)
/// a voice channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceChannelSelect {
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub channel_id: Option<String>,
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcUser {
    #[serde(deserialize_with = "snowflake")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    /// Avatar hash, `None` for users on the default avatar.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Server- and self-imposed mute/deaf flags of one participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VoiceStateFlags {
    pub mute: bool,
    pub deaf: bool,
    pub self_mute: bool,
    pub self_deaf: bool,
    pub suppress: bool,
}

/// Body of `VOICE_STATE_CREATE/UPDATE/DELETE`, and one entry of the
/// `voice_states` roster in a `GET_SELECTED_VOICE_CHANNEL` reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceStatePayload {
    pub user: RpcUser,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub voice_state: VoiceStateFlags,
    /// Not always sent; when present it scopes the event to a channel.
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub channel_id: Option<String>,
}

/// `SPEAKING_START/STOP`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Speaking {
    #[serde(deserialize_with = "snowflake")]
    pub user_id: String,
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub channel_id: Option<String>,
}

/// The local user's own mute/deaf indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct VoiceSettings {
    #[serde(default)]
    pub mute: Option<bool>,
    #[serde(default)]
    pub deaf: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationMessage {
    #[serde(rename = "type", default)]
    pub kind: u64,
    #[serde(default)]
    pub author: Option<RpcUser>,
}

/// `NOTIFICATION_CREATE`. Only the call notification matters here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Notification {
    #[serde(deserialize_with = "snowflake")]
    pub channel_id: String,
    pub message: NotificationMessage,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl Notification {
    /// `true` when this notification announces an incoming call.
    pub fn is_call(&self) -> bool {
        self.message.kind == CALL_MESSAGE_TYPE
    }
}

/// Reply to `GET_SELECTED_VOICE_CHANNEL` when the user is in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectedVoiceChannel {
    #[serde(deserialize_with = "snowflake")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub voice_states: Vec<VoiceStatePayload>,
}

// ---------------------------------------------------------------------------
// RpcEvent
// ---------------------------------------------------------------------------

/// An event or reply relevant to voice and call tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcEvent {
    VoiceChannelSelect(VoiceChannelSelect),
    VoiceStateCreate(VoiceStatePayload),
    VoiceStateUpdate(VoiceStatePayload),
    VoiceStateDelete(VoiceStatePayload),
    SpeakingStart(Speaking),
    SpeakingStop(Speaking),
    VoiceSettingsUpdate(VoiceSettings),
    NotificationCreate(Notification),
    /// Reply to `GET_SELECTED_VOICE_CHANNEL`; `None` when not in a channel.
    SelectedVoiceChannel(Option<SelectedVoiceChannel>),
    /// Reply to `GET_VOICE_SETTINGS`.
    VoiceSettingsReply(VoiceSettings),
}

impl RpcEvent {
    /// Interprets a received message.
    ///
    /// Returns `Ok(None)` for messages that are not modelled (other
    /// events, other replies, remote errors) and `Err` when a modelled
    /// message has an unexpected body.
    pub fn from_message(msg: &IncomingMessage) -> Result<Option<RpcEvent>, ProtocolError> {
        if msg.is_error() {
            return Ok(None);
        }

        match msg.cmd {
            CommandKind::Dispatch => {
                let Some(evt) = msg.evt.as_deref() else {
                    return Ok(None);
                };
                let event = match evt {
                    names::VOICE_CHANNEL_SELECT => RpcEvent::VoiceChannelSelect(parse(&msg.data)?),
                    names::VOICE_STATE_CREATE => RpcEvent::VoiceStateCreate(parse(&msg.data)?),
                    names::VOICE_STATE_UPDATE => RpcEvent::VoiceStateUpdate(parse(&msg.data)?),
                    names::VOICE_STATE_DELETE => RpcEvent::VoiceStateDelete(parse(&msg.data)?),
                    names::SPEAKING_START => RpcEvent::SpeakingStart(parse(&msg.data)?),
                    names::SPEAKING_STOP => RpcEvent::SpeakingStop(parse(&msg.data)?),
                    names::VOICE_SETTINGS_UPDATE => RpcEvent::VoiceSettingsUpdate(parse(&msg.data)?),
                    names::NOTIFICATION_CREATE => RpcEvent::NotificationCreate(parse(&msg.data)?),
                    _ => return Ok(None),
                };
                Ok(Some(event))
            }
            CommandKind::GetSelectedVoiceChannel => {
                let channel = if msg.data.is_null() {
                    None
                } else {
                    Some(parse(&msg.data)?)
                };
                Ok(Some(RpcEvent::SelectedVoiceChannel(channel)))
            }
            CommandKind::GetVoiceSettings => {
                Ok(Some(RpcEvent::VoiceSettingsReply(parse(&msg.data)?)))
            }
            _ => Ok(None),
        }
    }

    /// Event or reply name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            RpcEvent::VoiceChannelSelect(_) => names::VOICE_CHANNEL_SELECT,
            RpcEvent::VoiceStateCreate(_) => names::VOICE_STATE_CREATE,
            RpcEvent::VoiceStateUpdate(_) => names::VOICE_STATE_UPDATE,
            RpcEvent::VoiceStateDelete(_) => names::VOICE_STATE_DELETE,
            RpcEvent::SpeakingStart(_) => names::SPEAKING_START,
            RpcEvent::SpeakingStop(_) => names::SPEAKING_STOP,
            RpcEvent::VoiceSettingsUpdate(_) => names::VOICE_SETTINGS_UPDATE,
            RpcEvent::NotificationCreate(_) => names::NOTIFICATION_CREATE,
            RpcEvent::SelectedVoiceChannel(_) => CommandKind::GetSelectedVoiceChannel.as_str(),
            RpcEvent::VoiceSettingsReply(_) => CommandKind::GetVoiceSettings.as_str(),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(data: &Value) -> Result<T, ProtocolError> {
    T::deserialize(data).map_err(ProtocolError::Decode)
}
