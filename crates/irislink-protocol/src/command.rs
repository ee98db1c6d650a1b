//! Outgoing commands.
//!
//! [`RpcCommand`] is the closed set of things this library can ask the
//! chat client to do. Each variant knows its wire name and its argument
//! shape, so nothing upstream builds command JSON by hand.

use serde::Serialize;
use serde_json::Value;

use crate::codec::FrameCodec;
use crate::{CommandKind, Nonce, Opcode, OutgoingCommand, ProtocolError};

/// The first frame on a fresh connection (opcode HANDSHAKE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handshake {
    pub v: u32,
    pub client_id: String,
    pub nonce: Nonce,
}

impl Handshake {
    pub fn new(version: u32, client_id: impl Into<String>) -> Self {
        Self {
            v: version,
            client_id: client_id.into(),
            nonce: Nonce::generate(),
        }
    }

    /// Encodes the handshake as a complete frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        FrameCodec::encode(Opcode::Handshake, self)
    }
}

/// Arguments of `AUTHORIZE`: asks the user to grant `scopes` to the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizeArgs {
    pub client_id: String,
    pub scopes: Vec<String>,
}

/// Arguments of `AUTHENTICATE`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticateArgs {
    pub access_token: String,
}

impl std::fmt::Debug for AuthenticateArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateArgs")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Arguments of `SET_VOICE_SETTINGS`. Unset fields are left untouched
/// by the chat client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoiceSettingsArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deaf: Option<bool>,
}

/// Arguments of `SELECT_VOICE_CHANNEL`. `channel_id: None` leaves the
/// current channel and is sent as an explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectVoiceChannelArgs {
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
}

/// Every command the session can send over a MESSAGE frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcCommand {
    Authorize(AuthorizeArgs),
    Authenticate(AuthenticateArgs),
    Subscribe { evt: String, args: Option<Value> },
    Unsubscribe { evt: String, args: Option<Value> },
    SetVoiceSettings(VoiceSettingsArgs),
    SelectVoiceChannel(SelectVoiceChannelArgs),
    SelectTextChannel { channel_id: String },
    GetVoiceSettings,
    GetSelectedVoiceChannel,
}

impl RpcCommand {
    pub fn subscribe(evt: impl Into<String>, args: Option<Value>) -> Self {
        RpcCommand::Subscribe {
            evt: evt.into(),
            args,
        }
    }

    pub fn unsubscribe(evt: impl Into<String>, args: Option<Value>) -> Self {
        RpcCommand::Unsubscribe {
            evt: evt.into(),
            args,
        }
    }

    /// The `cmd` value this command is sent with.
    pub fn kind(&self) -> CommandKind {
        match self {
            RpcCommand::Authorize(_) => CommandKind::Authorize,
            RpcCommand::Authenticate(_) => CommandKind::Authenticate,
            RpcCommand::Subscribe { .. } => CommandKind::Subscribe,
            RpcCommand::Unsubscribe { .. } => CommandKind::Unsubscribe,
            RpcCommand::SetVoiceSettings(_) => CommandKind::SetVoiceSettings,
            RpcCommand::SelectVoiceChannel(_) => CommandKind::SelectVoiceChannel,
            RpcCommand::SelectTextChannel { .. } => CommandKind::SelectTextChannel,
            RpcCommand::GetVoiceSettings => CommandKind::GetVoiceSettings,
            RpcCommand::GetSelectedVoiceChannel => CommandKind::GetSelectedVoiceChannel,
        }
    }

    /// Builds the JSON envelope, tagging it with `nonce`.
    pub fn into_envelope(self, nonce: Nonce) -> Result<OutgoingCommand, ProtocolError> {
        let cmd = self.kind();
        let (evt, args) = match self {
            RpcCommand::Authorize(args) => (None, Some(to_value(&args)?)),
            RpcCommand::Authenticate(args) => (None, Some(to_value(&args)?)),
            RpcCommand::Subscribe { evt, args } | RpcCommand::Unsubscribe { evt, args } => {
                (Some(evt), args)
            }
            RpcCommand::SetVoiceSettings(args) => (None, Some(to_value(&args)?)),
            RpcCommand::SelectVoiceChannel(args) => (None, Some(to_value(&args)?)),
            RpcCommand::SelectTextChannel { channel_id } => {
                (None, Some(serde_json::json!({ "channel_id": channel_id })))
            }
            RpcCommand::GetVoiceSettings | RpcCommand::GetSelectedVoiceChannel => (None, None),
        };
        Ok(OutgoingCommand {
            cmd,
            nonce,
            evt,
            args,
        })
    }

    /// Encodes the command as a complete MESSAGE frame.
    pub fn encode(self, nonce: Nonce) -> Result<Vec<u8>, ProtocolError> {
        let envelope = self.into_envelope(nonce)?;
        FrameCodec::encode(Opcode::Message, &envelope)
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(ProtocolError::Encode)
}
