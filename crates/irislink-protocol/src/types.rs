//! Core wire types: opcodes, frames, nonces, and the JSON envelope shared
//! by commands and their replies.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Opcode
// ---------------------------------------------------------------------------

/// The first header field of every frame.
///
/// Commands, replies, and events all travel as [`Opcode::Message`]. The
/// chat client also sends keep-alive pings that must be answered with a
/// pong carrying the same payload. Anything else is kept as
/// [`Opcode::Unknown`] so the caller can log it instead of losing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Handshake,
    Message,
    Error,
    Ping,
    Pong,
    Unknown(u32),
}

impl Opcode {
    /// The numeric value written to the header.
    pub fn as_u32(self) -> u32 {
        match self {
            Opcode::Handshake => 0,
            Opcode::Message => 1,
            Opcode::Error => 2,
            Opcode::Ping => 3,
            Opcode::Pong => 4,
            Opcode::Unknown(n) => n,
        }
    }
}

impl From<u32> for Opcode {
    fn from(value: u32) -> Self {
        match value {
            0 => Opcode::Handshake,
            1 => Opcode::Message,
            2 => Opcode::Error,
            3 => Opcode::Ping,
            4 => Opcode::Pong,
            n => Opcode::Unknown(n),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Handshake => f.write_str("HANDSHAKE"),
            Opcode::Message => f.write_str("MESSAGE"),
            Opcode::Error => f.write_str("ERROR"),
            Opcode::Ping => f.write_str("PING"),
            Opcode::Pong => f.write_str("PONG"),
            Opcode::Unknown(n) => write!(f, "UNKNOWN({n})"),
        }
    }
}

/// One decoded frame: the opcode plus its parsed JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Value,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: Value) -> Self {
        Self { opcode, payload }
    }
}

// ---------------------------------------------------------------------------
// Nonce
// ---------------------------------------------------------------------------

/// Correlation token attached to every outgoing command.
///
/// The chat client echoes it on the reply. It is a 32-character hex
/// string (128 random bits), so two commands never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Generates a fresh random nonce.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let bytes: [u8; 16] = rng.random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Nonce {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Command names
// ---------------------------------------------------------------------------

/// The `cmd` field of a message.
///
/// `Dispatch` marks unsolicited events (READY, voice updates, ...). Every
/// other value is either a command we sent or the reply to one. Names we
/// don't model deserialize as `Unknown` instead of failing the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Dispatch,
    Authorize,
    Authenticate,
    Subscribe,
    Unsubscribe,
    SetVoiceSettings,
    SelectVoiceChannel,
    SelectTextChannel,
    GetVoiceSettings,
    GetSelectedVoiceChannel,
    #[serde(other)]
    Unknown,
}

impl CommandKind {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Dispatch => "DISPATCH",
            CommandKind::Authorize => "AUTHORIZE",
            CommandKind::Authenticate => "AUTHENTICATE",
            CommandKind::Subscribe => "SUBSCRIBE",
            CommandKind::Unsubscribe => "UNSUBSCRIBE",
            CommandKind::SetVoiceSettings => "SET_VOICE_SETTINGS",
            CommandKind::SelectVoiceChannel => "SELECT_VOICE_CHANNEL",
            CommandKind::SelectTextChannel => "SELECT_TEXT_CHANNEL",
            CommandKind::GetVoiceSettings => "GET_VOICE_SETTINGS",
            CommandKind::GetSelectedVoiceChannel => "GET_SELECTED_VOICE_CHANNEL",
            CommandKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// An outgoing command as it appears in a MESSAGE frame.
///
/// Built from an [`RpcCommand`](crate::RpcCommand); not usually
/// constructed by hand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingCommand {
    pub cmd: CommandKind,
    pub nonce: Nonce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// A MESSAGE frame received from the chat client.
///
/// Events carry `cmd = DISPATCH` and an `evt` name. Replies carry the
/// command name and the nonce we sent; a failed command comes back with
/// `evt = "ERROR"` and `{code, message}` in `data`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncomingMessage {
    pub cmd: CommandKind,
    #[serde(default)]
    pub evt: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl IncomingMessage {
    /// Parses a MESSAGE payload.
    pub fn from_payload(payload: Value) -> Result<Self, crate::ProtocolError> {
        serde_json::from_value(payload).map_err(crate::ProtocolError::Decode)
    }

    pub fn is_dispatch(&self) -> bool {
        self.cmd == CommandKind::Dispatch
    }

    /// `true` for a DISPATCH carrying the given event name.
    pub fn is_event(&self, name: &str) -> bool {
        self.is_dispatch() && self.evt.as_deref() == Some(name)
    }

    /// `true` when the chat client is reporting a failed command.
    pub fn is_error(&self) -> bool {
        self.evt.as_deref() == Some("ERROR")
    }

    /// The remote error carried by this message, if it is one.
    pub fn remote_error(&self) -> Option<RemoteError> {
        self.is_error().then(|| RemoteError::from_value(&self.data))
    }
}

/// Error details sent by the chat client, either inside an ERROR frame or
/// in the `data` of a message with `evt = "ERROR"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl RemoteError {
    /// Reads `{code, message}` out of an arbitrary payload. Missing or
    /// mistyped fields become `0` and `""` rather than an error, since
    /// the point is to report the failure, not to fail again.
    pub fn from_value(value: &Value) -> Self {
        let code = value.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self { code, message }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}
