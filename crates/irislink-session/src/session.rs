//! Session state machine and configuration.

use std::fmt;

use irislink_protocol::{DEFAULT_MAX_FRAME_LEN, names};
use irislink_transport::{EndpointConfig, ReconnectPolicy};

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where the session is in its connect/handshake/auth sequence.
///
/// ```text
/// Disconnected → Connecting → Handshaking → Authorizing ─┬─────────────────────────────┐
///                                                        ↓                             ↓
///                                            AwaitingUserCode → ExchangingToken → Authenticating
///                                                                                      ↓
///                                                                  Ready ← Subscribing ┘
/// ```
///
/// Any stage can fall into `Reconnecting` (connection lost, error frame
/// before `Ready`) or `Errored` (authorization refused, too many auth
/// attempts, reconnect policy exhausted). `Reconnecting` always leads
/// back to `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    Authorizing,
    AwaitingUserCode,
    ExchangingToken,
    Authenticating,
    Subscribing,
    Ready,
    Errored,
    Reconnecting,
}

impl SessionState {
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// `true` between the handshake and `Ready`, where an error frame
    /// restarts the connection instead of being merely reported.
    pub fn is_handshake_stage(self) -> bool {
        matches!(
            self,
            Self::Handshaking
                | Self::Authorizing
                | Self::AwaitingUserCode
                | Self::ExchangingToken
                | Self::Authenticating
                | Self::Subscribing
        )
    }

    /// `true` while a live connection exists.
    pub fn is_connected(self) -> bool {
        self.is_handshake_stage() || self.is_ready()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Handshaking => "Handshaking",
            Self::Authorizing => "Authorizing",
            Self::AwaitingUserCode => "AwaitingUserCode",
            Self::ExchangingToken => "ExchangingToken",
            Self::Authenticating => "Authenticating",
            Self::Subscribing => "Subscribing",
            Self::Ready => "Ready",
            Self::Errored => "Errored",
            Self::Reconnecting => "Reconnecting",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// OAuth scopes requested by `AUTHORIZE` unless overridden.
pub const DEFAULT_SCOPES: &[&str] = &[
    "rpc",
    "rpc.notifications.read",
    "rpc.voice.write",
    "rpc.voice.read",
    "messages.read",
];

/// Events subscribed once the session is authenticated.
pub const DEFAULT_SUBSCRIPTIONS: &[&str] = &[
    names::NOTIFICATION_CREATE,
    names::VOICE_CHANNEL_SELECT,
    names::VOICE_SETTINGS_UPDATE,
];

/// Settings for one RPC session.
///
/// Build with [`SessionConfig::new`] and override fields as needed.
/// Out-of-range numbers are clamped by [`validated`](Self::validated)
/// when the session starts.
#[derive(Clone)]
pub struct SessionConfig {
    /// Application id registered with the chat client.
    pub client_id: String,
    /// Application secret, used only against the OAuth endpoint.
    pub client_secret: String,
    pub scopes: Vec<String>,
    /// `v` sent in the handshake.
    pub protocol_version: u32,
    /// Events added to the subscription registry when authentication
    /// succeeds.
    pub default_subscriptions: Vec<String>,
    pub reconnect: ReconnectPolicy,
    pub endpoint: EndpointConfig,
    /// Authorization flows (AUTHORIZE plus code exchange) allowed per
    /// connection before the session gives up with `Errored`.
    pub max_authorize_attempts: u32,
    /// Largest frame payload accepted from the chat client.
    pub max_frame_len: usize,
    /// Capacity of the command channel in front of the session task.
    pub command_buffer: usize,
}

impl SessionConfig {
    pub const MAX_AUTHORIZE_ATTEMPTS: u32 = 10;
    pub const MIN_FRAME_LEN: usize = 4 * 1024;

    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    /// Checks the fields that can't be fixed by clamping.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.client_id.trim().is_empty() {
            return Err(SessionError::InvalidConfig("client_id is empty".into()));
        }
        if self.client_secret.is_empty() {
            return Err(SessionError::InvalidConfig("client_secret is empty".into()));
        }
        Ok(())
    }

    /// Clamps numeric fields into their supported ranges.
    pub fn validated(mut self) -> Self {
        if self.max_authorize_attempts == 0 || self.max_authorize_attempts > Self::MAX_AUTHORIZE_ATTEMPTS {
            let clamped = self.max_authorize_attempts.clamp(1, Self::MAX_AUTHORIZE_ATTEMPTS);
            tracing::warn!(
                max_authorize_attempts = self.max_authorize_attempts,
                clamped,
                "max_authorize_attempts out of range, clamping"
            );
            self.max_authorize_attempts = clamped;
        }
        if self.max_frame_len < Self::MIN_FRAME_LEN {
            tracing::warn!(
                max_frame_len = self.max_frame_len,
                clamped = Self::MIN_FRAME_LEN,
                "max_frame_len too small, clamping"
            );
            self.max_frame_len = Self::MIN_FRAME_LEN;
        }
        if self.command_buffer == 0 {
            tracing::warn!("command_buffer is 0, using 1");
            self.command_buffer = 1;
        }
        self.endpoint = self.endpoint.validated();
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            protocol_version: 1,
            default_subscriptions: DEFAULT_SUBSCRIPTIONS.iter().map(|s| s.to_string()).collect(),
            reconnect: ReconnectPolicy::default(),
            endpoint: EndpointConfig::default(),
            max_authorize_attempts: 3,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            command_buffer: 64,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("protocol_version", &self.protocol_version)
            .field("default_subscriptions", &self.default_subscriptions)
            .field("reconnect", &self.reconnect)
            .field("endpoint", &self.endpoint)
            .field("max_authorize_attempts", &self.max_authorize_attempts)
            .field("max_frame_len", &self.max_frame_len)
            .field("command_buffer", &self.command_buffer)
            .finish()
    }
}
