//! Call-state types published to the UI.

use std::collections::BTreeMap;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// One participant of the current voice channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceUserState {
    pub user_id: String,
    /// Server nickname, falling back to the username.
    pub nickname: String,
    /// `None` for users on the default avatar.
    pub avatar_url: Option<String>,
    pub speaking: bool,
    /// Server mute.
    pub muted: bool,
    /// Server deafen.
    pub deafened: bool,
    pub self_muted: bool,
    pub self_deafened: bool,
}

/// The voice channel the local user is in and who else is there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceChannelState {
    pub channel_id: String,
    pub guild_id: Option<String>,
    /// Participants keyed by user id.
    pub users: BTreeMap<String, VoiceUserState>,
}

impl VoiceChannelState {
    pub fn new(channel_id: impl Into<String>, guild_id: Option<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            guild_id,
            users: BTreeMap::new(),
        }
    }

    pub fn user(&self, user_id: &str) -> Option<&VoiceUserState> {
        self.users.get(user_id)
    }

    /// Users currently speaking, in user-id order.
    pub fn speakers(&self) -> impl Iterator<Item = &VoiceUserState> {
        self.users.values().filter(|u| u.speaking)
    }
}

// ---------------------------------------------------------------------------
// Ringing
// ---------------------------------------------------------------------------

/// Who is calling, as shown in the call notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerInfo {
    pub title: String,
    pub body: String,
    pub icon_url: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// An incoming call not yet answered or declined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RingingCall {
    pub channel_id: String,
    pub caller: CallerInfo,
}

/// How the most recent incoming call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RingOutcome {
    /// The local user joined the calling channel.
    Answered,
    /// The caller hung up, or the user dismissed it.
    Declined,
    /// Nobody reacted within the ring timeout, or the user went elsewhere.
    Missed,
}

// ---------------------------------------------------------------------------
// Call mode and snapshot
// ---------------------------------------------------------------------------

/// What the local user is doing, call-wise.
///
/// Ringing and in-call are exclusive; a roster exists only in
/// [`CallMode::InCall`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CallMode {
    #[default]
    Idle,
    Ringing(RingingCall),
    InCall(VoiceChannelState),
}

impl CallMode {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn ringing(&self) -> Option<&RingingCall> {
        match self {
            Self::Ringing(call) => Some(call),
            _ => None,
        }
    }

    pub fn channel(&self) -> Option<&VoiceChannelState> {
        match self {
            Self::InCall(channel) => Some(channel),
            _ => None,
        }
    }
}

/// The local user's own mute/deafen indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LocalVoiceSettings {
    pub muted: bool,
    pub deafened: bool,
}

/// Everything the UI needs to draw the call widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallSnapshot {
    pub mode: CallMode,
    pub settings: LocalVoiceSettings,
    pub last_ring_outcome: Option<RingOutcome>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn user(id: &str, speaking: bool) -> VoiceUserState {
        VoiceUserState {
            user_id: id.into(),
            nickname: id.into(),
            avatar_url: None,
            speaking,
            muted: false,
            deafened: false,
            self_muted: false,
            self_deafened: false,
        }
    }

    #[test]
    fn test_call_mode_serializes_with_mode_tag() {
        let value = serde_json::to_value(CallMode::Idle).unwrap();
        assert_eq!(value, json!({"mode": "idle"}));

        let ringing = CallMode::Ringing(RingingCall {
            channel_id: "5".into(),
            caller: CallerInfo {
                title: "ana".into(),
                body: "Incoming call".into(),
                icon_url: None,
                user_id: None,
                username: None,
                avatar_url: None,
            },
        });
        let value = serde_json::to_value(ringing).unwrap();
        assert_eq!(value["mode"], "ringing");
        assert_eq!(value["channel_id"], "5");
    }

    #[test]
    fn test_speakers_lists_only_speaking_users() {
        let mut channel = VoiceChannelState::new("5", None);
        channel.users.insert("a".into(), user("a", true));
        channel.users.insert("b".into(), user("b", false));

        let speakers: Vec<&str> = channel.speakers().map(|u| u.user_id.as_str()).collect();
        assert_eq!(speakers, vec!["a"]);
    }

    #[test]
    fn test_call_mode_accessors() {
        let mode = CallMode::InCall(VoiceChannelState::new("5", None));
        assert!(mode.channel().is_some());
        assert!(mode.ringing().is_none());
        assert!(!mode.is_idle());
        assert!(CallMode::default().is_idle());
    }
}
