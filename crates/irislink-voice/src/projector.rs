//! Reconstructs "who is in the call, who is talking, am I being called"
//! from the chat client's event stream.
//!
//! The chat client never sends the whole picture. It sends a trickle of
//! unordered, sometimes duplicated events (a participant joined, someone
//! started speaking, a notification arrived), and answers explicit
//! queries when asked. [`CallStateProjector`] folds them into one
//! [`CallSnapshot`].
//!
//! The projector does no I/O. When it needs something from the chat
//! client (a roster refresh, channel-scoped subscriptions) it returns
//! [`CallEffect`]s and leaves sending them to the caller. Time is passed
//! in too, so ringing expiry can be tested on a paused clock.
//!
//! ```text
//!            call notification            select(same channel)
//!   Idle ───────────────────────→ Ringing ──────────────────────→ InCall
//!    ↑  ←── caller hangs up / 30 s ──┘                              │
//!    └──────────────────────── select(null) ────────────────────────┘
//! ```

use irislink_protocol::{
    IncomingMessage, Notification, RpcEvent, SelectedVoiceChannel, Speaking, VoiceSettings,
    VoiceStatePayload, names,
};
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::{
    CallMode, CallSnapshot, CallerInfo, LocalVoiceSettings, ProjectorConfig, RingOutcome,
    RingingCall, VoiceChannelState, VoiceUserState,
};

/// Events subscribed per channel while in a call.
pub const CHANNEL_SCOPED_EVENTS: [&str; 5] = [
    names::VOICE_STATE_CREATE,
    names::VOICE_STATE_UPDATE,
    names::VOICE_STATE_DELETE,
    names::SPEAKING_START,
    names::SPEAKING_STOP,
];

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Something the projector needs the session to do.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEffect {
    Subscribe { event: &'static str, args: Value },
    Unsubscribe { event: &'static str, args: Value },
    /// Send `GET_SELECTED_VOICE_CHANNEL`.
    RequestSelectedChannel,
    /// Send `GET_VOICE_SETTINGS`.
    RequestVoiceSettings,
}

fn channel_args(channel_id: &str) -> Value {
    json!({ "channel_id": channel_id })
}

fn subscribe_scope(channel_id: &str, effects: &mut Vec<CallEffect>) {
    effects.extend(CHANNEL_SCOPED_EVENTS.iter().map(|&event| CallEffect::Subscribe {
        event,
        args: channel_args(channel_id),
    }));
}

fn unsubscribe_scope(channel_id: &str, effects: &mut Vec<CallEffect>) {
    effects.extend(CHANNEL_SCOPED_EVENTS.iter().map(|&event| CallEffect::Unsubscribe {
        event,
        args: channel_args(channel_id),
    }));
}

fn unsubscribe_ring(channel_id: &str) -> CallEffect {
    CallEffect::Unsubscribe {
        event: names::VOICE_STATE_DELETE,
        args: channel_args(channel_id),
    }
}

// ---------------------------------------------------------------------------
// Projector
// ---------------------------------------------------------------------------

/// Pure reducer from chat-client events to [`CallSnapshot`].
#[derive(Debug)]
pub struct CallStateProjector {
    config: ProjectorConfig,
    mode: CallMode,
    settings: LocalVoiceSettings,
    ring_started: Option<Instant>,
    last_ring_outcome: Option<RingOutcome>,
}

impl CallStateProjector {
    pub fn new(config: ProjectorConfig) -> Self {
        Self {
            config: config.validated(),
            mode: CallMode::Idle,
            settings: LocalVoiceSettings::default(),
            ring_started: None,
            last_ring_outcome: None,
        }
    }

    pub fn mode(&self) -> &CallMode {
        &self.mode
    }

    pub fn settings(&self) -> LocalVoiceSettings {
        self.settings
    }

    pub fn last_ring_outcome(&self) -> Option<RingOutcome> {
        self.last_ring_outcome
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            mode: self.mode.clone(),
            settings: self.settings,
            last_ring_outcome: self.last_ring_outcome,
        }
    }

    /// When the current ring gives up, if something is ringing.
    pub fn ringing_deadline(&self) -> Option<Instant> {
        if self.mode.ringing().is_none() {
            return None;
        }
        self.ring_started.map(|t| t + self.config.ring_timeout)
    }

    /// Applies a raw message from the session. Messages that are not
    /// about voice or calls are ignored.
    pub fn apply_message(&mut self, msg: &IncomingMessage, now: Instant) -> Vec<CallEffect> {
        match RpcEvent::from_message(msg) {
            Ok(Some(event)) => self.apply(&event, now),
            Ok(None) => self.expire(now),
            Err(e) => {
                tracing::warn!(
                    cmd = %msg.cmd,
                    evt = msg.evt.as_deref().unwrap_or(""),
                    error = %e,
                    "ignoring voice event with unexpected body"
                );
                self.expire(now)
            }
        }
    }

    /// Applies one event. An overdue ring is expired first.
    pub fn apply(&mut self, event: &RpcEvent, now: Instant) -> Vec<CallEffect> {
        let mut effects = self.expire(now);
        tracing::trace!(event = event.name(), "call state event");

        match event {
            RpcEvent::NotificationCreate(notification) => {
                self.on_notification(notification, now, &mut effects);
            }
            RpcEvent::VoiceChannelSelect(select) => match &select.channel_id {
                Some(channel_id) => {
                    self.enter_channel(channel_id, select.guild_id.clone(), true, &mut effects);
                }
                None => self.leave(&mut effects),
            },
            RpcEvent::SelectedVoiceChannel(Some(channel)) => {
                self.enter_channel(&channel.id, channel.guild_id.clone(), false, &mut effects);
                self.seed_roster(channel);
            }
            RpcEvent::SelectedVoiceChannel(None) => {
                if self.mode.channel().is_some() {
                    self.leave(&mut effects);
                }
            }
            RpcEvent::VoiceStateCreate(state) | RpcEvent::VoiceStateUpdate(state) => {
                self.upsert_user(state);
            }
            RpcEvent::VoiceStateDelete(state) => self.on_voice_state_delete(state, &mut effects),
            RpcEvent::SpeakingStart(speaking) => self.set_speaking(speaking, true),
            RpcEvent::SpeakingStop(speaking) => self.set_speaking(speaking, false),
            RpcEvent::VoiceSettingsUpdate(settings) | RpcEvent::VoiceSettingsReply(settings) => {
                self.update_settings(settings);
            }
        }

        effects
    }

    /// Ends a ring that has outlived `ring_timeout`.
    pub fn expire(&mut self, now: Instant) -> Vec<CallEffect> {
        let Some(deadline) = self.ringing_deadline() else {
            return Vec::new();
        };
        if now < deadline {
            return Vec::new();
        }
        let Some(call) = self.mode.ringing() else {
            return Vec::new();
        };

        let channel_id = call.channel_id.clone();
        tracing::info!(%channel_id, "call not answered in time");
        self.mode = CallMode::Idle;
        self.finish_ring(RingOutcome::Missed);
        vec![unsubscribe_ring(&channel_id)]
    }

    /// Called when the session (re)reaches `Ready`: resync from the
    /// chat client instead of trusting what we had.
    pub fn on_session_ready(&self) -> Vec<CallEffect> {
        vec![CallEffect::RequestSelectedChannel, CallEffect::RequestVoiceSettings]
    }

    /// Called when the connection is lost. Everything known about the
    /// call is stale.
    pub fn reset(&mut self) -> Vec<CallEffect> {
        let mut effects = Vec::new();
        match std::mem::take(&mut self.mode) {
            CallMode::Idle => {}
            CallMode::Ringing(call) => {
                effects.push(unsubscribe_ring(&call.channel_id));
                self.finish_ring(RingOutcome::Missed);
            }
            CallMode::InCall(channel) => unsubscribe_scope(&channel.channel_id, &mut effects),
        }
        effects
    }

    // -- Transitions ------------------------------------------------------

    fn on_notification(&mut self, n: &Notification, now: Instant, effects: &mut Vec<CallEffect>) {
        if !n.is_call() {
            return;
        }
        match &self.mode {
            CallMode::Idle => {}
            CallMode::Ringing(call) if call.channel_id == n.channel_id => {
                tracing::debug!(channel_id = %n.channel_id, "duplicate call notification");
                return;
            }
            _ => {
                tracing::debug!(channel_id = %n.channel_id, "busy, ignoring call notification");
                return;
            }
        }

        let author = n.message.author.as_ref();
        let caller = CallerInfo {
            title: n.title.clone(),
            body: n.body.clone(),
            icon_url: n.icon_url.clone(),
            user_id: author.map(|a| a.id.clone()),
            username: author.map(|a| a.username.clone()),
            avatar_url: author.and_then(|a| self.config.avatar_url(a)),
        };
        tracing::info!(channel_id = %n.channel_id, caller = %caller.title, "incoming call");

        self.mode = CallMode::Ringing(RingingCall {
            channel_id: n.channel_id.clone(),
            caller,
        });
        self.ring_started = Some(now);
        effects.push(CallEffect::Subscribe {
            event: names::VOICE_STATE_DELETE,
            args: channel_args(&n.channel_id),
        });
    }

    /// Moves into `channel_id`. A no-op if already there.
    fn enter_channel(
        &mut self,
        channel_id: &str,
        guild_id: Option<String>,
        request_roster: bool,
        effects: &mut Vec<CallEffect>,
    ) {
        if let CallMode::InCall(current) = &mut self.mode {
            if current.channel_id == channel_id {
                if guild_id.is_some() {
                    current.guild_id = guild_id;
                }
                return;
            }
        }

        match std::mem::take(&mut self.mode) {
            CallMode::Idle => {}
            CallMode::Ringing(call) => {
                if call.channel_id == channel_id {
                    self.finish_ring(RingOutcome::Answered);
                } else {
                    effects.push(unsubscribe_ring(&call.channel_id));
                    self.finish_ring(RingOutcome::Missed);
                }
            }
            CallMode::InCall(previous) => unsubscribe_scope(&previous.channel_id, effects),
        }

        tracing::info!(%channel_id, "in voice channel");
        self.mode = CallMode::InCall(VoiceChannelState::new(channel_id, guild_id));
        subscribe_scope(channel_id, effects);
        if request_roster {
            effects.push(CallEffect::RequestSelectedChannel);
            effects.push(CallEffect::RequestVoiceSettings);
        }
    }

    fn leave(&mut self, effects: &mut Vec<CallEffect>) {
        match std::mem::take(&mut self.mode) {
            CallMode::Idle => {}
            CallMode::Ringing(call) => {
                effects.push(unsubscribe_ring(&call.channel_id));
                self.finish_ring(RingOutcome::Declined);
            }
            CallMode::InCall(channel) => {
                tracing::info!(channel_id = %channel.channel_id, "left voice channel");
                unsubscribe_scope(&channel.channel_id, effects);
            }
        }
    }

    fn finish_ring(&mut self, outcome: RingOutcome) {
        tracing::debug!(?outcome, "ring finished");
        self.ring_started = None;
        self.last_ring_outcome = Some(outcome);
    }

    // -- Roster -----------------------------------------------------------

    fn seed_roster(&mut self, channel: &SelectedVoiceChannel) {
        let CallMode::InCall(state) = &mut self.mode else {
            return;
        };
        let users = channel
            .voice_states
            .iter()
            .map(|p| {
                let speaking = state.users.get(&p.user.id).is_some_and(|u| u.speaking);
                (p.user.id.clone(), voice_user(&self.config, p, speaking))
            })
            .collect();
        state.users = users;
        tracing::debug!(channel_id = %state.channel_id, users = state.users.len(), "roster seeded");
    }

    fn upsert_user(&mut self, payload: &VoiceStatePayload) {
        let Some(state) = in_channel(&mut self.mode, payload.channel_id.as_deref()) else {
            tracing::trace!(user_id = %payload.user.id, "voice state outside the current call");
            return;
        };
        let speaking = state.users.get(&payload.user.id).is_some_and(|u| u.speaking);
        state
            .users
            .insert(payload.user.id.clone(), voice_user(&self.config, payload, speaking));
    }

    fn on_voice_state_delete(&mut self, payload: &VoiceStatePayload, effects: &mut Vec<CallEffect>) {
        let ended_ring = match &self.mode {
            CallMode::Ringing(call)
                if payload.channel_id.as_deref().is_none_or(|c| c == call.channel_id) =>
            {
                Some(call.channel_id.clone())
            }
            _ => None,
        };

        if let Some(channel_id) = ended_ring {
            tracing::info!(%channel_id, "caller hung up before answer");
            self.mode = CallMode::Idle;
            effects.push(unsubscribe_ring(&channel_id));
            self.finish_ring(RingOutcome::Declined);
            return;
        }

        if let Some(state) = in_channel(&mut self.mode, payload.channel_id.as_deref()) {
            state.users.remove(&payload.user.id);
        }
    }

    fn set_speaking(&mut self, speaking: &Speaking, on: bool) {
        let user = in_channel(&mut self.mode, speaking.channel_id.as_deref())
            .and_then(|state| state.users.get_mut(&speaking.user_id));
        match user {
            Some(user) => user.speaking = on,
            None => tracing::trace!(user_id = %speaking.user_id, "speaking event for unknown user"),
        }
    }

    fn update_settings(&mut self, settings: &VoiceSettings) {
        if let Some(mute) = settings.mute {
            self.settings.muted = mute;
        }
        if let Some(deaf) = settings.deaf {
            self.settings.deafened = deaf;
        }
    }
}

impl Default for CallStateProjector {
    fn default() -> Self {
        Self::new(ProjectorConfig::default())
    }
}

/// The roster, if in a call and `channel_id` (when given) is that call.
fn in_channel<'a>(mode: &'a mut CallMode, channel_id: Option<&str>) -> Option<&'a mut VoiceChannelState> {
    match mode {
        CallMode::InCall(state) if channel_id.is_none_or(|c| c == state.channel_id) => Some(state),
        _ => None,
    }
}

fn voice_user(config: &ProjectorConfig, payload: &VoiceStatePayload, speaking: bool) -> VoiceUserState {
    let nickname = payload
        .nick
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| payload.user.username.clone());
    VoiceUserState {
        user_id: payload.user.id.clone(),
        nickname,
        avatar_url: config.avatar_url(&payload.user),
        speaking,
        muted: payload.voice_state.mute,
        deafened: payload.voice_state.deaf,
        self_muted: payload.voice_state.self_mute,
        self_deafened: payload.voice_state.self_deaf,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use irislink_protocol::{NotificationMessage, RpcUser, VoiceChannelSelect, CALL_MESSAGE_TYPE};

    use super::*;

    fn call_notification(channel_id: &str) -> RpcEvent {
        RpcEvent::NotificationCreate(Notification {
            channel_id: channel_id.into(),
            message: NotificationMessage {
                kind: CALL_MESSAGE_TYPE,
                author: Some(RpcUser {
                    id: "7".into(),
                    username: "ana".into(),
                    avatar: Some("hash".into()),
                }),
            },
            icon_url: None,
            title: "ana".into(),
            body: "Incoming call".into(),
        })
    }

    fn select(channel_id: Option<&str>) -> RpcEvent {
        RpcEvent::VoiceChannelSelect(VoiceChannelSelect {
            channel_id: channel_id.map(str::to_string),
            guild_id: None,
        })
    }

    #[test]
    fn test_apply_call_notification_subscribes_hangup_scope() {
        let mut projector = CallStateProjector::default();
        let now = Instant::now();

        let effects = projector.apply(&call_notification("5"), now);

        assert_eq!(
            effects,
            vec![CallEffect::Subscribe {
                event: names::VOICE_STATE_DELETE,
                args: json!({"channel_id": "5"})
            }]
        );
        let call = projector.mode().ringing().unwrap();
        assert_eq!(call.caller.username.as_deref(), Some("ana"));
        assert_eq!(
            call.caller.avatar_url.as_deref(),
            Some("https://cdn.discordapp.com/avatars/7/hash?size=1024")
        );
        assert_eq!(projector.ringing_deadline(), Some(now + Duration::from_secs(30)));
    }

    #[test]
    fn test_apply_non_call_notification_is_ignored() {
        let mut projector = CallStateProjector::default();
        let RpcEvent::NotificationCreate(mut n) = call_notification("5") else {
            unreachable!()
        };
        n.message.kind = 0;

        let effects = projector.apply(&RpcEvent::NotificationCreate(n), Instant::now());

        assert!(effects.is_empty());
        assert!(projector.mode().is_idle());
    }

    #[test]
    fn test_apply_select_while_idle_requests_roster_and_scope() {
        let mut projector = CallStateProjector::default();

        let effects = projector.apply(&select(Some("5")), Instant::now());

        let subscribed: Vec<&str> = effects
            .iter()
            .filter_map(|e| match e {
                CallEffect::Subscribe { event, args } => {
                    assert_eq!(args, &json!({"channel_id": "5"}));
                    Some(*event)
                }
                _ => None,
            })
            .collect();
        assert_eq!(subscribed, CHANNEL_SCOPED_EVENTS.to_vec());
        assert!(effects.contains(&CallEffect::RequestSelectedChannel));
        assert!(effects.contains(&CallEffect::RequestVoiceSettings));
    }

    #[test]
    fn test_apply_answer_keeps_hangup_subscription() {
        let mut projector = CallStateProjector::default();
        let now = Instant::now();
        projector.apply(&call_notification("5"), now);

        let effects = projector.apply(&select(Some("5")), now);

        assert!(!effects.iter().any(|e| matches!(e, CallEffect::Unsubscribe { .. })));
        assert_eq!(projector.last_ring_outcome(), Some(RingOutcome::Answered));
        assert_eq!(projector.ringing_deadline(), None);
    }

    #[test]
    fn test_apply_select_other_channel_while_ringing_misses_call() {
        let mut projector = CallStateProjector::default();
        let now = Instant::now();
        projector.apply(&call_notification("5"), now);

        let effects = projector.apply(&select(Some("6")), now);

        assert!(effects.contains(&unsubscribe_ring("5")));
        assert_eq!(projector.last_ring_outcome(), Some(RingOutcome::Missed));
        assert_eq!(projector.mode().channel().unwrap().channel_id, "6");
    }

    #[test]
    fn test_apply_switch_channel_moves_scope() {
        let mut projector = CallStateProjector::default();
        let now = Instant::now();
        projector.apply(&select(Some("5")), now);

        let effects = projector.apply(&select(Some("6")), now);

        assert!(effects.contains(&CallEffect::Unsubscribe {
            event: names::SPEAKING_START,
            args: json!({"channel_id": "5"})
        }));
        assert!(effects.contains(&CallEffect::Subscribe {
            event: names::SPEAKING_START,
            args: json!({"channel_id": "6"})
        }));
    }

    #[test]
    fn test_reset_in_call_unsubscribes_scope() {
        let mut projector = CallStateProjector::default();
        projector.apply(&select(Some("5")), Instant::now());

        let effects = projector.reset();

        assert_eq!(effects.len(), CHANNEL_SCOPED_EVENTS.len());
        assert!(projector.mode().is_idle());
    }

    #[test]
    fn test_on_session_ready_requests_resync() {
        let projector = CallStateProjector::default();
        assert_eq!(
            projector.on_session_ready(),
            vec![CallEffect::RequestSelectedChannel, CallEffect::RequestVoiceSettings]
        );
    }

    #[test]
    fn test_apply_settings_update_merges_present_fields() {
        let mut projector = CallStateProjector::default();
        let now = Instant::now();

        projector.apply(
            &RpcEvent::VoiceSettingsReply(VoiceSettings {
                mute: Some(true),
                deaf: Some(true),
            }),
            now,
        );
        projector.apply(
            &RpcEvent::VoiceSettingsUpdate(VoiceSettings {
                mute: None,
                deaf: Some(false),
            }),
            now,
        );

        assert_eq!(
            projector.settings(),
            LocalVoiceSettings {
                muted: true,
                deafened: false
            }
        );
    }
}
