//! End-to-end tests: RpcClient against a scripted fake chat client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use irislink::prelude::*;
use irislink::protocol::{Frame, FrameCodec, FrameDecoder, Opcode};
use irislink::session::{
    ClientCredentials, OAuthTokens, SessionError, SessionEvent, TokenEndpoint, TokenSet,
    unix_millis,
};
use irislink::transport::{StreamConnection, Transport, TransportError};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tokio::time::timeout;

const STEP: Duration = Duration::from_secs(5);

// =========================================================================
// Fake chat client
// =========================================================================

#[derive(Clone, Default)]
struct MockTransport {
    streams: Arc<Mutex<VecDeque<DuplexStream>>>,
}

impl MockTransport {
    fn add_peer(&self) -> Peer {
        let (client, server) = tokio::io::duplex(256 * 1024);
        self.streams.lock().unwrap().push_back(client);
        Peer {
            stream: server,
            decoder: FrameDecoder::new(),
        }
    }
}

impl Transport for MockTransport {
    type Connection = StreamConnection<DuplexStream>;

    async fn connect(&mut self) -> Result<Self::Connection, TransportError> {
        let next = self.streams.lock().unwrap().pop_front();
        next.map(|s| StreamConnection::new(s, 0))
            .ok_or(TransportError::NoEndpoint { attempted: 1 })
    }
}

/// Never reached in these tests: tokens are valid from the start.
struct NoOAuth;

impl TokenEndpoint for NoOAuth {
    async fn exchange_code(&self, _: &ClientCredentials, _: &str) -> Result<OAuthTokens, SessionError> {
        Err(SessionError::TokenExchange("unexpected exchange".into()))
    }

    async fn refresh(&self, _: &ClientCredentials, _: &str) -> Result<OAuthTokens, SessionError> {
        Err(SessionError::TokenExchange("unexpected refresh".into()))
    }

    async fn revoke(&self, _: &ClientCredentials, _: &str) -> Result<(), SessionError> {
        Ok(())
    }
}

struct Peer {
    stream: DuplexStream,
    decoder: FrameDecoder,
}

impl Peer {
    async fn read_frame(&mut self) -> Frame {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return frame.unwrap();
            }
            let mut buf = vec![0u8; 16 * 1024];
            let n = timeout(STEP, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for a frame")
                .unwrap();
            assert!(n > 0, "client closed the connection");
            self.decoder.extend(&buf[..n]);
        }
    }

    async fn write(&mut self, payload: Value) {
        let bytes = FrameCodec::encode(Opcode::Message, &payload).unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    async fn expect_command(&mut self, cmd: &str) -> Value {
        let frame = self.read_frame().await;
        assert_eq!(frame.payload["cmd"], cmd, "unexpected frame: {}", frame.payload);
        frame.payload
    }

    async fn reply(&mut self, command: &Value, data: Value) {
        self.write(json!({"cmd": command["cmd"], "nonce": command["nonce"], "evt": null, "data": data}))
            .await;
    }

    async fn dispatch(&mut self, evt: &str, data: Value) {
        self.write(json!({"cmd": "DISPATCH", "evt": evt, "nonce": null, "data": data}))
            .await;
    }

    /// Handshake, AUTHENTICATE, default subscriptions.
    async fn bring_up(&mut self) {
        let handshake = self.read_frame().await;
        assert_eq!(handshake.opcode, Opcode::Handshake);
        self.dispatch("READY", json!({"v": 1})).await;
        let auth = self.expect_command("AUTHENTICATE").await;
        self.reply(&auth, json!({})).await;
        for _ in 0..3 {
            self.expect_command("SUBSCRIBE").await;
        }
    }

    /// Answers the resync the client sends on every Ready.
    async fn answer_resync(&mut self, channel: Value, settings: Value) {
        let get_channel = self.expect_command("GET_SELECTED_VOICE_CHANNEL").await;
        let get_settings = self.expect_command("GET_VOICE_SETTINGS").await;
        self.reply(&get_channel, channel).await;
        self.reply(&get_settings, settings).await;
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn store_with_valid_tokens() -> MemoryCredentialStore {
    let store = MemoryCredentialStore::new();
    TokenSet {
        access_token: "access".into(),
        refresh_token: "refresh".into(),
        expires_at: unix_millis() + 3_600_000,
    }
    .persist(&store)
    .unwrap();
    store
}

fn start() -> (RpcClient, Peer) {
    let transport = MockTransport::default();
    let peer = transport.add_peer();
    let client = RpcClient::builder()
        .credentials("client-1", "secret-1")
        .reconnect(ReconnectPolicy {
            scan_cooldown: Duration::from_millis(10),
            reconnect_delay: Duration::from_millis(10),
            max_scans: None,
        })
        .spawn_with(transport, store_with_valid_tokens(), NoOAuth)
        .unwrap();
    (client, peer)
}

async fn wait_call_state(
    rx: &mut watch::Receiver<CallSnapshot>,
    predicate: impl Fn(&CallSnapshot) -> bool,
) -> CallSnapshot {
    timeout(STEP, rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for call state")
        .expect("call state channel closed")
        .clone()
}

fn participant(user_id: &str) -> Value {
    json!({
        "user": {"id": user_id, "username": user_id, "avatar": "h"},
        "nick": user_id,
        "voice_state": {"mute": false, "deaf": false, "self_mute": false, "self_deaf": false}
    })
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_client_ready_resyncs_call_state() {
    let (client, mut peer) = start();
    let mut calls = client.call_state();

    peer.bring_up().await;
    let outcome = client.wait_until_ready().await;
    assert_eq!(
        outcome,
        ConnectOutcome {
            success: true,
            error: None
        }
    );

    peer.answer_resync(Value::Null, json!({"mute": true, "deaf": false}))
        .await;

    let snapshot = wait_call_state(&mut calls, |s| s.settings.muted).await;
    assert!(snapshot.mode.is_idle());
    assert_eq!(client.session_state(), SessionState::Ready);
}

#[tokio::test]
async fn test_client_joining_channel_builds_roster() {
    let (client, mut peer) = start();
    let mut calls = client.call_state();
    peer.bring_up().await;
    peer.answer_resync(Value::Null, json!({"mute": false, "deaf": false}))
        .await;

    peer.dispatch("VOICE_CHANNEL_SELECT", json!({"channel_id": "5", "guild_id": null}))
        .await;

    let mut scoped = Vec::new();
    for _ in 0..5 {
        let sub = peer.expect_command("SUBSCRIBE").await;
        assert_eq!(sub["args"], json!({"channel_id": "5"}));
        scoped.push(sub["evt"].as_str().unwrap().to_string());
    }
    assert!(scoped.contains(&"SPEAKING_START".to_string()));

    peer.answer_resync(
        json!({"id": "5", "name": "call", "guild_id": null, "voice_states": [participant("U1")]}),
        json!({"mute": false, "deaf": false}),
    )
    .await;
    let snapshot = wait_call_state(&mut calls, |s| {
        s.mode.channel().is_some_and(|c| c.users.contains_key("U1"))
    })
    .await;
    assert_eq!(
        snapshot.mode.channel().unwrap().users["U1"].avatar_url.as_deref(),
        Some("https://cdn.discordapp.com/avatars/U1/h?size=1024")
    );

    peer.dispatch("SPEAKING_START", json!({"user_id": "U1", "channel_id": "5"}))
        .await;
    wait_call_state(&mut calls, |s| {
        s.mode.channel().is_some_and(|c| c.users["U1"].speaking)
    })
    .await;
}

#[tokio::test]
async fn test_client_voice_actions_reach_chat_client() {
    let (client, mut peer) = start();
    peer.bring_up().await;
    peer.answer_resync(Value::Null, json!({})).await;
    client.wait_until_ready().await;

    client.voice().mute().await.unwrap();
    client.voice().join("42").await.unwrap();
    client.voice().leave().await.unwrap();

    let mute = peer.expect_command("SET_VOICE_SETTINGS").await;
    assert_eq!(mute["args"], json!({"mute": true}));
    let join = peer.expect_command("SELECT_VOICE_CHANNEL").await;
    assert_eq!(join["args"], json!({"channel_id": "42", "force": true}));
    let leave = peer.expect_command("SELECT_VOICE_CHANNEL").await;
    assert_eq!(leave["args"], json!({"channel_id": null}));
}

#[tokio::test]
async fn test_client_select_text_channel() {
    let (client, mut peer) = start();
    peer.bring_up().await;
    peer.answer_resync(Value::Null, json!({})).await;
    client.wait_until_ready().await;

    let empty = client.select_text_channel(" ").await;
    assert!(matches!(
        empty,
        Err(IrisError::Session(SessionError::InvalidCommand(_)))
    ));

    client.select_text_channel("77").await.unwrap();
    let frame = peer.expect_command("SELECT_TEXT_CHANNEL").await;
    assert_eq!(frame["args"]["channel_id"], "77");
}

#[tokio::test]
async fn test_client_events_carry_subscribed_dispatches() {
    let (client, mut peer) = start();
    let mut events = client.events();
    peer.bring_up().await;
    peer.answer_resync(Value::Null, json!({})).await;

    client
        .subscribe_to_event("MESSAGE_CREATE", Some(json!({"channel_id": "9"})))
        .await
        .unwrap();
    peer.expect_command("SUBSCRIBE").await;
    peer.dispatch("MESSAGE_CREATE", json!({"channel_id": "9", "message": {"content": "hi"}}))
        .await;

    loop {
        let event = timeout(STEP, events.recv()).await.unwrap().unwrap();
        if let SessionEvent::Data(msg) = event {
            if msg.evt.as_deref() == Some("MESSAGE_CREATE") {
                assert_eq!(msg.data["message"]["content"], "hi");
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_client_disconnect_fails_later_waits() {
    let (client, mut peer) = start();
    peer.bring_up().await;
    client.wait_until_ready().await;

    client.disconnect().await;

    assert_eq!(client.session_state(), SessionState::Disconnected);
    let outcome = client.wait_until_ready().await;
    assert!(!outcome.success);
    assert!(outcome.error.is_some());
}
