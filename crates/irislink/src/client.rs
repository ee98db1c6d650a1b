//! `RpcClient` builder and application surface.
//!
//! This is the entry point for applications. It ties the layers
//! together: IPC transport → session actor → event pump → call state.

use irislink_protocol::RpcCommand;
use irislink_session::{
    CredentialStore, HttpTokenEndpoint, RpcSession, SessionConfig, SessionError, SessionEvent,
    SessionHandle, SessionState, TokenEndpoint,
};
use irislink_transport::{EndpointConfig, IpcTransport, ReconnectPolicy, Transport};
use irislink_voice::{CallSnapshot, CallStateProjector, ProjectorConfig, VoiceController};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::IrisError;
use crate::pump::{self, PumpOutputs};

/// What [`RpcClient::events`] yields: subscribed events and command
/// replies, errors, and session state changes.
pub type ClientEvent = SessionEvent;

/// Result of waiting for the session to become ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectOutcome {
    pub success: bool,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting an [`RpcClient`].
///
/// # Example
///
/// ```rust,ignore
/// use irislink::prelude::*;
///
/// let store = JsonFileCredentialStore::open("tokens.json")?;
/// let client = RpcClient::builder()
///     .credentials("1234", "secret")
///     .connect(store)
///     .await?;
/// client.voice().mute().await?;
/// ```
pub struct RpcClientBuilder {
    session: SessionConfig,
    projector: ProjectorConfig,
    event_capacity: usize,
    token_base_url: String,
}

impl RpcClientBuilder {
    pub fn new() -> Self {
        Self {
            session: SessionConfig::default(),
            projector: ProjectorConfig::default(),
            event_capacity: 256,
            token_base_url: HttpTokenEndpoint::DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Sets the OAuth application's client id and secret.
    pub fn credentials(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.session.client_id = client_id.into();
        self.session.client_secret = client_secret.into();
        self
    }

    /// Replaces the whole session configuration, credentials included.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.session.scopes = scopes;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.session.reconnect = policy;
        self
    }

    pub fn endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.session.endpoint = endpoint;
        self
    }

    pub fn projector(mut self, config: ProjectorConfig) -> Self {
        self.projector = config;
        self
    }

    /// How many events a slow [`RpcClient::events`] receiver may fall
    /// behind before it starts losing them.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Base URL of the OAuth HTTP API.
    pub fn token_base_url(mut self, url: impl Into<String>) -> Self {
        self.token_base_url = url.into();
        self
    }

    /// Starts the client over the local IPC channel and returns at once.
    /// The session keeps looking for the chat client in the background.
    pub fn spawn<S: CredentialStore>(self, store: S) -> Result<RpcClient, IrisError> {
        let transport = IpcTransport::new(self.session.endpoint.clone());
        let oauth = HttpTokenEndpoint::new(self.token_base_url.clone());
        self.spawn_with(transport, store, oauth)
    }

    /// Like [`spawn`](Self::spawn), then waits until the session is
    /// `Ready`. On failure the client is shut down.
    pub async fn connect<S: CredentialStore>(self, store: S) -> Result<RpcClient, IrisError> {
        let client = self.spawn(store)?;
        if let Err(e) = client.session.wait_for(SessionState::Ready).await {
            client.disconnect().await;
            return Err(e.into());
        }
        Ok(client)
    }

    /// Starts the client over any transport and token endpoint.
    pub fn spawn_with<T, S, O>(self, transport: T, store: S, oauth: O) -> Result<RpcClient, IrisError>
    where
        T: Transport,
        S: CredentialStore,
        O: TokenEndpoint,
    {
        let (session, session_events) = RpcSession::spawn(transport, store, oauth, self.session)?;

        let projector = CallStateProjector::new(self.projector);
        let (events, _) = broadcast::channel(self.event_capacity);
        let (call_state_tx, call_state) = watch::channel(projector.snapshot());

        let pump = tokio::spawn(pump::run(
            session_events,
            session.clone(),
            projector,
            PumpOutputs {
                events: events.clone(),
                call_state: call_state_tx,
            },
        ));

        Ok(RpcClient {
            voice: VoiceController::new(session.clone()),
            session,
            events,
            call_state,
            pump,
        })
    }
}

impl Default for RpcClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// RpcClient
// ---------------------------------------------------------------------------

/// A running connection to the chat client.
///
/// Dropping it stops the event pump; call [`disconnect`](Self::disconnect)
/// first for an orderly shutdown.
pub struct RpcClient {
    session: SessionHandle,
    voice: VoiceController,
    events: broadcast::Sender<ClientEvent>,
    call_state: watch::Receiver<CallSnapshot>,
    pump: JoinHandle<()>,
}

impl RpcClient {
    pub fn builder() -> RpcClientBuilder {
        RpcClientBuilder::new()
    }

    /// Connects with default settings and waits until ready.
    pub async fn connect<S: CredentialStore>(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        store: S,
    ) -> Result<Self, IrisError> {
        RpcClientBuilder::new()
            .credentials(client_id, client_secret)
            .connect(store)
            .await
    }

    /// Waits for the session to reach `Ready`, reporting failure
    /// instead of returning an error.
    pub async fn wait_until_ready(&self) -> ConnectOutcome {
        match self.session.wait_for(SessionState::Ready).await {
            Ok(()) => ConnectOutcome {
                success: true,
                error: None,
            },
            Err(e) => ConnectOutcome {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }

    /// Closes the connection and stops reconnecting.
    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    /// Revokes and deletes the stored OAuth tokens. The next connection
    /// has to ask the user for consent again.
    pub async fn revoke_all_tokens(&self) -> Result<(), IrisError> {
        self.session.revoke_all_tokens().await?;
        Ok(())
    }

    pub async fn subscribe_to_event(&self, event: &str, args: Option<Value>) -> Result<(), IrisError> {
        self.session.subscribe(event, args).await?;
        Ok(())
    }

    pub async fn unsubscribe_from_event(&self, event: &str, args: Option<Value>) -> Result<(), IrisError> {
        self.session.unsubscribe(event, args).await?;
        Ok(())
    }

    /// Opens a text channel in the chat client.
    pub async fn select_text_channel(&self, channel_id: &str) -> Result<(), IrisError> {
        if channel_id.trim().is_empty() {
            return Err(SessionError::InvalidCommand("empty text channel id".into()).into());
        }
        self.send(RpcCommand::SelectTextChannel {
            channel_id: channel_id.to_string(),
        })
        .await
    }

    /// Sends any command; the reply arrives on [`events`](Self::events).
    pub async fn send(&self, command: RpcCommand) -> Result<(), IrisError> {
        self.session.send(command).await?;
        Ok(())
    }

    pub fn voice(&self) -> &VoiceController {
        &self.voice
    }

    /// A new receiver of everything the session reports from now on.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// The projected call state, updated as events arrive.
    pub fn call_state(&self) -> watch::Receiver<CallSnapshot> {
        self.call_state.clone()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
