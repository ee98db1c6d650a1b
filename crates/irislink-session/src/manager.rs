//! The session actor: one Tokio task that owns the connection.
//!
//! Everything stateful about talking to the chat client lives here: the
//! frame decoder, the handshake/auth state machine, the subscription
//! registry, and the pending-transition slot. The outside world talks
//! to it through a cloneable [`SessionHandle`] and listens to it through
//! a stream of [`SessionEvent`]s.
//!
//! ```text
//!  SessionHandle ──mpsc──→ ┌──────────────┐ ──bytes──→ Connection
//!                          │  RpcSession  │
//!  SessionEvent ←─mpsc──── └──────────────┘ ←─bytes─── Connection
//!  SessionState ←─watch───┘
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use irislink_protocol::{
    AuthenticateArgs, AuthorizeArgs, CommandKind, Frame, FrameDecoder, Handshake,
    IncomingMessage, Nonce, Opcode, ProtocolError, RemoteError, RpcCommand, FrameCodec, names,
};
use irislink_transport::{Connection, Transport};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::pending::{PendingTransition, TransitionReply};
use crate::store::unix_millis;
use crate::{
    ClientCredentials, CredentialStore, OAuthTokens, SessionConfig, SessionError, SessionState,
    Subscription, SubscriptionRegistry, TokenEndpoint, TokenSet,
};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A failure reported by the chat client or by the auth flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// The command that failed, when known.
    pub command: Option<CommandKind>,
    /// Remote error code; `None` for local failures.
    pub code: Option<i64>,
    pub message: String,
}

impl ErrorEvent {
    fn remote(command: Option<CommandKind>, error: &RemoteError) -> Self {
        Self {
            command,
            code: Some(error.code),
            message: error.message.clone(),
        }
    }

    fn local(command: Option<CommandKind>, error: &SessionError) -> Self {
        Self {
            command,
            code: None,
            message: error.to_string(),
        }
    }
}

/// What the session publishes to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A subscribed event or a reply to one of our commands.
    Data(IncomingMessage),
    Error(ErrorEvent),
    State(SessionState),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

pub(crate) enum SessionCommand {
    Send {
        command: RpcCommand,
        reply: Reply<()>,
    },
    Subscribe {
        subscription: Subscription,
        reply: Reply<()>,
    },
    Unsubscribe {
        subscription: Subscription,
        reply: Reply<()>,
    },
    WaitFor {
        target: SessionState,
        reply: TransitionReply,
    },
    RevokeAllTokens {
        reply: Reply<()>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running session. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// The state the session was in most recently.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Sends a command to the chat client. Fails with
    /// [`SessionError::NotReady`] unless the session is `Ready`. Does not
    /// wait for the chat client's reply; that arrives as a
    /// [`SessionEvent::Data`].
    pub async fn send(&self, command: RpcCommand) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Send { command, reply }).await
    }

    /// Adds a subscription. It is sent now if the session is `Ready` and
    /// replayed after every reconnect. Subscribing twice sends nothing.
    pub async fn subscribe(
        &self,
        event: impl Into<String>,
        args: Option<Value>,
    ) -> Result<(), SessionError> {
        let subscription = Subscription::new(event, args);
        self.request(|reply| SessionCommand::Subscribe {
            subscription,
            reply,
        })
        .await
    }

    /// Removes a subscription. Unsubscribing from something never
    /// subscribed sends nothing.
    pub async fn unsubscribe(
        &self,
        event: impl Into<String>,
        args: Option<Value>,
    ) -> Result<(), SessionError> {
        let subscription = Subscription::new(event, args);
        self.request(|reply| SessionCommand::Unsubscribe {
            subscription,
            reply,
        })
        .await
    }

    /// Waits until the session reaches `target`.
    ///
    /// Only one caller may wait at a time; a second concurrent call fails
    /// with [`SessionError::TransitionAlreadyPending`]. Losing the
    /// connection first fails it with [`SessionError::ConnectionLost`].
    pub async fn wait_for(&self, target: SessionState) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::WaitFor { target, reply })
            .await
    }

    /// Revokes both stored tokens and deletes them locally.
    pub async fn revoke_all_tokens(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::RevokeAllTokens { reply })
            .await
    }

    /// Closes the connection and stops the session task. Any pending
    /// [`wait_for`](Self::wait_for) fails with [`SessionError::Shutdown`].
    /// Calling it on a stopped session is a no-op.
    pub async fn disconnect(&self) {
        let (reply, done) = oneshot::channel();
        if self
            .sender
            .send(SessionCommand::Disconnect { reply })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// What to do after handling a command.
enum Flow {
    Continue,
    Shutdown(Option<oneshot::Sender<()>>),
}

/// Why a connection ended.
enum Outcome {
    Shutdown(Option<oneshot::Sender<()>>),
    /// Transport closed or failed, or the handshake was interrupted.
    Lost(SessionError),
    /// Auth gave up. The connection is dropped and retried later.
    Errored(SessionError),
    /// Auth gave up for good. The session stops until the host starts a
    /// new one.
    Fatal(SessionError),
}

/// Which OAuth call a [`TokenRequest`] is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    Refresh,
    Exchange,
}

/// An OAuth call running on its own task beside the session loop, which
/// keeps serving commands and frames until it reports back. Ending the
/// connection aborts it.
struct TokenRequest {
    grant: Grant,
    task: JoinHandle<Result<OAuthTokens, SessionError>>,
}

impl TokenRequest {
    fn abort(self) {
        tracing::debug!(grant = ?self.grant, "abandoning token request");
        self.task.abort();
    }
}

/// Resolves when the in-flight token request finishes; never resolves
/// when there is none. Cancel-safe: the handle stays in `slot`.
async fn token_grant(
    slot: &mut Option<TokenRequest>,
) -> (Grant, Result<OAuthTokens, SessionError>) {
    let Some(request) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let result = match (&mut request.task).await {
        Ok(result) => result,
        Err(e) => Err(SessionError::TokenExchange(format!("token request task failed: {e}"))),
    };
    (request.grant, result)
}

/// The session actor.
///
/// Created and started by [`RpcSession::spawn`]; never touched directly
/// afterwards.
pub struct RpcSession<S, O> {
    config: SessionConfig,
    credentials: ClientCredentials,
    store: S,
    oauth: Arc<O>,
    token_request: Option<TokenRequest>,
    registry: SubscriptionRegistry,
    pending: PendingTransition,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    authorize_attempts: u32,
}

impl<S: CredentialStore, O: TokenEndpoint> RpcSession<S, O> {
    /// Starts a session task on the current Tokio runtime.
    ///
    /// Returns the handle and the event stream. The task begins scanning
    /// for the chat client immediately and keeps reconnecting until
    /// [`SessionHandle::disconnect`] is called, every handle is dropped,
    /// or the reconnect policy gives up.
    pub fn spawn<T: Transport>(
        transport: T,
        store: S,
        oauth: O,
        config: SessionConfig,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        config.validate()?;
        let config = config.validated();

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        // Seeded once; a host that unsubscribes a default keeps it off
        // across reconnects.
        let mut registry = SubscriptionRegistry::new();
        for event in &config.default_subscriptions {
            registry.insert(Subscription::new(event.clone(), None));
        }

        let session = RpcSession {
            credentials: ClientCredentials {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            },
            config,
            store,
            oauth: Arc::new(oauth),
            token_request: None,
            registry,
            pending: PendingTransition::default(),
            state: SessionState::Disconnected,
            state_tx,
            events: event_tx,
            commands: cmd_rx,
            authorize_attempts: 0,
        };

        tokio::spawn(session.run(transport));

        let handle = SessionHandle {
            sender: cmd_tx,
            state: state_rx,
        };
        Ok((handle, event_rx))
    }

    async fn run<T: Transport>(mut self, mut transport: T) {
        tracing::info!(client_id = %self.config.client_id, "session task started");
        let mut failed_scans = 0u32;

        let ack = 'session: loop {
            self.set_state(SessionState::Connecting);

            // Dial, servicing commands while the scan runs.
            let dialed = {
                let connect = transport.connect();
                tokio::pin!(connect);
                loop {
                    tokio::select! {
                        result = &mut connect => break result,
                        cmd = self.commands.recv() => {
                            if let Flow::Shutdown(ack) = self.on_command::<T::Connection>(cmd, None).await {
                                break 'session ack;
                            }
                        }
                    }
                }
            };

            let conn = match dialed {
                Ok(conn) => conn,
                Err(e) => {
                    failed_scans += 1;
                    tracing::debug!(error = %e, failed_scans, "chat client not found");
                    match self.config.reconnect.delay_after(failed_scans) {
                        Some(delay) => {
                            if let Flow::Shutdown(ack) = self.idle::<T::Connection>(delay).await {
                                break 'session ack;
                            }
                            continue;
                        }
                        None => {
                            tracing::warn!(failed_scans, "giving up on the chat client");
                            self.give_up(SessionError::ReconnectExhausted { scans: failed_scans });
                            break 'session None;
                        }
                    }
                }
            };

            failed_scans = 0;
            tracing::info!(id = %conn.id(), endpoint = conn.endpoint(), "connected");

            let outcome = self.drive(&conn).await;
            if let Some(request) = self.token_request.take() {
                request.abort();
            }
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "close failed");
            }

            match outcome {
                Outcome::Shutdown(ack) => break 'session ack,
                Outcome::Lost(e) => {
                    tracing::info!(error = %e, "connection lost, reconnecting");
                    self.set_state(SessionState::Reconnecting);
                    self.pending.reject(SessionError::ConnectionLost);
                }
                Outcome::Errored(e) => {
                    tracing::warn!(error = %e, "session errored, reconnecting");
                    self.emit(SessionEvent::Error(ErrorEvent::local(None, &e)));
                    self.set_state(SessionState::Errored);
                    self.pending.reject(e);
                    self.set_state(SessionState::Reconnecting);
                }
                Outcome::Fatal(e) => {
                    tracing::warn!(error = %e, "authorization abandoned, stopping session");
                    self.emit(SessionEvent::Error(ErrorEvent::local(None, &e)));
                    self.give_up(e);
                    break 'session None;
                }
            }

            let delay = self.config.reconnect.reconnect_delay;
            if let Flow::Shutdown(ack) = self.idle::<T::Connection>(delay).await {
                break 'session ack;
            }
        };

        self.set_state(SessionState::Disconnected);
        self.pending.reject(SessionError::Shutdown);
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        tracing::info!("session task stopped");
    }

    /// Enters `Errored` and fails the pending waiter with `error`; the
    /// task then stops.
    fn give_up(&mut self, error: SessionError) {
        self.set_state(SessionState::Errored);
        self.pending.reject(error);
    }

    /// Waits `delay`, still answering commands. Used between connection
    /// attempts, when there is no connection.
    async fn idle<C: Connection>(&mut self, delay: Duration) -> Flow {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Flow::Continue,
                cmd = self.commands.recv() => {
                    if let Flow::Shutdown(ack) = self.on_command::<C>(cmd, None).await {
                        return Flow::Shutdown(ack);
                    }
                }
            }
        }
    }

    /// Runs one connection from handshake until it ends.
    async fn drive<C: Connection>(&mut self, conn: &C) -> Outcome {
        let mut decoder = FrameDecoder::with_max_frame_len(self.config.max_frame_len);

        self.set_state(SessionState::Handshaking);
        let handshake = Handshake::new(self.config.protocol_version, self.config.client_id.clone());
        let sent = match handshake.encode() {
            Ok(bytes) => conn.send(&bytes).await.map_err(SessionError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            return Outcome::Lost(e);
        }
        tracing::debug!(nonce = %handshake.nonce, "handshake sent");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    if let Flow::Shutdown(ack) = self.on_command(cmd, Some(conn)).await {
                        return Outcome::Shutdown(ack);
                    }
                }
                (grant, result) = token_grant(&mut self.token_request) => {
                    self.token_request = None;
                    if let Some(outcome) = self.on_token_grant(conn, grant, result).await {
                        return outcome;
                    }
                }
                chunk = conn.recv() => {
                    let bytes = match chunk {
                        Ok(Some(bytes)) => bytes,
                        Ok(None) => return Outcome::Lost(SessionError::ConnectionLost),
                        Err(e) => return Outcome::Lost(e.into()),
                    };
                    decoder.extend(&bytes);
                    while let Some(frame) = decoder.next_frame() {
                        match frame {
                            Ok(frame) => {
                                if let Some(outcome) = self.on_frame(conn, frame).await {
                                    return outcome;
                                }
                            }
                            Err(e @ ProtocolError::FrameTooLarge { .. }) => {
                                tracing::warn!(error = %e, "unrecoverable framing error");
                                return Outcome::Lost(e.into());
                            }
                            Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
                        }
                    }
                }
            }
        }
    }

    // -- Commands from handles --------------------------------------------

    async fn on_command<C: Connection>(
        &mut self,
        cmd: Option<SessionCommand>,
        conn: Option<&C>,
    ) -> Flow {
        // Every handle dropped: nobody can talk to us any more.
        let Some(cmd) = cmd else {
            return Flow::Shutdown(None);
        };
        let ready = conn.filter(|_| self.state.is_ready());

        match cmd {
            SessionCommand::Send { command, reply } => {
                let result = match ready {
                    Some(conn) => self.send_command(conn, command).await,
                    None => Err(SessionError::NotReady(self.state)),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Subscribe {
                subscription,
                reply,
            } => {
                let mut result = Ok(());
                if self.registry.insert(subscription.clone()) {
                    tracing::debug!(event = %subscription.event, "subscription added");
                    if let Some(conn) = ready {
                        let command = RpcCommand::subscribe(subscription.event, subscription.args);
                        result = self.send_command(conn, command).await;
                    }
                }
                let _ = reply.send(result);
            }
            SessionCommand::Unsubscribe {
                subscription,
                reply,
            } => {
                let mut result = Ok(());
                if self.registry.remove(&subscription) {
                    tracing::debug!(event = %subscription.event, "subscription removed");
                    if let Some(conn) = ready {
                        let command = RpcCommand::unsubscribe(subscription.event, subscription.args);
                        result = self.send_command(conn, command).await;
                    }
                }
                let _ = reply.send(result);
            }
            SessionCommand::WaitFor { target, reply } => {
                self.pending.begin(self.state, target, reply);
            }
            SessionCommand::RevokeAllTokens { reply } => {
                let _ = reply.send(self.revoke_all_tokens().await);
            }
            SessionCommand::Disconnect { reply } => {
                tracing::info!("disconnect requested");
                return Flow::Shutdown(Some(reply));
            }
        }
        Flow::Continue
    }

    async fn revoke_all_tokens(&mut self) -> Result<(), SessionError> {
        let mut first_error = None;
        for key in [TokenSet::ACCESS_TOKEN_KEY, TokenSet::REFRESH_TOKEN_KEY] {
            let token = match self.store.get(key) {
                Ok(Some(token)) if !token.is_empty() => token,
                Ok(_) => continue,
                Err(e) => {
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            if let Err(e) = self.oauth.revoke(&self.credentials, &token).await {
                tracing::warn!(key, error = %e, "token revocation failed");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = TokenSet::clear(&self.store) {
            first_error.get_or_insert(e);
        }
        tracing::info!("stored tokens revoked");
        first_error.map_or(Ok(()), Err)
    }

    // -- Frames from the chat client --------------------------------------

    async fn on_frame<C: Connection>(&mut self, conn: &C, frame: Frame) -> Option<Outcome> {
        match frame.opcode {
            Opcode::Message => match IncomingMessage::from_payload(frame.payload) {
                Ok(msg) => self.on_message(conn, msg).await,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping message with unexpected shape");
                    None
                }
            },
            Opcode::Ping => {
                tracing::trace!("ping");
                let pong = FrameCodec::encode(Opcode::Pong, &frame.payload);
                let sent = match pong {
                    Ok(bytes) => conn.send(&bytes).await.map_err(SessionError::from),
                    Err(e) => Err(e.into()),
                };
                sent.err().map(Outcome::Lost)
            }
            Opcode::Error => {
                let error = RemoteError::from_value(&frame.payload);
                tracing::warn!(code = error.code, message = %error.message, state = %self.state, "error frame");
                self.emit(SessionEvent::Error(ErrorEvent::remote(None, &error)));
                self.state
                    .is_handshake_stage()
                    .then(|| Outcome::Lost(SessionError::Remote(error)))
            }
            Opcode::Pong | Opcode::Handshake | Opcode::Unknown(_) => {
                tracing::debug!(opcode = %frame.opcode, "ignoring frame");
                None
            }
        }
    }

    async fn on_message<C: Connection>(&mut self, conn: &C, msg: IncomingMessage) -> Option<Outcome> {
        tracing::debug!(
            cmd = %msg.cmd,
            evt = msg.evt.as_deref().unwrap_or(""),
            nonce = msg.nonce.as_deref().unwrap_or(""),
            "message"
        );

        if msg.is_event(names::READY) {
            if self.state != SessionState::Handshaking {
                tracing::debug!(state = %self.state, "ignoring repeated READY");
                return None;
            }
            self.set_state(SessionState::Authorizing);
            return self.authorize(conn).await;
        }

        if let Some(error) = msg.remote_error() {
            self.emit(SessionEvent::Error(ErrorEvent::remote(Some(msg.cmd), &error)));
            return match (msg.cmd, self.state) {
                (CommandKind::Authenticate, SessionState::Authenticating) => {
                    tracing::warn!(code = error.code, "stored token rejected, authorizing again");
                    self.discard_tokens();
                    self.request_authorization(conn).await
                }
                (CommandKind::Authorize, SessionState::AwaitingUserCode) => {
                    let failure = SessionError::AuthFailed(error.message);
                    if self.authorize_attempts >= self.config.max_authorize_attempts {
                        Some(Outcome::Fatal(failure))
                    } else {
                        Some(Outcome::Errored(failure))
                    }
                }
                _ => None,
            };
        }

        match (msg.cmd, self.state) {
            (CommandKind::Authorize, SessionState::AwaitingUserCode) => {
                match msg.data.get("code").and_then(Value::as_str) {
                    Some(code) => {
                        self.exchange_code(code);
                        None
                    }
                    None => Some(Outcome::Errored(SessionError::AuthFailed(
                        "AUTHORIZE reply carried no code".into(),
                    ))),
                }
            }
            (CommandKind::Authenticate, SessionState::Authenticating) => {
                self.finish_authentication(conn).await
            }
            (CommandKind::Authorize | CommandKind::Authenticate, _) => {
                tracing::debug!(cmd = %msg.cmd, state = %self.state, "ignoring stale auth reply");
                None
            }
            (CommandKind::Dispatch, _) => {
                let evt = msg.evt.as_deref().unwrap_or_default();
                if self.registry.is_subscribed_to(evt) {
                    self.emit(SessionEvent::Data(msg));
                } else {
                    tracing::trace!(evt, "dropping unsubscribed event");
                }
                None
            }
            _ => {
                self.emit(SessionEvent::Data(msg));
                None
            }
        }
    }

    // -- Auth flow --------------------------------------------------------

    /// `Authorizing`: pick a path based on what is stored.
    async fn authorize<C: Connection>(&mut self, conn: &C) -> Option<Outcome> {
        let stored = TokenSet::load(&self.store).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cannot read stored credentials");
            None
        });

        let Some(tokens) = stored else {
            return self.request_authorization(conn).await;
        };

        if !tokens.is_expired(unix_millis()) {
            tracing::debug!("stored access token still valid");
            return self.authenticate(conn, &tokens.access_token).await;
        }

        tracing::info!("access token expired, refreshing");
        let oauth = Arc::clone(&self.oauth);
        let credentials = self.credentials.clone();
        self.start_token_request(Grant::Refresh, async move {
            oauth.refresh(&credentials, &tokens.refresh_token).await
        });
        None
    }

    /// Sends `AUTHORIZE` and waits for the user to approve in the chat
    /// client.
    async fn request_authorization<C: Connection>(&mut self, conn: &C) -> Option<Outcome> {
        if self.authorize_attempts >= self.config.max_authorize_attempts {
            return Some(Outcome::Fatal(SessionError::AuthFailed(format!(
                "gave up after {} authorization attempts",
                self.authorize_attempts
            ))));
        }
        self.authorize_attempts += 1;

        let command = RpcCommand::Authorize(AuthorizeArgs {
            client_id: self.config.client_id.clone(),
            scopes: self.config.scopes.clone(),
        });
        if let Err(e) = self.send_command(conn, command).await {
            return Some(Outcome::Lost(e));
        }
        tracing::info!(attempt = self.authorize_attempts, "waiting for the user to authorize");
        self.set_state(SessionState::AwaitingUserCode);
        None
    }

    fn exchange_code(&mut self, code: &str) {
        self.set_state(SessionState::ExchangingToken);
        let oauth = Arc::clone(&self.oauth);
        let credentials = self.credentials.clone();
        let code = code.to_string();
        self.start_token_request(Grant::Exchange, async move {
            oauth.exchange_code(&credentials, &code).await
        });
    }

    fn start_token_request<F>(&mut self, grant: Grant, request: F)
    where
        F: Future<Output = Result<OAuthTokens, SessionError>> + Send + 'static,
    {
        tracing::debug!(?grant, "token request started");
        if let Some(previous) = self.token_request.take() {
            previous.abort();
        }
        self.token_request = Some(TokenRequest {
            grant,
            task: tokio::spawn(request),
        });
    }

    /// A refresh or code exchange finished.
    async fn on_token_grant<C: Connection>(
        &mut self,
        conn: &C,
        grant: Grant,
        result: Result<OAuthTokens, SessionError>,
    ) -> Option<Outcome> {
        match result {
            Ok(tokens) => {
                let tokens = TokenSet::from_grant(tokens, unix_millis());
                self.save_tokens(&tokens);
                self.authenticate(conn, &tokens.access_token).await
            }
            Err(e) => {
                let command = match grant {
                    Grant::Refresh => None,
                    Grant::Exchange => Some(CommandKind::Authorize),
                };
                tracing::warn!(?grant, error = %e, "token request failed, authorizing again");
                self.emit(SessionEvent::Error(ErrorEvent::local(command, &e)));
                self.discard_tokens();
                self.request_authorization(conn).await
            }
        }
    }

    async fn authenticate<C: Connection>(&mut self, conn: &C, access_token: &str) -> Option<Outcome> {
        let command = RpcCommand::Authenticate(AuthenticateArgs {
            access_token: access_token.to_string(),
        });
        if let Err(e) = self.send_command(conn, command).await {
            return Some(Outcome::Lost(e));
        }
        self.set_state(SessionState::Authenticating);
        None
    }

    /// `Subscribing`: replay the registry, then `Ready`.
    async fn finish_authentication<C: Connection>(&mut self, conn: &C) -> Option<Outcome> {
        self.set_state(SessionState::Subscribing);
        self.authorize_attempts = 0;

        let subscriptions: Vec<Subscription> = self.registry.iter().cloned().collect();
        for subscription in subscriptions {
            let command = RpcCommand::subscribe(subscription.event, subscription.args);
            if let Err(e) = self.send_command(conn, command).await {
                return Some(Outcome::Lost(e));
            }
        }

        tracing::info!(subscriptions = self.registry.len(), "session ready");
        self.set_state(SessionState::Ready);
        None
    }

    fn save_tokens(&self, tokens: &TokenSet) {
        if let Err(e) = tokens.persist(&self.store) {
            tracing::warn!(error = %e, "cannot persist tokens");
        }
    }

    fn discard_tokens(&self) {
        if let Err(e) = TokenSet::clear(&self.store) {
            tracing::warn!(error = %e, "cannot clear stored tokens");
        }
    }

    // -- Plumbing ---------------------------------------------------------

    async fn send_command<C: Connection>(&self, conn: &C, command: RpcCommand) -> Result<(), SessionError> {
        let kind = command.kind();
        let nonce = Nonce::generate();
        tracing::debug!(cmd = %kind, %nonce, "sending command");
        let bytes = command.encode(nonce)?;
        conn.send(&bytes).await?;
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = %self.state, to = %state, "session state");
        self.state = state;
        self.state_tx.send_replace(state);
        self.emit(SessionEvent::State(state));
        self.pending.resolve(state);
    }

    fn emit(&self, event: SessionEvent) {
        // The owner may have stopped listening; the session carries on.
        let _ = self.events.send(event);
    }
}
