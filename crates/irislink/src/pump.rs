//! The event pump: feeds session events to the call-state projector.
//!
//! Runs as its own task next to the session actor. For every session
//! event it updates the projector, republishes the event to
//! subscribers, executes the projector's effects, and publishes the new
//! call snapshot. It also owns the ringing timer: while a call rings it
//! sleeps until the ring deadline, so a missed call clears itself
//! without any further traffic from the chat client.

use std::future::Future;

use irislink_protocol::RpcCommand;
use irislink_session::{SessionEvent, SessionHandle, SessionState};
use irislink_voice::{CallEffect, CallSnapshot, CallStateProjector};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

/// Where projector effects are carried out.
pub(crate) trait CallEffectSink: Send + Sync + 'static {
    fn execute(&self, effect: CallEffect) -> impl Future<Output = ()> + Send;
}

impl CallEffectSink for SessionHandle {
    async fn execute(&self, effect: CallEffect) {
        let result = match effect {
            CallEffect::Subscribe { event, args } => self.subscribe(event, Some(args)).await,
            CallEffect::Unsubscribe { event, args } => self.unsubscribe(event, Some(args)).await,
            CallEffect::RequestSelectedChannel => self.send(RpcCommand::GetSelectedVoiceChannel).await,
            CallEffect::RequestVoiceSettings => self.send(RpcCommand::GetVoiceSettings).await,
        };
        // Requests fail while reconnecting; the next Ready resyncs anyway.
        if let Err(e) = result {
            tracing::debug!(error = %e, "call effect not applied");
        }
    }
}

/// Channels the pump publishes to.
pub(crate) struct PumpOutputs {
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) call_state: watch::Sender<CallSnapshot>,
}

/// Runs until the session's event stream ends.
pub(crate) async fn run<K: CallEffectSink>(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    sink: K,
    mut projector: CallStateProjector,
    outputs: PumpOutputs,
) {
    tracing::debug!("event pump started");

    loop {
        let deadline = projector.ringing_deadline();

        let effects = tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let effects = project(&mut projector, &event);
                // No receivers is fine.
                let _ = outputs.events.send(event);
                effects
            }
            _ = sleep_until(deadline) => projector.expire(Instant::now()),
        };

        for effect in effects {
            sink.execute(effect).await;
        }

        let snapshot = projector.snapshot();
        outputs.call_state.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    tracing::debug!("event pump stopped");
}

fn project(projector: &mut CallStateProjector, event: &SessionEvent) -> Vec<CallEffect> {
    match event {
        SessionEvent::Data(msg) => projector.apply_message(msg, Instant::now()),
        SessionEvent::State(SessionState::Ready) => projector.on_session_ready(),
        SessionEvent::State(SessionState::Reconnecting | SessionState::Disconnected) => {
            projector.reset()
        }
        SessionEvent::State(_) | SessionEvent::Error(_) => Vec::new(),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
