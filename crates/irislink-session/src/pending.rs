//! The single outstanding "tell me when the session reaches state X" slot.

use tokio::sync::oneshot;

use crate::{SessionError, SessionState};

pub(crate) type TransitionReply = oneshot::Sender<Result<(), SessionError>>;

/// Holds at most one waiter for a target state.
///
/// A second waiter while one is live is a programming error and is
/// refused. A waiter whose caller has gone away (receiver dropped) no
/// longer counts as live.
#[derive(Debug, Default)]
pub(crate) struct PendingTransition {
    slot: Option<(SessionState, TransitionReply)>,
}

impl PendingTransition {
    /// Registers a waiter for `target`, or resolves it at once if the
    /// session is already there.
    pub(crate) fn begin(&mut self, current: SessionState, target: SessionState, reply: TransitionReply) {
        if current == target {
            let _ = reply.send(Ok(()));
            return;
        }

        if let Some((pending, existing)) = &self.slot {
            if !existing.is_closed() {
                tracing::error!(
                    %pending,
                    requested = %target,
                    "wait_for called while another transition is pending"
                );
                let _ = reply.send(Err(SessionError::TransitionAlreadyPending {
                    pending: *pending,
                    requested: target,
                }));
                return;
            }
        }

        tracing::debug!(%target, "transition waiter registered");
        self.slot = Some((target, reply));
    }

    /// Resolves the waiter if `state` is the one it waits for.
    pub(crate) fn resolve(&mut self, state: SessionState) {
        if matches!(&self.slot, Some((target, _)) if *target == state) {
            if let Some((_, reply)) = self.slot.take() {
                let _ = reply.send(Ok(()));
            }
        }
    }

    /// Fails the waiter, if any, with `error`.
    pub(crate) fn reject(&mut self, error: SessionError) {
        if let Some((target, reply)) = self.slot.take() {
            tracing::debug!(%target, %error, "transition waiter rejected");
            let _ = reply.send(Err(error));
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.slot.is_some()
    }
}
