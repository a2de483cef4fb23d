//! Cancellation signal shared by a claim session and its caller.
//!
//! A [`CancelHandle`] fires a [`CancelToken`]. Dropping the handle without
//! firing it also cancels, with [`CancelReason::HandleDropped`]: the caller
//! went away and nothing will observe the result.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Why a session ended in `Canceled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The signer declined to sign.
    SignerRejected,
    /// The caller asked to stop.
    UserRequested,
    /// The cancel handle was dropped.
    HandleDropped,
    /// No status arrived within the grace period.
    Silence,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignerRejected => "signer_rejected",
            Self::UserRequested => "user_requested",
            Self::HandleDropped => "handle_dropped",
            Self::Silence => "silence",
        }
    }
}

/// Fires cancellation.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<Option<CancelReason>>,
}

/// Observes cancellation.
#[derive(Clone, Debug)]
pub struct CancelToken {
    receiver: watch::Receiver<Option<CancelReason>>,
}

/// Create a connected handle and token.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = watch::channel(None);
    (CancelHandle { sender }, CancelToken { receiver })
}

impl CancelHandle {
    /// Cancel with [`CancelReason::UserRequested`].
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::UserRequested);
    }

    /// Cancel with `reason`. Only the first reason sticks.
    pub fn cancel_with(&self, reason: CancelReason) {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.sender.borrow().is_some()
    }
}

impl CancelToken {
    /// The cancellation reason, if cancellation has happened.
    pub fn reason(&self) -> Option<CancelReason> {
        let fired = *self.receiver.borrow();
        match fired {
            Some(reason) => Some(reason),
            None if self.receiver.has_changed().is_err() => Some(CancelReason::HandleDropped),
            None => None,
        }
    }

    /// Resolve once cancelled. Cancel-safe.
    pub async fn cancelled(&mut self) -> CancelReason {
        loop {
            let fired = *self.receiver.borrow_and_update();
            if let Some(reason) = fired {
                return reason;
            }
            if self.receiver.changed().await.is_err() {
                let fired = *self.receiver.borrow();
                return fired.unwrap_or(CancelReason::HandleDropped);
            }
        }
    }
}
