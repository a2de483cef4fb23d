//! Async driver for one operation.
//!
//! A [`TransactionSession`] runs the pre-flight fee check, submits the
//! operation, and feeds every status into [`crate::state::transition`].
//! The session owns the side effects: it publishes each state on a watch
//! channel, records the best block hash seen at submission, and
//! unsubscribes from the status stream exactly once, when a terminal state
//! is reached.
//!
//! Until the first status arrives a grace timer is armed. If it expires
//! the session ends as `Canceled(Silence)`.

use std::time::Duration;

use eraclaim_ledger::{Chain, FeeEstimator, LedgerReader, Operation, SubmitError, TxSubscription};
use eraclaim_types::{hash_to_hex, AccountId, Balance, BlockHash};
use serde::Serialize;
use tokio::sync::watch;

use crate::cancel::{CancelReason, CancelToken};
use crate::failure::TxFailure;
use crate::state::{transition, TxEvent, TxState};

/// Default time allowed between submission and the first status.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Tunables of a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub grace_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TxOutcome {
    Success {
        #[serde(serialize_with = "serialize_hash")]
        block_hash: BlockHash,
    },
    Failed(TxFailure),
    Canceled(CancelReason),
}

fn serialize_hash<S: serde::Serializer>(hash: &BlockHash, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hash_to_hex(hash))
}

impl TxOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Block that included the operation, on success.
    pub fn block_hash(&self) -> Option<BlockHash> {
        match self {
            Self::Success { block_hash } => Some(*block_hash),
            _ => None,
        }
    }
}

/// One run of the lifecycle against one operation.
pub struct TransactionSession {
    operation: Operation,
    signer: AccountId,
    config: SessionConfig,
    state: watch::Sender<TxState>,
    fee_estimate: Option<Balance>,
    best_block: Option<BlockHash>,
}

impl TransactionSession {
    pub fn new(operation: Operation, signer: AccountId, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(TxState::Idle);
        Self {
            operation,
            signer,
            config,
            state,
            fee_estimate: None,
            best_block: None,
        }
    }

    /// Subscribe to state changes.
    pub fn watch(&self) -> watch::Receiver<TxState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> TxState {
        self.state.borrow().clone()
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Fee estimated during pre-flight, if the estimate succeeded.
    pub fn fee_estimate(&self) -> Option<Balance> {
        self.fee_estimate
    }

    /// Best block hash known when the operation was sent.
    pub fn best_block(&self) -> Option<BlockHash> {
        self.best_block
    }

    /// Drive the session to a terminal state.
    pub async fn run<C: Chain>(&mut self, chain: &C, cancel: &mut CancelToken) -> TxOutcome {
        tracing::info!(
            operation = %self.operation.describe(),
            signer = %self.signer,
            "tx: session started"
        );

        let preflight = tokio::select! {
            biased;
            reason = cancel.cancelled() => Some(TxEvent::Cancel(reason)),
            event = self.preflight(chain) => event,
        };
        if let Some(event) = preflight {
            if let Some(outcome) = self.apply(event) {
                return outcome;
            }
        }

        if let Some(outcome) = self.apply(TxEvent::Start) {
            return outcome;
        }

        let best_block = match chain.best_header().await {
            Ok(header) => Some(header.hash),
            Err(e) => {
                tracing::warn!(error = %e, "tx: best header unavailable");
                None
            }
        };

        let submitted = tokio::select! {
            biased;
            reason = cancel.cancelled() => Err(TxEvent::Cancel(reason)),
            result = chain.submit(&self.operation, &self.signer) => result.map_err(rejection),
        };
        let mut subscription = match submitted {
            Ok(subscription) => subscription,
            Err(event) => return self.finish(event),
        };

        if let Some(outcome) = self.apply(TxEvent::Signed { best_block }) {
            subscription.unsubscribe();
            return outcome;
        }

        let grace = tokio::time::sleep(self.config.grace_period);
        tokio::pin!(grace);
        let mut heard = false;

        loop {
            let event = tokio::select! {
                biased;
                reason = cancel.cancelled() => TxEvent::Cancel(reason),
                _ = &mut grace, if !heard => {
                    tracing::warn!(
                        grace_secs = self.config.grace_period.as_secs(),
                        "tx: no status within grace period"
                    );
                    TxEvent::Cancel(CancelReason::Silence)
                }
                status = subscription.next_status() => {
                    heard = true;
                    match status {
                        Some(Ok(status)) => TxEvent::from(status),
                        Some(Err(e)) => rejection(e),
                        None => TxEvent::StreamClosed,
                    }
                }
            };

            if let Some(outcome) = self.apply(event) {
                subscription.unsubscribe();
                return outcome;
            }
        }
    }

    /// Compare the fee estimate with the signer's free balance.
    ///
    /// Either read failing skips the check.
    async fn preflight<R>(&mut self, chain: &R) -> Option<TxEvent>
    where
        R: FeeEstimator + LedgerReader + Sync,
    {
        let fee = match chain.estimate_fee(&self.operation, &self.signer).await {
            Ok(fee) => fee,
            Err(e) => {
                tracing::warn!(error = %e, "tx: fee estimate unavailable, skipping pre-flight");
                return None;
            }
        };
        self.fee_estimate = Some(fee);

        let available = match chain.free_balance(&self.signer).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(error = %e, "tx: balance unavailable, skipping pre-flight");
                return None;
            }
        };

        (fee > available).then_some(TxEvent::InsufficientFunds {
            required: fee,
            available,
        })
    }

    /// Apply `event`, publish the new state, and return the outcome if it
    /// is terminal.
    fn apply(&mut self, event: TxEvent) -> Option<TxOutcome> {
        let current = self.state();
        let next = transition(&current, &event)?;

        if next != current {
            tracing::debug!(from = current.name(), to = next.name(), "tx: transition");
            if let TxState::AwaitingNetworkAck { best_block } = &next {
                self.best_block = *best_block;
            }
            self.state.send_replace(next.clone());
        }

        let outcome = next.outcome()?;
        match &outcome {
            TxOutcome::Success { block_hash } => tracing::info!(
                operation = %self.operation.describe(),
                block = %hash_to_hex(block_hash),
                "tx: finalized"
            ),
            TxOutcome::Failed(failure) => tracing::warn!(
                operation = %self.operation.describe(),
                kind = failure.kind(),
                error = %failure,
                "tx: failed"
            ),
            TxOutcome::Canceled(reason) => tracing::info!(
                operation = %self.operation.describe(),
                ?reason,
                "tx: canceled"
            ),
        }
        Some(outcome)
    }

    /// Apply an event that must end the session.
    fn finish(&mut self, event: TxEvent) -> TxOutcome {
        match self.apply(event) {
            Some(outcome) => outcome,
            None => self.state().outcome().unwrap_or(TxOutcome::Failed(
                TxFailure::SubmissionFailed {
                    message: "session ended without a terminal state".to_string(),
                },
            )),
        }
    }
}

fn rejection(error: SubmitError) -> TxEvent {
    TxEvent::Rejected {
        message: error.to_string(),
    }
}
