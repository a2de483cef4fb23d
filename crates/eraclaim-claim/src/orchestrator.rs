//! Batch-claim continuation loop.
//!
//! Each cycle plans from the pending view minus the session overlay, runs
//! one [`TransactionSession`] for the head batch, and on success marks the
//! batch in the overlay. Between batches the loop waits for one new block
//! header and then a settle delay, so the next plan sees the ledger left by
//! the previous batch. Batches run strictly one after another.
//!
//! A failed or canceled batch ends the run. Nothing is retried.

use std::collections::BTreeMap;
use std::time::Duration;

use eraclaim_ledger::{Chain, HeaderSource, LedgerReader, Operation};
use eraclaim_payout::{bounded_batch_size, plan, ClaimedOverlay};
use eraclaim_rewards::load_summary;
use eraclaim_types::{AccountId, Balance, EraIndex, PayoutUnit, HISTORY_DEPTH};
use eraclaim_tx::{
    CancelReason, CancelToken, SessionConfig, TransactionSession, TxFailure, TxOutcome, TxState,
};
use serde::Serialize;
use tokio::sync::watch;

use crate::Result;

/// Default pause after the inter-batch header.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Tunables of a claim run.
#[derive(Clone, Debug)]
pub struct ClaimConfig {
    pub session: SessionConfig,
    /// Pause after the inter-batch header.
    pub settle_delay: Duration,
    /// Lowers the bound derived from the runtime constant.
    pub max_batch_size: Option<usize>,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_batch_size: None,
        }
    }
}

/// Where the pending eras of each cycle come from.
#[derive(Clone, Debug)]
pub enum PendingSource {
    /// A fixed view taken before the run.
    Snapshot(BTreeMap<AccountId, Vec<EraIndex>>),
    /// Re-aggregated from the ledger before every batch.
    Ledger {
        addresses: Vec<AccountId>,
        history_depth: u32,
    },
}

impl PendingSource {
    /// Re-aggregate `addresses` with the default history depth.
    pub fn ledger(addresses: Vec<AccountId>) -> Self {
        Self::Ledger {
            addresses,
            history_depth: HISTORY_DEPTH,
        }
    }

    async fn load<C: Chain>(&self, chain: &C) -> Result<BTreeMap<AccountId, Vec<EraIndex>>> {
        match self {
            Self::Snapshot(view) => Ok(view.clone()),
            Self::Ledger {
                addresses,
                history_depth,
            } => {
                let summary = load_summary(chain, addresses, *history_depth).await?;
                Ok(summary.rewards.unclaimed_by_address())
            }
        }
    }
}

/// How a claim run ended.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "terminal", content = "detail", rename_all = "snake_case")]
pub enum ClaimTerminal {
    /// Every pending unit was claimed.
    Completed,
    Failed(TxFailure),
    Canceled(CancelReason),
    /// The pending view could not be reloaded after earlier batches.
    Aborted(String),
}

/// Snapshot of a running claim, published after every change.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ClaimProgress {
    /// Units pending when the run started.
    pub total_units: usize,
    pub claimed_units: usize,
    pub batches_submitted: usize,
    pub active_batch: Vec<PayoutUnit>,
    pub tx_state: TxState,
    /// Set once the run is over.
    pub terminal: Option<ClaimTerminal>,
}

/// Record of one submitted batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchReport {
    pub index: usize,
    pub units: Vec<PayoutUnit>,
    pub operation: Operation,
    pub fee_estimate: Option<Balance>,
    pub outcome: TxOutcome,
}

/// Result of a claim run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClaimOutcome {
    pub batches: Vec<BatchReport>,
    /// Units claimed by this run, in claim order.
    pub claimed: Vec<PayoutUnit>,
    pub terminal: ClaimTerminal,
}

/// One claim run for one signer.
pub struct ClaimSession {
    signer: AccountId,
    source: PendingSource,
    config: ClaimConfig,
    overlay: ClaimedOverlay,
    progress: watch::Sender<ClaimProgress>,
}

impl ClaimSession {
    pub fn new(signer: AccountId, source: PendingSource, config: ClaimConfig) -> Self {
        let (progress, _) = watch::channel(ClaimProgress::default());
        Self {
            signer,
            source,
            config,
            overlay: ClaimedOverlay::new(),
            progress,
        }
    }

    /// Subscribe to progress updates.
    pub fn progress(&self) -> watch::Receiver<ClaimProgress> {
        self.progress.subscribe()
    }

    /// Units claimed so far in this session.
    pub fn overlay(&self) -> &ClaimedOverlay {
        &self.overlay
    }

    /// Run until nothing is pending, a batch fails, or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error only when the pending view cannot be loaded before
    /// the first batch. Later load failures end the run with
    /// [`ClaimTerminal::Aborted`] and keep the batches already submitted.
    pub async fn run<C: Chain>(&mut self, chain: &C, mut cancel: CancelToken) -> Result<ClaimOutcome> {
        let bound = self.batch_bound(chain).await;
        let mut batches: Vec<BatchReport> = Vec::new();
        let mut claimed: Vec<PayoutUnit> = Vec::new();
        let mut first_cycle = true;

        tracing::info!(signer = %self.signer, bound, "claim: run started");

        let terminal = loop {
            if let Some(reason) = cancel.reason() {
                break ClaimTerminal::Canceled(reason);
            }

            let loaded = tokio::select! {
                biased;
                reason = cancel.cancelled() => break ClaimTerminal::Canceled(reason),
                loaded = self.source.load(chain) => loaded,
            };
            let view = match loaded {
                Ok(view) => view,
                Err(e) if batches.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "claim: pending view unavailable, stopping");
                    break ClaimTerminal::Aborted(e.to_string());
                }
            };
            let plan = plan(&self.overlay.filter(&view), bound);
            if first_cycle {
                first_cycle = false;
                self.progress.send_modify(|p| p.total_units = plan.all_units.len());
            }

            let Some(operation) = Operation::payouts(&plan.next_batch) else {
                break ClaimTerminal::Completed;
            };

            let index = batches.len();
            tracing::info!(
                batch = index,
                units = plan.next_batch.len(),
                remaining = plan.remaining.len(),
                first_era = plan.next_batch.first().map(|u| u.era),
                "claim: submitting batch"
            );
            self.progress.send_modify(|p| {
                p.batches_submitted = index + 1;
                p.active_batch = plan.next_batch.clone();
                p.tx_state = TxState::Idle;
            });

            let mut session =
                TransactionSession::new(operation.clone(), self.signer.clone(), self.config.session.clone());
            let outcome = self.drive(&mut session, chain, &mut cancel).await;

            batches.push(BatchReport {
                index,
                units: plan.next_batch.clone(),
                operation,
                fee_estimate: session.fee_estimate(),
                outcome: outcome.clone(),
            });

            match outcome {
                TxOutcome::Success { .. } => {
                    self.overlay.mark(&plan.next_batch);
                    claimed.extend(plan.next_batch.iter().cloned());
                    let claimed_units = claimed.len();
                    self.progress.send_modify(|p| {
                        p.claimed_units = claimed_units;
                        p.active_batch.clear();
                    });
                }
                TxOutcome::Failed(failure) => break ClaimTerminal::Failed(failure),
                TxOutcome::Canceled(reason) => break ClaimTerminal::Canceled(reason),
            }

            if plan.remaining.is_empty() {
                break ClaimTerminal::Completed;
            }

            if let Some(reason) = self.settle(chain, &mut cancel).await {
                break ClaimTerminal::Canceled(reason);
            }
        };

        tracing::info!(
            signer = %self.signer,
            batches = batches.len(),
            claimed = claimed.len(),
            terminal = ?terminal,
            "claim: run finished"
        );
        self.progress.send_modify(|p| {
            p.active_batch.clear();
            p.terminal = Some(terminal.clone());
        });

        Ok(ClaimOutcome {
            batches,
            claimed,
            terminal,
        })
    }

    /// Payout calls per batch. A configured size never exceeds the bound
    /// derived from the runtime constant.
    async fn batch_bound<R: LedgerReader + Sync>(&self, chain: &R) -> usize {
        let constant = match chain.max_nominator_rewarded_per_validator().await {
            Ok(constant) => constant,
            Err(e) => {
                tracing::warn!(error = %e, "claim: runtime constant unavailable, batching singly");
                None
            }
        };
        bounded_batch_size(constant, self.config.max_batch_size)
    }

    /// Run `session`, mirroring its states into the progress channel.
    async fn drive<C: Chain>(
        &self,
        session: &mut TransactionSession,
        chain: &C,
        cancel: &mut CancelToken,
    ) -> TxOutcome {
        let mut states = session.watch();
        let run = session.run(chain, cancel);
        tokio::pin!(run);

        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                Ok(()) = states.changed() => {
                    let state = states.borrow_and_update().clone();
                    self.progress.send_modify(|p| p.tx_state = state);
                }
            }
        };

        let state = states.borrow().clone();
        self.progress.send_modify(|p| p.tx_state = state);
        outcome
    }

    /// Wait for one new header, then the settle delay.
    ///
    /// Returns the cancel reason if cancellation fired meanwhile.
    async fn settle<R: HeaderSource + Sync>(
        &self,
        chain: &R,
        cancel: &mut CancelToken,
    ) -> Option<CancelReason> {
        tokio::select! {
            biased;
            reason = cancel.cancelled() => return Some(reason),
            header = chain.next_header() => match header {
                Ok(header) => tracing::debug!(block = header.number, "claim: new header"),
                Err(e) => tracing::warn!(error = %e, "claim: header wait failed"),
            },
        }

        tokio::select! {
            biased;
            reason = cancel.cancelled() => Some(reason),
            _ = tokio::time::sleep(self.config.settle_delay) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use eraclaim_ledger::memory::{AccountSnapshot, ChainSnapshot, MemoryLedger, SubmissionBehaviour};
    use eraclaim_types::{EraRewardPoints, LedgerEntry, StakingRole};
    use eraclaim_tx::cancellation;

    use super::*;

    fn v(name: &str) -> AccountId {
        AccountId::new(name)
    }

    /// Two validators with points in eras 1..=5 of a chain at era 10.
    fn chain() -> MemoryLedger {
        let mut snapshot = ChainSnapshot {
            active_era: Some(10),
            max_nominator_rewarded_per_validator: Some(576),
            ..Default::default()
        };
        for name in ["v1", "v2"] {
            snapshot.accounts.push(AccountSnapshot {
                account: v(name),
                free: 1_000_000,
                ledger: Some(LedgerEntry::bonded(v(name), 10_000)),
                role: StakingRole::Validator,
            });
        }
        for era in 1..=5 {
            snapshot.era_rewards.insert(era, 10_000);
            snapshot.era_points.insert(
                era,
                EraRewardPoints {
                    total: 20,
                    individual: [(v("v1"), 10), (v("v2"), 10)].into_iter().collect(),
                },
            );
        }
        MemoryLedger::new(snapshot)
    }

    fn config() -> ClaimConfig {
        ClaimConfig {
            session: SessionConfig {
                grace_period: Duration::from_secs(5),
            },
            settle_delay: Duration::from_millis(100),
            max_batch_size: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_claims_everything_from_ledger() {
        let chain = chain();
        let (_cancel, token) = cancellation();
        let mut session = ClaimSession::new(
            v("v1"),
            PendingSource::ledger(vec![v("v1"), v("v2")]),
            config(),
        );
        let progress = session.progress();

        let outcome = session.run(&chain, token).await.expect("run");
        assert_eq!(outcome.terminal, ClaimTerminal::Completed);
        // 2304 / 576 = 4 payouts per batch, 10 units.
        let sizes: Vec<usize> = outcome.batches.iter().map(|b| b.units.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(outcome.claimed.len(), 10);
        for name in ["v1", "v2"] {
            let ledger = chain.ledger_of(&v(name)).expect("ledger");
            assert_eq!(ledger.claimed_rewards.len(), 5);
        }

        let last = progress.borrow().clone();
        assert_eq!(last.total_units, 10);
        assert_eq!(last.claimed_units, 10);
        assert_eq!(last.terminal, Some(ClaimTerminal::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_pending_completes_without_submitting() {
        let chain = chain();
        let (_cancel, token) = cancellation();
        let mut session = ClaimSession::new(v("v1"), PendingSource::Snapshot(BTreeMap::new()), config());

        let outcome = session.run(&chain, token).await.expect("run");
        assert_eq!(outcome.terminal, ClaimTerminal::Completed);
        assert!(outcome.batches.is_empty());
        assert!(chain.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_the_loop() {
        let chain = chain();
        chain.script(SubmissionBehaviour::Finalize);
        chain.script(SubmissionBehaviour::FailInBlock {
            error: "InvalidEraToReward".to_string(),
        });
        let (_cancel, token) = cancellation();
        let pending = BTreeMap::from([(v("v1"), vec![1, 2, 3])]);
        let mut session = ClaimSession::new(
            v("v1"),
            PendingSource::Snapshot(pending),
            ClaimConfig {
                max_batch_size: Some(1),
                ..config()
            },
        );

        let outcome = session.run(&chain, token).await.expect("run");
        assert!(matches!(
            outcome.terminal,
            ClaimTerminal::Failed(TxFailure::ExtrinsicFailed { .. })
        ));
        assert_eq!(outcome.batches.len(), 2);
        assert_eq!(outcome.claimed, vec![PayoutUnit::new(v("v1"), 1)]);
        assert_eq!(chain.submissions().len(), 2);
        assert_eq!(session.overlay().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_batches() {
        let chain = chain();
        let (cancel, token) = cancellation();
        let pending = BTreeMap::from([(v("v1"), vec![1, 2, 3])]);
        let mut session = ClaimSession::new(
            v("v1"),
            PendingSource::Snapshot(pending),
            ClaimConfig {
                max_batch_size: Some(1),
                settle_delay: Duration::from_secs(10),
                ..config()
            },
        );
        let mut progress = session.progress();

        let run = session.run(&chain, token);
        let trigger = async {
            progress
                .wait_for(|p| p.claimed_units == 1)
                .await
                .expect("progress");
            cancel.cancel();
        };
        let (outcome, ()) = tokio::join!(run, trigger);
        let outcome = outcome.expect("run");

        assert_eq!(
            outcome.terminal,
            ClaimTerminal::Canceled(CancelReason::UserRequested)
        );
        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(chain.submissions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_hides_stale_ledger_view() {
        let chain = chain();
        let (_cancel, token) = cancellation();
        // The fixed view never learns about claims; the overlay must.
        let pending = BTreeMap::from([(v("v1"), vec![1, 2]), (v("v2"), vec![1])]);
        let mut session = ClaimSession::new(
            v("v1"),
            PendingSource::Snapshot(pending),
            ClaimConfig {
                max_batch_size: Some(2),
                ..config()
            },
        );

        let outcome = session.run(&chain, token).await.expect("run");
        assert_eq!(outcome.terminal, ClaimTerminal::Completed);
        let submitted: Vec<PayoutUnit> = chain
            .submissions()
            .iter()
            .flat_map(Operation::payout_units)
            .collect();
        assert_eq!(
            submitted,
            vec![
                PayoutUnit::new(v("v1"), 1),
                PayoutUnit::new(v("v2"), 1),
                PayoutUnit::new(v("v1"), 2),
            ]
        );
    }
}
