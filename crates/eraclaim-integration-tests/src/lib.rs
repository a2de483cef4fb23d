//! Integration tests for the eraclaim workspace.
//!
//! The tests under `tests/` drive reward aggregation, payout planning and
//! the claim loop end to end against an in-memory ledger. This library only
//! holds the chain fixtures they share.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p eraclaim-integration-tests
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use eraclaim_ledger::memory::{AccountSnapshot, ChainSnapshot, MemoryLedger, MemorySubscription};
use eraclaim_ledger::{
    AccountStaking, FeeEstimator, Header, HeaderSource, LedgerError, LedgerReader, Operation,
    SubmissionChannel, SubmitError,
};
use eraclaim_types::{
    AccountId, Balance, EraIndex, EraRewardPoints, LedgerEntry, RewardPoint, StakingRole,
};

/// Free balance given to every fixture account.
pub const FUNDED: Balance = 1_000_000_000;

/// Builder for chain snapshots.
#[derive(Clone, Debug)]
pub struct ChainFixture {
    snapshot: ChainSnapshot,
}

impl ChainFixture {
    /// A chain whose active era is `active_era`, with no accounts.
    pub fn at_era(active_era: EraIndex) -> Self {
        Self {
            snapshot: ChainSnapshot {
                active_era: Some(active_era),
                ..ChainSnapshot::default()
            },
        }
    }

    /// A chain that has not learned its tip yet.
    pub fn unknown_era() -> Self {
        Self {
            snapshot: ChainSnapshot::default(),
        }
    }

    /// Add a funded, bonded validator.
    pub fn validator(mut self, name: &str) -> Self {
        let account = AccountId::new(name);
        self.snapshot.accounts.push(AccountSnapshot {
            account: account.clone(),
            free: FUNDED,
            ledger: Some(LedgerEntry::bonded(account, FUNDED / 10)),
            role: StakingRole::Validator,
        });
        self
    }

    /// Add a funded, unbonded account.
    pub fn funded(mut self, name: &str, free: Balance) -> Self {
        self.snapshot.accounts.push(AccountSnapshot {
            account: AccountId::new(name),
            free,
            ledger: None,
            role: StakingRole::Idle,
        });
        self
    }

    /// Set the reward pool and point total of `era`.
    pub fn era(mut self, era: EraIndex, pool: Balance, total_points: RewardPoint) -> Self {
        self.snapshot.era_rewards.insert(era, pool);
        self.snapshot
            .era_points
            .entry(era)
            .or_insert_with(|| EraRewardPoints {
                total: total_points,
                individual: BTreeMap::new(),
            })
            .total = total_points;
        self
    }

    /// Credit `points` to `name` in `era`.
    pub fn points(mut self, era: EraIndex, name: &str, points: RewardPoint) -> Self {
        self.snapshot
            .era_points
            .entry(era)
            .or_default()
            .individual
            .insert(AccountId::new(name), points);
        self
    }

    /// Mark `era` as already claimed on `name`'s ledger.
    pub fn claimed(mut self, era: EraIndex, name: &str) -> Self {
        let account = AccountId::new(name);
        if let Some(ledger) = self
            .snapshot
            .accounts
            .iter_mut()
            .find(|a| a.account == account)
            .and_then(|a| a.ledger.as_mut())
        {
            ledger.claimed_rewards.insert(era);
        }
        self
    }

    /// Set the runtime's `maxNominatorRewardedPerValidator`.
    pub fn max_nominator_rewarded(mut self, max: u32) -> Self {
        self.snapshot.max_nominator_rewarded_per_validator = Some(max);
        self
    }

    pub fn snapshot(&self) -> &ChainSnapshot {
        &self.snapshot
    }

    pub fn build(self) -> MemoryLedger {
        MemoryLedger::new(self.snapshot)
    }
}

/// Shorthand for an account id.
pub fn account(name: &str) -> AccountId {
    AccountId::new(name)
}

/// A chain where each of `validators` earned points in every era of
/// `eras`, with nothing claimed.
pub fn busy_chain(active_era: EraIndex, validators: &[&str], eras: &[EraIndex]) -> ChainFixture {
    let mut fixture = ChainFixture::at_era(active_era);
    for name in validators {
        fixture = fixture.validator(name);
    }
    for era in eras {
        fixture = fixture.era(*era, 1_000, 100);
        for name in validators {
            fixture = fixture.points(*era, name, 10);
        }
    }
    fixture
}

/// Wraps a [`MemoryLedger`] whose `active_era` reads fail with a transport
/// error once `healthy_reads` of them have succeeded.
pub struct FlakyLedger {
    inner: MemoryLedger,
    healthy_reads: usize,
    era_reads: AtomicUsize,
    account_reads: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(inner: MemoryLedger, healthy_reads: usize) -> Self {
        Self {
            inner,
            healthy_reads,
            era_reads: AtomicUsize::new(0),
            account_reads: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryLedger {
        &self.inner
    }

    /// Number of multi-address account reads served so far.
    pub fn account_reads(&self) -> usize {
        self.account_reads.load(Ordering::SeqCst)
    }
}

impl LedgerReader for FlakyLedger {
    async fn active_era(&self) -> eraclaim_ledger::Result<Option<EraIndex>> {
        if self.era_reads.fetch_add(1, Ordering::SeqCst) >= self.healthy_reads {
            return Err(LedgerError::Rpc("connection reset".to_string()));
        }
        self.inner.active_era().await
    }

    async fn era_reward(&self, era: EraIndex) -> eraclaim_ledger::Result<Option<Balance>> {
        self.inner.era_reward(era).await
    }

    async fn era_points(&self, era: EraIndex) -> eraclaim_ledger::Result<Option<EraRewardPoints>> {
        self.inner.era_points(era).await
    }

    async fn accounts(&self, addresses: &[AccountId]) -> eraclaim_ledger::Result<Vec<AccountStaking>> {
        self.account_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.accounts(addresses).await
    }

    async fn free_balance(&self, account: &AccountId) -> eraclaim_ledger::Result<Balance> {
        self.inner.free_balance(account).await
    }

    async fn max_nominator_rewarded_per_validator(&self) -> eraclaim_ledger::Result<Option<u32>> {
        self.inner.max_nominator_rewarded_per_validator().await
    }
}

impl SubmissionChannel for FlakyLedger {
    type Subscription = MemorySubscription;

    async fn submit(
        &self,
        operation: &Operation,
        signer: &AccountId,
    ) -> Result<MemorySubscription, SubmitError> {
        self.inner.submit(operation, signer).await
    }
}

impl HeaderSource for FlakyLedger {
    async fn best_header(&self) -> eraclaim_ledger::Result<Header> {
        self.inner.best_header().await
    }

    async fn next_header(&self) -> eraclaim_ledger::Result<Header> {
        self.inner.next_header().await
    }
}

impl FeeEstimator for FlakyLedger {
    async fn estimate_fee(
        &self,
        operation: &Operation,
        signer: &AccountId,
    ) -> eraclaim_ledger::Result<Balance> {
        self.inner.estimate_fee(operation, signer).await
    }
}
