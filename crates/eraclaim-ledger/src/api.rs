//! Capability traits consumed by the claim engine.
//!
//! Implementors provide the actual ledger I/O. Keeping the engine behind
//! these traits lets every component run against [`crate::memory::MemoryLedger`]
//! in tests without a node.

use std::future::Future;

use eraclaim_types::{AccountId, Balance, EraIndex, EraRewardPoints, LedgerEntry, StakingRole};
use serde::{Deserialize, Serialize};

use crate::call::Operation;
use crate::status::{Header, TxStatus};
use crate::{Result, SubmitError};

/// Staking state of one account as returned by a multi-address read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStaking {
    pub account: AccountId,
    /// `None` when the account is not bonded.
    pub ledger: Option<LedgerEntry>,
    pub role: StakingRole,
}

/// Point-in-time reads of staking storage.
pub trait LedgerReader {
    /// The active era, or `None` while the chain tip is unknown.
    fn active_era(&self) -> impl Future<Output = Result<Option<EraIndex>>> + Send;

    /// Total reward minted for `era`, `None` if not yet known.
    fn era_reward(&self, era: EraIndex) -> impl Future<Output = Result<Option<Balance>>> + Send;

    /// Validator points for `era`, `None` if not yet known.
    fn era_points(
        &self,
        era: EraIndex,
    ) -> impl Future<Output = Result<Option<EraRewardPoints>>> + Send;

    /// Batched ledger and role read for several addresses, in input order.
    fn accounts(
        &self,
        addresses: &[AccountId],
    ) -> impl Future<Output = Result<Vec<AccountStaking>>> + Send;

    /// Transferable balance of `account`.
    fn free_balance(&self, account: &AccountId) -> impl Future<Output = Result<Balance>> + Send;

    /// The `maxNominatorRewardedPerValidator` constant, if the runtime exposes it.
    fn max_nominator_rewarded_per_validator(
        &self,
    ) -> impl Future<Output = Result<Option<u32>>> + Send;
}

/// Status stream of one submitted operation.
pub trait TxSubscription: Send {
    /// Next status update. `None` once the stream has ended.
    fn next_status(
        &mut self,
    ) -> impl Future<Output = Option<std::result::Result<TxStatus, SubmitError>>> + Send;

    /// Stop receiving updates.
    fn unsubscribe(&mut self);
}

/// Signs and submits operations.
pub trait SubmissionChannel {
    type Subscription: TxSubscription;

    /// Sign `operation` as `signer` and submit it, returning the status stream.
    ///
    /// A signer refusal surfaces as [`SubmitError::Rejected`] here; pool and
    /// runtime failures arrive on the stream.
    fn submit(
        &self,
        operation: &Operation,
        signer: &AccountId,
    ) -> impl Future<Output = std::result::Result<Self::Subscription, SubmitError>> + Send;
}

/// Block headers.
pub trait HeaderSource {
    /// Latest known header.
    fn best_header(&self) -> impl Future<Output = Result<Header>> + Send;

    /// Wait for the next new header and return it.
    fn next_header(&self) -> impl Future<Output = Result<Header>> + Send;
}

/// Fee estimation for unsigned operations.
pub trait FeeEstimator {
    fn estimate_fee(
        &self,
        operation: &Operation,
        signer: &AccountId,
    ) -> impl Future<Output = Result<Balance>> + Send;
}

/// Everything the claim engine needs from a ledger.
pub trait Chain: LedgerReader + SubmissionChannel + HeaderSource + FeeEstimator + Send + Sync {}

impl<T> Chain for T where
    T: LedgerReader + SubmissionChannel + HeaderSource + FeeEstimator + Send + Sync
{
}
