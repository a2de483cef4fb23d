//! Deterministic in-memory ledger.
//!
//! Implements every capability in [`crate::api`] against a [`ChainSnapshot`].
//! Submissions are resolved synchronously: the status stream is filled at
//! submit time and a block is produced for each inclusion. Tests steer the
//! outcome of individual submissions with [`MemoryLedger::script`].
//!
//! Runtime rules enforced on payouts:
//!
//! - an operation carrying more payouts than fit in one block is rejected
//!   by the pool with an "exhaust the block limits" error
//! - a payout for an era already in the stash's claimed set fails with
//!   `AlreadyClaimed`
//! - `batch_all` is atomic: one failing call reverts the whole operation

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use eraclaim_types::{
    AccountId, Balance, BlockHash, BlockNumber, EraIndex, EraRewardPoints, LedgerEntry,
    StakingRole, UnlockChunk, BLOCK_REWARD_CAPACITY, BONDING_DURATION, HISTORY_DEPTH,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::api::{
    AccountStaking, FeeEstimator, HeaderSource, LedgerReader, SubmissionChannel, TxSubscription,
};
use crate::call::{Call, Operation};
use crate::status::{EventRecord, Header, TxStatus};
use crate::{LedgerError, Result, SubmitError};

/// Default flat fee charged per call.
pub const DEFAULT_FEE_PER_CALL: Balance = 1_000;

/// Pool rejection text for operations exceeding block capacity.
pub const BLOCK_LIMIT_MESSAGE: &str =
    "1010: Invalid Transaction: Transaction would exhaust the block limits";

/// Pool rejection text for signers who cannot cover the fee.
pub const FEE_PAYMENT_MESSAGE: &str =
    "1010: Invalid Transaction: Inability to pay some fees , e.g. account balance too low";

/// Staking state of one account in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account: AccountId,
    #[serde(default)]
    pub free: Balance,
    #[serde(default)]
    pub ledger: Option<LedgerEntry>,
    #[serde(default)]
    pub role: StakingRole,
}

/// Serializable chain state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// `None` models a node that has not yet learned the chain tip.
    #[serde(default)]
    pub active_era: Option<EraIndex>,
    #[serde(default)]
    pub block_number: BlockNumber,
    #[serde(default)]
    pub era_rewards: BTreeMap<EraIndex, Balance>,
    #[serde(default)]
    pub era_points: BTreeMap<EraIndex, EraRewardPoints>,
    #[serde(default)]
    pub accounts: Vec<AccountSnapshot>,
    #[serde(default)]
    pub max_nominator_rewarded_per_validator: Option<u32>,
    #[serde(default = "default_fee_per_call")]
    pub fee_per_call: Balance,
}

fn default_fee_per_call() -> Balance {
    DEFAULT_FEE_PER_CALL
}

impl Default for ChainSnapshot {
    fn default() -> Self {
        Self {
            active_era: None,
            block_number: 0,
            era_rewards: BTreeMap::new(),
            era_points: BTreeMap::new(),
            accounts: Vec::new(),
            max_nominator_rewarded_per_validator: None,
            fee_per_call: DEFAULT_FEE_PER_CALL,
        }
    }
}

/// How the next submission resolves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionBehaviour {
    /// Apply the operation under the runtime rules and finalize it.
    Finalize,
    /// Include the operation with an `ExtrinsicFailed` record carrying `error`.
    FailInBlock { error: String },
    /// Raise `message` on the status stream after submission.
    Raise { message: String },
    /// Refuse at signing time with `message`.
    RejectSigning { message: String },
    /// Accept the submission and never emit a status.
    Silent,
}

struct ChainState {
    active_era: Option<EraIndex>,
    block_number: BlockNumber,
    era_rewards: BTreeMap<EraIndex, Balance>,
    era_points: BTreeMap<EraIndex, EraRewardPoints>,
    accounts: BTreeMap<AccountId, AccountSnapshot>,
    max_nominator_rewarded: Option<u32>,
    fee_per_call: Balance,
    script: VecDeque<SubmissionBehaviour>,
    submissions: Vec<Operation>,
}

/// In-memory ledger implementing all four capabilities.
pub struct MemoryLedger {
    state: Mutex<ChainState>,
    unsubscribes: Arc<AtomicUsize>,
}

impl MemoryLedger {
    /// Create a ledger from a snapshot.
    pub fn new(snapshot: ChainSnapshot) -> Self {
        let accounts = snapshot
            .accounts
            .into_iter()
            .map(|a| (a.account.clone(), a))
            .collect();
        Self {
            state: Mutex::new(ChainState {
                active_era: snapshot.active_era,
                block_number: snapshot.block_number,
                era_rewards: snapshot.era_rewards,
                era_points: snapshot.era_points,
                accounts,
                max_nominator_rewarded: snapshot.max_nominator_rewarded_per_validator,
                fee_per_call: snapshot.fee_per_call,
                script: VecDeque::new(),
                submissions: Vec::new(),
            }),
            unsubscribes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Load a snapshot from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: ChainSnapshot = serde_json::from_str(&content)?;
        if let Some(era) = snapshot.active_era {
            if let Some(bad) = snapshot.era_rewards.keys().find(|e| **e > era) {
                return Err(LedgerError::Snapshot(format!(
                    "reward recorded for era {bad}, after active era {era}"
                )));
            }
        }
        tracing::info!(
            path = %path.display(),
            accounts = snapshot.accounts.len(),
            eras = snapshot.era_rewards.len(),
            "loaded chain snapshot"
        );
        Ok(Self::new(snapshot))
    }

    /// Queue the behaviour of the next unscripted submission.
    pub fn script(&self, behaviour: SubmissionBehaviour) {
        self.lock().script.push_back(behaviour);
    }

    /// Every operation submitted so far, in order.
    pub fn submissions(&self) -> Vec<Operation> {
        self.lock().submissions.clone()
    }

    /// How many times any subscription was unsubscribed.
    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    /// Current ledger of `account`.
    pub fn ledger_of(&self, account: &AccountId) -> Option<LedgerEntry> {
        self.lock()
            .accounts
            .get(account)
            .and_then(|a| a.ledger.clone())
    }

    /// Current role of `account`.
    pub fn role_of(&self, account: &AccountId) -> StakingRole {
        self.lock()
            .accounts
            .get(account)
            .map(|a| a.role.clone())
            .unwrap_or_default()
    }

    /// Move the chain to a new active era.
    pub fn set_active_era(&self, era: Option<EraIndex>) {
        self.lock().active_era = era;
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deterministic hash for block `number`.
pub fn block_hash_for(number: BlockNumber) -> BlockHash {
    let mut hash = [0u8; 32];
    hash[..4].copy_from_slice(b"blk:");
    hash[28..].copy_from_slice(&number.to_be_bytes());
    hash
}

impl ChainState {
    fn produce_block(&mut self) -> Header {
        self.block_number = self.block_number.saturating_add(1);
        Header {
            number: self.block_number,
            hash: block_hash_for(self.block_number),
        }
    }

    fn payout_capacity(&self) -> Option<usize> {
        match self.max_nominator_rewarded {
            Some(max) if max > 0 => Some(((BLOCK_REWARD_CAPACITY / max) as usize).max(1)),
            _ => None,
        }
    }

    fn fee_for(&self, operation: &Operation) -> Balance {
        self.fee_per_call.saturating_mul(operation.len() as Balance)
    }

    /// Apply every call of `operation` atomically.
    ///
    /// Returns the success records, or the name of the failing dispatch error.
    fn apply(
        &mut self,
        operation: &Operation,
        signer: &AccountId,
    ) -> std::result::Result<Vec<EventRecord>, String> {
        let mut accounts = self.accounts.clone();
        let mut records = Vec::new();
        for call in operation.calls() {
            records.push(self.apply_call(&mut accounts, call, signer)?);
        }
        self.accounts = accounts;
        if matches!(operation, Operation::BatchAll(_)) {
            records.push(EventRecord::new(
                "utility",
                "BatchCompleted",
                serde_json::Value::Null,
            ));
        }
        records.push(EventRecord::new(
            "system",
            "ExtrinsicSuccess",
            serde_json::Value::Null,
        ));
        Ok(records)
    }

    fn apply_call(
        &self,
        accounts: &mut BTreeMap<AccountId, AccountSnapshot>,
        call: &Call,
        signer: &AccountId,
    ) -> std::result::Result<EventRecord, String> {
        let active_era = self.active_era.unwrap_or(0);
        match call {
            Call::PayoutStakers { validator, era } => {
                let oldest = active_era.saturating_sub(HISTORY_DEPTH);
                if *era >= active_era || *era < oldest {
                    return Err("InvalidEraToReward".to_string());
                }
                let ledger = accounts
                    .get_mut(validator)
                    .and_then(|a| a.ledger.as_mut())
                    .ok_or_else(|| "NotStash".to_string())?;
                if !ledger.claimed_rewards.insert(*era) {
                    return Err("AlreadyClaimed".to_string());
                }
                Ok(EventRecord::new(
                    "staking",
                    "PayoutStarted",
                    serde_json::json!({ "era": era, "validator": validator }),
                ))
            }
            Call::Bond { value, .. } => {
                let account = accounts
                    .entry(signer.clone())
                    .or_insert_with(|| AccountSnapshot {
                        account: signer.clone(),
                        free: 0,
                        ledger: None,
                        role: StakingRole::Idle,
                    });
                if account.ledger.is_some() {
                    return Err("AlreadyBonded".to_string());
                }
                if *value == 0 || account.free < *value {
                    return Err("InsufficientBond".to_string());
                }
                account.ledger = Some(LedgerEntry::bonded(signer.clone(), *value));
                Ok(EventRecord::new(
                    "staking",
                    "Bonded",
                    serde_json::json!({ "stash": signer, "amount": value.to_string() }),
                ))
            }
            Call::BondExtra { value } => {
                let account = accounts
                    .get_mut(signer)
                    .ok_or_else(|| "NotStash".to_string())?;
                let free = account.free;
                let ledger = account
                    .ledger
                    .as_mut()
                    .ok_or_else(|| "NotStash".to_string())?;
                if free < ledger.total.saturating_add(*value) {
                    return Err("InsufficientBond".to_string());
                }
                ledger.total = ledger.total.saturating_add(*value);
                ledger.active = ledger.active.saturating_add(*value);
                Ok(EventRecord::new(
                    "staking",
                    "Bonded",
                    serde_json::json!({ "stash": signer, "amount": value.to_string() }),
                ))
            }
            Call::Unbond { value } => {
                let ledger = accounts
                    .get_mut(signer)
                    .and_then(|a| a.ledger.as_mut())
                    .ok_or_else(|| "NotController".to_string())?;
                let value = (*value).min(ledger.active);
                if value == 0 {
                    return Err("NoMoreChunks".to_string());
                }
                ledger.active -= value;
                ledger.unlocking.push(UnlockChunk {
                    value,
                    era: active_era.saturating_add(BONDING_DURATION),
                });
                Ok(EventRecord::new(
                    "staking",
                    "Unbonded",
                    serde_json::json!({ "stash": signer, "amount": value.to_string() }),
                ))
            }
            Call::Nominate { targets } => {
                if targets.is_empty() {
                    return Err("EmptyTargets".to_string());
                }
                let account = accounts
                    .get_mut(signer)
                    .filter(|a| a.ledger.is_some())
                    .ok_or_else(|| "NotController".to_string())?;
                account.role = StakingRole::Nominator(targets.clone());
                Ok(EventRecord::new(
                    "staking",
                    "Nominated",
                    serde_json::json!({ "stash": signer, "targets": targets }),
                ))
            }
            Call::Chill => {
                let account = accounts
                    .get_mut(signer)
                    .filter(|a| a.ledger.is_some())
                    .ok_or_else(|| "NotController".to_string())?;
                account.role = StakingRole::Idle;
                Ok(EventRecord::new(
                    "staking",
                    "Chilled",
                    serde_json::json!({ "stash": signer }),
                ))
            }
        }
    }

    fn charge_fee(&mut self, signer: &AccountId, fee: Balance) -> bool {
        match self.accounts.get_mut(signer) {
            Some(account) if account.free >= fee => {
                account.free -= fee;
                true
            }
            _ => fee == 0,
        }
    }
}

fn failure_record(error: &str) -> EventRecord {
    EventRecord::new(
        "system",
        "ExtrinsicFailed",
        serde_json::json!({ "dispatch_error": { "module": "Staking", "error": error } }),
    )
}

/// Status stream handed out by [`MemoryLedger`].
pub struct MemorySubscription {
    receiver: mpsc::UnboundedReceiver<std::result::Result<TxStatus, SubmitError>>,
    /// Sender of a silent submission, held so the stream stays open.
    silent: Option<mpsc::UnboundedSender<std::result::Result<TxStatus, SubmitError>>>,
    unsubscribes: Arc<AtomicUsize>,
}

impl TxSubscription for MemorySubscription {
    async fn next_status(&mut self) -> Option<std::result::Result<TxStatus, SubmitError>> {
        self.receiver.recv().await
    }

    fn unsubscribe(&mut self) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.silent = None;
        self.receiver.close();
    }
}

impl LedgerReader for MemoryLedger {
    async fn active_era(&self) -> Result<Option<EraIndex>> {
        Ok(self.lock().active_era)
    }

    async fn era_reward(&self, era: EraIndex) -> Result<Option<Balance>> {
        Ok(self.lock().era_rewards.get(&era).copied())
    }

    async fn era_points(&self, era: EraIndex) -> Result<Option<EraRewardPoints>> {
        Ok(self.lock().era_points.get(&era).cloned())
    }

    async fn accounts(&self, addresses: &[AccountId]) -> Result<Vec<AccountStaking>> {
        let state = self.lock();
        Ok(addresses
            .iter()
            .map(|address| {
                let entry = state.accounts.get(address);
                AccountStaking {
                    account: address.clone(),
                    ledger: entry.and_then(|a| a.ledger.clone()),
                    role: entry.map(|a| a.role.clone()).unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn free_balance(&self, account: &AccountId) -> Result<Balance> {
        Ok(self
            .lock()
            .accounts
            .get(account)
            .map(|a| a.free)
            .unwrap_or(0))
    }

    async fn max_nominator_rewarded_per_validator(&self) -> Result<Option<u32>> {
        Ok(self.lock().max_nominator_rewarded)
    }
}

impl SubmissionChannel for MemoryLedger {
    type Subscription = MemorySubscription;

    async fn submit(
        &self,
        operation: &Operation,
        signer: &AccountId,
    ) -> std::result::Result<MemorySubscription, SubmitError> {
        let mut state = self.lock();
        state.submissions.push(operation.clone());
        let behaviour = state
            .script
            .pop_front()
            .unwrap_or(SubmissionBehaviour::Finalize);

        if let SubmissionBehaviour::RejectSigning { message } = &behaviour {
            tracing::debug!(%signer, %message, "memory ledger: signing rejected");
            return Err(SubmitError::Rejected(message.clone()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let mut subscription = MemorySubscription {
            receiver,
            silent: None,
            unsubscribes: self.unsubscribes.clone(),
        };

        let payouts = operation.payout_units().len();
        let over_capacity = state.payout_capacity().is_some_and(|cap| payouts > cap);
        let fee = state.fee_for(operation);

        // Receivers are alive until the subscription is dropped, so sends
        // below cannot fail while `subscription` is still owned here.
        match behaviour {
            SubmissionBehaviour::Silent => {
                subscription.silent = Some(sender);
            }
            SubmissionBehaviour::Raise { message } => {
                let _ = sender.send(Err(SubmitError::Rejected(message)));
            }
            SubmissionBehaviour::FailInBlock { error } => {
                state.charge_fee(signer, fee);
                let header = state.produce_block();
                let _ = sender.send(Ok(TxStatus::Ready));
                let _ = sender.send(Ok(TxStatus::InBlock {
                    block_hash: header.hash,
                    records: vec![failure_record(&error)],
                }));
            }
            SubmissionBehaviour::Finalize if over_capacity => {
                let _ = sender.send(Err(SubmitError::Rejected(BLOCK_LIMIT_MESSAGE.to_string())));
            }
            SubmissionBehaviour::Finalize => {
                if !state.charge_fee(signer, fee) {
                    let _ =
                        sender.send(Err(SubmitError::Rejected(FEE_PAYMENT_MESSAGE.to_string())));
                    return Ok(subscription);
                }
                let _ = sender.send(Ok(TxStatus::Ready));
                let records = state
                    .apply(operation, signer)
                    .unwrap_or_else(|error| vec![failure_record(&error)]);
                let failed = records.iter().any(EventRecord::is_failure_marker);
                let header = state.produce_block();
                let _ = sender.send(Ok(TxStatus::InBlock {
                    block_hash: header.hash,
                    records: records.clone(),
                }));
                if !failed {
                    let _ = sender.send(Ok(TxStatus::Finalized {
                        block_hash: header.hash,
                        records,
                    }));
                }
            }
            SubmissionBehaviour::RejectSigning { .. } => {}
        }

        tracing::debug!(
            operation = %operation.describe(),
            %signer,
            block = state.block_number,
            "memory ledger: submission resolved"
        );
        Ok(subscription)
    }
}

impl HeaderSource for MemoryLedger {
    async fn best_header(&self) -> Result<Header> {
        let number = self.lock().block_number;
        Ok(Header {
            number,
            hash: block_hash_for(number),
        })
    }

    async fn next_header(&self) -> Result<Header> {
        Ok(self.lock().produce_block())
    }
}

impl FeeEstimator for MemoryLedger {
    async fn estimate_fee(&self, operation: &Operation, _signer: &AccountId) -> Result<Balance> {
        Ok(self.lock().fee_for(operation))
    }
}
