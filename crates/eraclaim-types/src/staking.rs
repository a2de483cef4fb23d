//! Staking ledger records and derived claim identifiers.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{AccountId, Balance, EraIndex, RewardPoint};

/// Range of eras that may still hold unclaimed rewards.
///
/// The window is half-open: `oldest_era` is included, `current_era` is not,
/// because the current era has not been paid out yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraWindow {
    pub current_era: EraIndex,
    pub oldest_era: EraIndex,
}

impl EraWindow {
    /// Eras covered by the window, oldest first.
    pub fn eras(&self) -> Range<EraIndex> {
        self.oldest_era..self.current_era
    }

    /// Whether `era` lies inside the window.
    pub fn contains(&self, era: EraIndex) -> bool {
        self.eras().contains(&era)
    }

    /// Number of eras in the window (zero when malformed).
    pub fn len(&self) -> u32 {
        self.current_era.saturating_sub(self.oldest_era)
    }

    /// Whether the window covers no era at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Points earned by validators in one era.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraRewardPoints {
    /// Sum of all validators' points for the era.
    pub total: RewardPoint,
    /// Points per validator.
    #[serde(default)]
    pub individual: BTreeMap<AccountId, RewardPoint>,
}

impl EraRewardPoints {
    /// Points earned by `account`, zero if absent.
    pub fn points_of(&self, account: &AccountId) -> RewardPoint {
        self.individual.get(account).copied().unwrap_or(0)
    }
}

/// A scheduled release of previously bonded stake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockChunk {
    pub value: Balance,
    /// Era at which the chunk becomes redeemable.
    pub era: EraIndex,
}

/// Bonded stake and claim history of one stash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub stash: AccountId,
    /// Total locked, including unlocking chunks.
    pub total: Balance,
    /// Stake actively at work.
    pub active: Balance,
    #[serde(default)]
    pub unlocking: Vec<UnlockChunk>,
    /// Eras whose rewards were paid out on-chain. Only successful payout
    /// calls add to this set.
    #[serde(default)]
    pub claimed_rewards: BTreeSet<EraIndex>,
}

impl LedgerEntry {
    /// A fresh ledger with `value` bonded and nothing unlocking.
    pub fn bonded(stash: AccountId, value: Balance) -> Self {
        Self {
            stash,
            total: value,
            active: value,
            unlocking: Vec::new(),
            claimed_rewards: BTreeSet::new(),
        }
    }

    /// Whether the payout for `era` has already been claimed.
    pub fn is_claimed(&self, era: EraIndex) -> bool {
        self.claimed_rewards.contains(&era)
    }

    /// Sum of unlocking chunks that are redeemable at `current_era`.
    pub fn redeemable(&self, current_era: EraIndex) -> Balance {
        self.unlocking
            .iter()
            .filter(|chunk| chunk.era <= current_era)
            .fold(0, |acc: Balance, chunk| acc.saturating_add(chunk.value))
    }

    /// Sum of all unlocking chunks, redeemable or not.
    pub fn unbonding(&self) -> Balance {
        self.unlocking
            .iter()
            .fold(0, |acc: Balance, chunk| acc.saturating_add(chunk.value))
    }
}

/// What an account currently does in the staking system.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "role", content = "targets")]
pub enum StakingRole {
    /// Bonded or unbonded, but neither validating nor nominating.
    #[default]
    Idle,
    /// Declared intention to validate.
    Validator,
    /// Nominating the given validators.
    Nominator(Vec<AccountId>),
}

impl StakingRole {
    pub fn is_validator(&self) -> bool {
        matches!(self, Self::Validator)
    }

    pub fn is_nominator(&self) -> bool {
        matches!(self, Self::Nominator(_))
    }
}

/// One on-ledger payout call: the rewards of `validator` for `era`.
///
/// Field order matters: the derived ordering sorts by era first, then by
/// validator address, which is the planning order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayoutUnit {
    pub era: EraIndex,
    pub validator: AccountId,
}

impl PayoutUnit {
    pub fn new(validator: AccountId, era: EraIndex) -> Self {
        Self { era, validator }
    }
}
