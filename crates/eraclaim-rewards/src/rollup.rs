//! Stake totals across a set of accounts.

use eraclaim_ledger::AccountStaking;
use eraclaim_types::{Balance, EraIndex};
use serde::{Deserialize, Serialize};

/// Stake figures summed over every account in a read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRollup {
    /// Sum of `total` over all ledgers, unlocking chunks included.
    pub total_stake: Balance,
    /// Sum of `active` over all ledgers.
    pub own_stake: Balance,
    /// Unlocking chunks whose era has passed.
    pub redeemable: Balance,
    /// All unlocking chunks, redeemable or not.
    pub unbonding: Balance,
    pub bonded_accounts: usize,
    pub is_validator: bool,
    pub is_nominator: bool,
}

impl StakeRollup {
    /// Roll up `accounts`. Redeemable stake is zero when the era is unknown.
    pub fn from_accounts(accounts: &[AccountStaking], current_era: Option<EraIndex>) -> Self {
        let mut rollup = Self::default();
        for account in accounts {
            rollup.is_validator |= account.role.is_validator();
            rollup.is_nominator |= account.role.is_nominator();
            let Some(ledger) = &account.ledger else {
                continue;
            };
            rollup.bonded_accounts += 1;
            rollup.total_stake = rollup.total_stake.saturating_add(ledger.total);
            rollup.own_stake = rollup.own_stake.saturating_add(ledger.active);
            rollup.unbonding = rollup.unbonding.saturating_add(ledger.unbonding());
            if let Some(era) = current_era {
                rollup.redeemable = rollup.redeemable.saturating_add(ledger.redeemable(era));
            }
        }
        rollup
    }
}
