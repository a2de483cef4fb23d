//! Reward shares and per-address aggregation.
//!
//! ## Formula
//!
//! ```text
//! share = era_pool * validator_points / era_total_points
//! ```
//!
//! Division truncates. The product is evaluated as
//! `(pool / total) * points + (pool % total) * points / total`, which is
//! exact for integers and cannot overflow the `u128` pool.

use std::collections::{BTreeMap, BTreeSet};

use eraclaim_types::{AccountId, Balance, EraIndex, EraRewardPoints, EraWindow, RewardPoint};
use serde::{Deserialize, Serialize};

use crate::{Result, RewardsError};

/// Share of `pool` earned with `points` out of `total`.
///
/// Zero when any of the three is zero.
pub fn reward_share(pool: Balance, points: RewardPoint, total: RewardPoint) -> Balance {
    if pool == 0 || points == 0 || total == 0 {
        return 0;
    }
    let points = Balance::from(points);
    let total = Balance::from(total);
    (pool / total)
        .saturating_mul(points)
        .saturating_add((pool % total) * points / total)
}

/// Raw per-era ledger state the aggregator works from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardInputs {
    pub points_by_era: BTreeMap<EraIndex, EraRewardPoints>,
    pub rewards_by_era: BTreeMap<EraIndex, Balance>,
    /// Claimed eras per address. Missing addresses have claimed nothing.
    pub claimed_by_address: BTreeMap<AccountId, BTreeSet<EraIndex>>,
}

impl RewardInputs {
    fn is_claimed(&self, address: &AccountId, era: EraIndex) -> bool {
        self.claimed_by_address
            .get(address)
            .is_some_and(|claimed| claimed.contains(&era))
    }
}

/// Aggregated rewards of one address over a window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRewards {
    /// Everything earned in the window, claimed or not.
    pub total_earned: Balance,
    /// The unclaimed part of `total_earned`.
    pub claimable: Balance,
    /// Eras with a non-zero unclaimed share, ascending.
    pub unclaimed_eras: Vec<EraIndex>,
}

/// Aggregate rewards for `addresses` over `window`.
///
/// Eras with a zero pool, a zero point total, or no points for an address
/// contribute nothing for that address. Duplicate addresses are folded.
/// Every input address gets an entry, possibly all zero.
///
/// # Errors
///
/// - [`RewardsError::MalformedWindow`] if `window.oldest_era > window.current_era`
pub fn aggregate(
    addresses: &[AccountId],
    window: &EraWindow,
    inputs: &RewardInputs,
) -> Result<BTreeMap<AccountId, AccountRewards>> {
    if window.oldest_era > window.current_era {
        return Err(RewardsError::MalformedWindow {
            oldest: window.oldest_era,
            current: window.current_era,
        });
    }

    let mut out: BTreeMap<AccountId, AccountRewards> = addresses
        .iter()
        .map(|address| (address.clone(), AccountRewards::default()))
        .collect();

    for era in window.eras() {
        let pool = inputs.rewards_by_era.get(&era).copied().unwrap_or(0);
        let Some(points) = inputs.points_by_era.get(&era) else {
            continue;
        };
        if pool == 0 || points.total == 0 {
            continue;
        }

        for (address, rewards) in out.iter_mut() {
            let share = reward_share(pool, points.points_of(address), points.total);
            if share == 0 {
                continue;
            }
            rewards.total_earned = rewards.total_earned.saturating_add(share);
            if !inputs.is_claimed(address, era) {
                rewards.claimable = rewards.claimable.saturating_add(share);
                rewards.unclaimed_eras.push(era);
            }
        }
    }

    tracing::trace!(
        addresses = out.len(),
        oldest = window.oldest_era,
        current = window.current_era,
        "rewards: aggregated window"
    );

    Ok(out)
}

/// Aggregated rewards across a set of addresses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardReport {
    /// `false` when the current era was unknown and all figures are zero.
    pub data_available: bool,
    pub window: Option<EraWindow>,
    pub accounts: BTreeMap<AccountId, AccountRewards>,
    pub total_earned: Balance,
    pub total_claimable: Balance,
}

impl RewardReport {
    /// Unclaimed eras per address, the planner's input.
    pub fn unclaimed_by_address(&self) -> BTreeMap<AccountId, Vec<EraIndex>> {
        self.accounts
            .iter()
            .filter(|(_, rewards)| !rewards.unclaimed_eras.is_empty())
            .map(|(address, rewards)| (address.clone(), rewards.unclaimed_eras.clone()))
            .collect()
    }

    /// Number of `(validator, era)` payouts still pending.
    pub fn pending_payouts(&self) -> usize {
        self.accounts.values().map(|r| r.unclaimed_eras.len()).sum()
    }
}

/// Aggregate and total rewards, tolerating an unknown window.
///
/// An unknown window yields a zeroed report with `data_available = false`.
///
/// # Errors
///
/// - [`RewardsError::MalformedWindow`] as for [`aggregate`]
pub fn report(
    addresses: &[AccountId],
    window: Option<EraWindow>,
    inputs: &RewardInputs,
) -> Result<RewardReport> {
    let Some(window) = window else {
        return Ok(RewardReport {
            accounts: addresses
                .iter()
                .map(|address| (address.clone(), AccountRewards::default()))
                .collect(),
            ..RewardReport::default()
        });
    };

    let accounts = aggregate(addresses, &window, inputs)?;
    let total_earned = accounts
        .values()
        .fold(0, |acc: Balance, r| acc.saturating_add(r.total_earned));
    let total_claimable = accounts
        .values()
        .fold(0, |acc: Balance, r| acc.saturating_add(r.claimable));

    Ok(RewardReport {
        data_available: true,
        window: Some(window),
        accounts,
        total_earned,
        total_claimable,
    })
}
