//! Loading aggregation inputs from a ledger.
//!
//! Reads are issued one era at a time. Missing era data is skipped rather
//! than reported, and an unavailable current era degrades to a zeroed
//! report.

use std::collections::BTreeSet;

use eraclaim_ledger::{AccountStaking, LedgerError, LedgerReader};
use eraclaim_types::{AccountId, EraIndex, EraWindow};
use serde::{Deserialize, Serialize};

use crate::accounting::{report, RewardInputs, RewardReport};
use crate::rollup::StakeRollup;
use crate::window::resolve_window;
use crate::Result;

/// Rewards and stake of a set of accounts at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSummary {
    pub current_era: Option<EraIndex>,
    pub rewards: RewardReport,
    pub stake: StakeRollup,
}

/// Read the per-era pools, points and claimed sets for `window`.
pub async fn load_reward_inputs<R>(
    reader: &R,
    addresses: &[AccountId],
    window: &EraWindow,
) -> Result<RewardInputs>
where
    R: LedgerReader + Sync,
{
    let accounts = reader.accounts(addresses).await?;
    load_inputs_for(reader, &accounts, window).await
}

/// Era data for `window`, with claimed sets taken from `accounts`.
async fn load_inputs_for<R>(
    reader: &R,
    accounts: &[AccountStaking],
    window: &EraWindow,
) -> Result<RewardInputs>
where
    R: LedgerReader + Sync,
{
    let mut inputs = RewardInputs::default();

    for era in window.eras() {
        if let Some(pool) = reader.era_reward(era).await? {
            inputs.rewards_by_era.insert(era, pool);
        }
        if let Some(points) = reader.era_points(era).await? {
            inputs.points_by_era.insert(era, points);
        }
    }

    for account in accounts {
        let claimed = account
            .ledger
            .as_ref()
            .map(|ledger| ledger.claimed_rewards.clone())
            .unwrap_or_else(BTreeSet::new);
        inputs.claimed_by_address.insert(account.account.clone(), claimed);
    }

    tracing::debug!(
        eras = inputs.rewards_by_era.len(),
        addresses = accounts.len(),
        "rewards: loaded ledger inputs"
    );

    Ok(inputs)
}

/// Load and aggregate rewards and stake for `addresses`.
///
/// # Errors
///
/// Ledger failures other than [`LedgerError::Unavailable`] are propagated.
pub async fn load_summary<R>(
    reader: &R,
    addresses: &[AccountId],
    history_depth: u32,
) -> Result<RewardSummary>
where
    R: LedgerReader + Sync,
{
    let current_era = match reader.active_era().await {
        Ok(era) => era,
        Err(LedgerError::Unavailable(reason)) => {
            tracing::warn!(%reason, "rewards: active era unavailable");
            None
        }
        Err(e) => return Err(e.into()),
    };

    // One account read feeds both the claimed sets and the stake rollup.
    let accounts = reader.accounts(addresses).await?;
    let window = resolve_window(current_era, history_depth);
    let inputs = match &window {
        Some(window) => load_inputs_for(reader, &accounts, window).await?,
        None => RewardInputs::default(),
    };
    let rewards = report(addresses, window, &inputs)?;
    let stake = StakeRollup::from_accounts(&accounts, current_era);

    tracing::info!(
        era = ?current_era,
        addresses = addresses.len(),
        claimable = %rewards.total_claimable,
        pending = rewards.pending_payouts(),
        "rewards: summary loaded"
    );

    Ok(RewardSummary {
        current_era,
        rewards,
        stake,
    })
}
