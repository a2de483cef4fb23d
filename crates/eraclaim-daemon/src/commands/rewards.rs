//! Reward and stake reporting commands.

use std::sync::Arc;

use eraclaim_ledger::LedgerReader;
use eraclaim_payout::{bounded_batch_size, plan};
use eraclaim_rewards::{load_summary, RewardSummary};
use serde_json::{json, Map, Value};

use super::{addresses_param, balance_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

async fn summary(state: &Arc<DaemonState>, params: &Value) -> std::result::Result<RewardSummary, RpcError> {
    let addresses = addresses_param(state, params)?;
    load_summary(
        state.ledger.as_ref(),
        &addresses,
        state.config.ledger.history_depth,
    )
    .await
    .map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// `get_reward_summary`: earned and claimable rewards over the history window.
pub async fn get_reward_summary(state: &Arc<DaemonState>, params: &Value) -> Result {
    let summary = summary(state, params).await?;
    let rewards = &summary.rewards;

    let accounts: Map<String, Value> = rewards
        .accounts
        .iter()
        .map(|(address, r)| {
            (
                address.to_string(),
                json!({
                    "total_earned": balance_json(r.total_earned),
                    "claimable": balance_json(r.claimable),
                    "unclaimed_eras": r.unclaimed_eras,
                }),
            )
        })
        .collect();

    Ok(json!({
        "current_era": summary.current_era,
        "data_available": rewards.data_available,
        "window": rewards.window.as_ref().map(|w| json!({
            "current_era": w.current_era,
            "oldest_era": w.oldest_era,
        })),
        "total_earned": balance_json(rewards.total_earned),
        "total_claimable": balance_json(rewards.total_claimable),
        "pending_payouts": rewards.pending_payouts(),
        "accounts": accounts,
    }))
}

/// `get_stake_summary`: bonded, redeemable and unbonding stake.
pub async fn get_stake_summary(state: &Arc<DaemonState>, params: &Value) -> Result {
    let summary = summary(state, params).await?;
    let stake = &summary.stake;

    Ok(json!({
        "current_era": summary.current_era,
        "total_stake": balance_json(stake.total_stake),
        "own_stake": balance_json(stake.own_stake),
        "redeemable": balance_json(stake.redeemable),
        "unbonding": balance_json(stake.unbonding),
        "bonded_accounts": stake.bonded_accounts,
        "is_validator": stake.is_validator,
        "is_nominator": stake.is_nominator,
    }))
}

/// `get_pending_payouts`: every unclaimed `(validator, era)` unit and how
/// they would be batched.
pub async fn get_pending_payouts(state: &Arc<DaemonState>, params: &Value) -> Result {
    let summary = summary(state, params).await?;

    let constant = state
        .ledger
        .max_nominator_rewarded_per_validator()
        .await
        .map_err(|e| RpcError::internal_error(&e.to_string()))?;
    let batch_size = bounded_batch_size(constant, state.config.claim.max_batch_size);

    let pending = plan(&summary.rewards.unclaimed_by_address(), batch_size);
    let batches = pending.all_units.len().div_ceil(batch_size);

    Ok(json!({
        "units": pending.all_units,
        "batch_size": batch_size,
        "batches": batches,
        "next_batch": pending.next_batch,
    }))
}
