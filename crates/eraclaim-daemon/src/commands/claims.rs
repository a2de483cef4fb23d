//! Batch-claim commands.
//!
//! A claim run is a background task owned by the daemon. At most one runs
//! at a time; its progress is polled with `get_claim_status` and it can be
//! stopped between suspension points with `cancel_claim`.

use std::sync::Arc;

use eraclaim_claim::{ClaimOutcome, ClaimSession, ClaimTerminal, PendingSource};
use eraclaim_tx::cancellation;
use eraclaim_types::AccountId;
use rand::RngCore;
use serde_json::{json, Value};

use super::{addresses_param, outcome_json, record_outcome, signer_param, to_json, Result};
use crate::events::Event;
use crate::rpc::RpcError;
use crate::{ActiveClaim, DaemonState};

/// `claim_all_rewards`: start claiming every pending payout of `addresses`.
pub async fn claim_all_rewards(state: &Arc<DaemonState>, params: &Value) -> Result {
    let signer = signer_param(state, params)?;
    let addresses = addresses_param(state, params)?;
    if addresses.is_empty() {
        return Err(RpcError::invalid_params("no addresses to claim for"));
    }

    let mut slot = state.claim.lock().await;
    if let Some(active) = slot.as_ref().filter(|a| a.is_running()) {
        return Err(RpcError::claim_in_progress(&active.id));
    }

    let claim_id = new_claim_id();
    let source = PendingSource::Ledger {
        addresses: addresses.clone(),
        history_depth: state.config.ledger.history_depth,
    };
    let mut session = ClaimSession::new(signer.clone(), source, state.config.claim_config());
    let progress = session.progress();
    let (cancel, token) = cancellation();

    tracing::info!(claim_id = %claim_id, signer = %signer, addresses = addresses.len(), "Claim started");
    state.event_bus.emit(Event::now(
        "ClaimStarted",
        json!({
            "claim_id": claim_id,
            "signer": signer,
            "addresses": addresses,
        }),
    ));

    let task = {
        let state = state.clone();
        let claim_id = claim_id.clone();
        let signer = signer.clone();
        tokio::spawn(async move {
            let result = session.run(state.ledger.as_ref(), token).await;
            finish_claim(&state, &claim_id, &signer, result).await;
        })
    };

    *slot = Some(ActiveClaim {
        id: claim_id.clone(),
        signer: signer.clone(),
        cancel,
        progress,
        task,
    });

    Ok(json!({
        "claim_id": claim_id,
        "signer": signer,
    }))
}

/// `get_claim_status`: progress of the current or most recent run.
pub async fn get_claim_status(state: &Arc<DaemonState>) -> Result {
    let slot = state.claim.lock().await;
    let active = slot.as_ref().ok_or_else(RpcError::no_active_claim)?;
    let progress = active.progress.borrow().clone();

    Ok(json!({
        "claim_id": active.id,
        "signer": active.signer,
        "running": active.is_running(),
        "progress": to_json(&progress)?,
    }))
}

/// `cancel_claim`: stop the running claim before its next suspension point.
pub async fn cancel_claim(state: &Arc<DaemonState>) -> Result {
    let slot = state.claim.lock().await;
    let active = slot
        .as_ref()
        .filter(|a| a.is_running())
        .ok_or_else(RpcError::no_active_claim)?;

    active.cancel.cancel();
    tracing::info!(claim_id = %active.id, "Claim cancellation requested");

    Ok(json!({
        "claim_id": active.id,
        "canceled": true,
    }))
}

fn new_claim_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Record every submitted batch and announce the end of the run.
async fn finish_claim(
    state: &DaemonState,
    claim_id: &str,
    signer: &AccountId,
    result: eraclaim_claim::Result<ClaimOutcome>,
) {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(claim_id, error = %e, "Claim aborted");
            state.event_bus.emit(Event::now(
                "ClaimFinished",
                json!({
                    "claim_id": claim_id,
                    "signer": signer,
                    "terminal": "aborted",
                    "error": e.to_string(),
                }),
            ));
            return;
        }
    };

    for batch in &outcome.batches {
        record_outcome(
            state,
            signer,
            &batch.operation,
            &batch.outcome,
            batch.fee_estimate,
        )
        .await;
        state.event_bus.emit(Event::now(
            "ClaimBatchFinished",
            json!({
                "claim_id": claim_id,
                "signer": signer,
                "index": batch.index,
                "units": batch.units,
                "outcome": outcome_json(&batch.outcome),
            }),
        ));
    }

    match &outcome.terminal {
        ClaimTerminal::Completed => {
            tracing::info!(claim_id, claimed = outcome.claimed.len(), "Claim completed")
        }
        ClaimTerminal::Failed(failure) => {
            tracing::warn!(claim_id, error = %failure, "Claim failed")
        }
        ClaimTerminal::Canceled(reason) => {
            tracing::info!(claim_id, reason = reason.as_str(), "Claim canceled")
        }
        ClaimTerminal::Aborted(reason) => tracing::error!(
            claim_id,
            batches = outcome.batches.len(),
            %reason,
            "Claim aborted after partial progress"
        ),
    }

    state.event_bus.emit(Event::now(
        "ClaimFinished",
        json!({
            "claim_id": claim_id,
            "signer": signer,
            "batches": outcome.batches.len(),
            "claimed_units": outcome.claimed.len(),
            "terminal": serde_json::to_value(&outcome.terminal).unwrap_or(Value::Null),
        }),
    ));
}
