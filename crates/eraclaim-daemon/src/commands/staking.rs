//! Single staking operations: bond, bond more, unbond, nominate, chill.
//!
//! Each runs one transaction session to a terminal state before replying.

use std::str::FromStr;
use std::sync::Arc;

use eraclaim_ledger::{Call, Operation, RewardDestination};
use eraclaim_tx::{cancellation, TransactionSession};
use eraclaim_types::AccountId;
use serde_json::{json, Value};

use super::{balance_param, outcome_json, record_outcome, signer_param, Result};
use crate::events::Event;
use crate::rpc::RpcError;
use crate::DaemonState;

/// `bond`: lock `value` as stake, paying rewards to `payee`.
pub async fn bond(state: &Arc<DaemonState>, params: &Value) -> Result {
    let value = balance_param(params, "value")?;
    let payee = match params.get("payee") {
        Some(payee) => serde_json::from_value::<RewardDestination>(payee.clone())
            .map_err(|e| RpcError::invalid_params(&format!("payee: {e}")))?,
        None => RewardDestination::default(),
    };
    submit(state, params, Call::Bond { value, payee }).await
}

/// `bond_extra`: add free balance to an existing bond.
pub async fn bond_extra(state: &Arc<DaemonState>, params: &Value) -> Result {
    let value = balance_param(params, "value")?;
    submit(state, params, Call::BondExtra { value }).await
}

/// `unbond`: schedule `value` for release after the bonding duration.
pub async fn unbond(state: &Arc<DaemonState>, params: &Value) -> Result {
    let value = balance_param(params, "value")?;
    submit(state, params, Call::Unbond { value }).await
}

/// `nominate`: back `targets` with the signer's stake.
pub async fn nominate(state: &Arc<DaemonState>, params: &Value) -> Result {
    let targets = params
        .get("targets")
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::invalid_params("missing targets"))?
        .iter()
        .map(|t| {
            t.as_str()
                .ok_or_else(|| RpcError::invalid_params("targets must be strings"))
                .and_then(|s| {
                    AccountId::from_str(s).map_err(|e| RpcError::invalid_params(&e.to_string()))
                })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if targets.is_empty() {
        return Err(RpcError::invalid_params("targets must not be empty"));
    }
    submit(state, params, Call::Nominate { targets }).await
}

/// `chill`: stop validating or nominating.
pub async fn chill(state: &Arc<DaemonState>, params: &Value) -> Result {
    submit(state, params, Call::Chill).await
}

async fn submit(state: &Arc<DaemonState>, params: &Value, call: Call) -> Result {
    let signer = signer_param(state, params)?;
    let operation = Operation::Single(call);
    let mut session =
        TransactionSession::new(operation.clone(), signer.clone(), state.config.session_config());

    // The handle stays alive for the whole session; dropping it would cancel.
    let (_cancel, mut token) = cancellation();
    let outcome = session.run(state.ledger.as_ref(), &mut token).await;

    record_outcome(state, &signer, &operation, &outcome, session.fee_estimate()).await;
    state.event_bus.emit(Event::now(
        "TransactionFinished",
        json!({
            "signer": signer,
            "operation": operation.describe(),
            "outcome": outcome_json(&outcome),
        }),
    ));

    Ok(json!({
        "signer": signer,
        "operation": operation.describe(),
        "fee_estimate": session.fee_estimate().map(super::balance_json),
        "outcome": outcome_json(&outcome),
    }))
}

#[cfg(test)]
mod tests {
    use eraclaim_db::queries::history::{outcome_counts, OutcomeCounts};
    use eraclaim_ledger::memory::{AccountSnapshot, ChainSnapshot, MemoryLedger};
    use eraclaim_types::StakingRole;

    use super::*;
    use crate::config::DaemonConfig;

    fn state(free: u128) -> Arc<DaemonState> {
        let snapshot = ChainSnapshot {
            active_era: Some(10),
            accounts: vec![AccountSnapshot {
                account: AccountId::new("s"),
                free,
                ledger: None,
                role: StakingRole::Idle,
            }],
            ..Default::default()
        };
        let mut config = DaemonConfig::default();
        config.accounts.signer = "s".to_string();
        Arc::new(DaemonState::new(
            MemoryLedger::new(snapshot),
            eraclaim_db::open_memory().expect("db"),
            config,
        ))
    }

    #[tokio::test]
    async fn test_bond_then_nominate() {
        let state = state(100_000);
        let bonded = bond(&state, &json!({"value": "50000"})).await.expect("bond");
        assert_eq!(bonded["operation"], "staking.bond");
        assert_eq!(bonded["outcome"]["outcome"], "success");

        let nominated = nominate(&state, &json!({"targets": ["v1", "v2"]}))
            .await
            .expect("nominate");
        assert_eq!(nominated["outcome"]["outcome"], "success");
        assert!(state.ledger.role_of(&AccountId::new("s")).is_nominator());

        let ledger = state.ledger.ledger_of(&AccountId::new("s")).expect("bonded");
        assert_eq!(ledger.active, 50_000);
    }

    #[tokio::test]
    async fn test_insufficient_funds_recorded() {
        let state = state(10);
        let result = chill(&state, &json!({})).await.expect("chill");
        assert_eq!(result["outcome"]["outcome"], "failed");
        assert_eq!(result["outcome"]["detail"]["kind"], "insufficient_funds");

        let counts = outcome_counts(&*state.db.lock().await).expect("counts");
        assert_eq!(
            counts,
            OutcomeCounts {
                success: 0,
                failed: 1,
                canceled: 0
            }
        );
        assert_eq!(state.event_bus.sequence(), 1);
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let state = state(100_000);
        assert_eq!(bond(&state, &json!({})).await.expect_err("no value").code, -32602);
        assert_eq!(
            nominate(&state, &json!({"targets": []})).await.expect_err("empty").code,
            -32602
        );
        assert_eq!(
            bond(&state, &json!({"value": 1, "payee": 5})).await.expect_err("payee").code,
            -32602
        );
    }
}
