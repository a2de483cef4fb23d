//! RPC command handlers, grouped by area.
//!
//! Every handler takes the shared [`DaemonState`] and the raw request
//! params and returns a JSON value or an [`RpcError`].

pub mod claims;
pub mod history;
pub mod rewards;
pub mod staking;

use std::str::FromStr;

use eraclaim_db::queries::history::{record_transaction, NewTransaction, OutcomeKind};
use eraclaim_ledger::Operation;
use eraclaim_types::{AccountId, Balance};
use eraclaim_tx::TxOutcome;
use serde_json::Value;

use crate::events::unix_now;
use crate::rpc::RpcError;
use crate::DaemonState;

pub type Result = std::result::Result<Value, RpcError>;

/// `params.addresses`, falling back to the configured addresses.
pub(crate) fn addresses_param(
    state: &DaemonState,
    params: &Value,
) -> std::result::Result<Vec<AccountId>, RpcError> {
    match params.get("addresses") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| RpcError::invalid_params("addresses must be strings"))
                    .and_then(|s| {
                        AccountId::from_str(s).map_err(|e| RpcError::invalid_params(&e.to_string()))
                    })
            })
            .collect(),
        Some(_) => Err(RpcError::invalid_params("addresses must be an array")),
        None => state
            .config
            .addresses()
            .map_err(|e| RpcError::internal_error(&e.to_string())),
    }
}

/// `params.signer`, falling back to the configured signer.
pub(crate) fn signer_param(
    state: &DaemonState,
    params: &Value,
) -> std::result::Result<AccountId, RpcError> {
    match params.get("signer").and_then(|v| v.as_str()) {
        Some(s) => AccountId::from_str(s).map_err(|e| RpcError::invalid_params(&e.to_string())),
        None => state.config.signer().ok_or_else(RpcError::signer_required),
    }
}

/// A balance given as a decimal string or a JSON integer.
pub(crate) fn balance_param(params: &Value, name: &str) -> std::result::Result<Balance, RpcError> {
    match params.get(name) {
        Some(Value::String(s)) => s
            .parse::<Balance>()
            .map_err(|e| RpcError::invalid_params(&format!("{name}: {e}"))),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Balance::from)
            .ok_or_else(|| RpcError::invalid_params(&format!("{name} must be a non-negative integer"))),
        _ => Err(RpcError::invalid_params(&format!("missing {name}"))),
    }
}

/// Balances go over the wire as decimal strings.
pub(crate) fn balance_json(value: Balance) -> Value {
    Value::String(value.to_string())
}

/// Serialize any response payload.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// Outcome payload shared by every submitting command.
pub(crate) fn outcome_json(outcome: &TxOutcome) -> Value {
    let mut value = serde_json::to_value(outcome).unwrap_or(Value::Null);
    if let (TxOutcome::Failed(failure), Value::Object(map)) = (outcome, &mut value) {
        map.insert("message".to_string(), Value::String(failure.to_string()));
        if let Some(guidance) = failure.guidance() {
            map.insert("guidance".to_string(), Value::String(guidance.to_string()));
        }
    }
    value
}

/// Record a finished operation in the transaction history.
///
/// History is best effort: a write failure is logged and otherwise ignored.
pub(crate) async fn record_outcome(
    state: &DaemonState,
    signer: &AccountId,
    operation: &Operation,
    outcome: &TxOutcome,
    fee_estimate: Option<Balance>,
) {
    let units = operation.payout_units();
    let eras = units
        .iter()
        .map(|u| u.era)
        .min()
        .zip(units.iter().map(|u| u.era).max());

    let (kind, detail) = match outcome {
        TxOutcome::Success { .. } => (OutcomeKind::Success, None),
        TxOutcome::Failed(failure) => (
            OutcomeKind::Failed,
            Some(format!("{}: {failure}", failure.kind())),
        ),
        TxOutcome::Canceled(reason) => (OutcomeKind::Canceled, Some(reason.as_str().to_string())),
    };
    let description = operation.describe();

    let tx = NewTransaction {
        signer,
        operation: &description,
        call_count: operation.len(),
        eras,
        outcome: kind,
        detail: detail.as_deref(),
        block_hash: outcome.block_hash(),
        fee_estimate,
        recorded_at: unix_now(),
    };

    let db = state.db.lock().await;
    if let Err(e) = record_transaction(&db, &tx) {
        tracing::warn!(error = %e, operation = %description, "Failed to record transaction");
    }
}

#[cfg(test)]
mod tests {
    use eraclaim_ledger::memory::{ChainSnapshot, MemoryLedger};
    use serde_json::json;

    use super::*;
    use crate::config::DaemonConfig;

    fn state(config: DaemonConfig) -> DaemonState {
        DaemonState::new(
            MemoryLedger::new(ChainSnapshot::default()),
            eraclaim_db::open_memory().expect("db"),
            config,
        )
    }

    #[test]
    fn test_addresses_fall_back_to_config() {
        let mut config = DaemonConfig::default();
        config.accounts.addresses = vec!["a".to_string(), "b".to_string()];
        let state = state(config);

        let from_config = addresses_param(&state, &json!({})).expect("addresses");
        assert_eq!(from_config, vec![AccountId::new("a"), AccountId::new("b")]);

        let explicit = addresses_param(&state, &json!({"addresses": ["c"]})).expect("addresses");
        assert_eq!(explicit, vec![AccountId::new("c")]);

        let err = addresses_param(&state, &json!({"addresses": "c"})).expect_err("not an array");
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn test_signer_required() {
        let state = state(DaemonConfig::default());
        let err = signer_param(&state, &json!({})).expect_err("no signer");
        assert_eq!(err.code, -32052);
        assert_eq!(
            signer_param(&state, &json!({"signer": "s"})).expect("signer"),
            AccountId::new("s")
        );
    }

    #[test]
    fn test_balance_param_forms() {
        assert_eq!(balance_param(&json!({"value": "1000"}), "value").expect("string"), 1000);
        assert_eq!(balance_param(&json!({"value": 7}), "value").expect("number"), 7);
        assert!(balance_param(&json!({"value": -1}), "value").is_err());
        assert!(balance_param(&json!({}), "value").is_err());
        assert_eq!(balance_json(5), json!("5"));
    }

    #[test]
    fn test_failed_outcome_json_carries_guidance() {
        let outcome = TxOutcome::Failed(eraclaim_tx::TxFailure::BlockLimitExceeded {
            message: "too big".to_string(),
        });
        let value = outcome_json(&outcome);
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["detail"]["kind"], "block_limit_exceeded");
        assert_eq!(value["guidance"], "retry with a smaller batch");
    }
}
