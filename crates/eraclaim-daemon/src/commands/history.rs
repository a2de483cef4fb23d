//! Transaction history and event backlog queries.

use std::str::FromStr;
use std::sync::Arc;

use eraclaim_db::queries::history::{outcome_counts, recent_transactions};
use eraclaim_types::AccountId;
use serde_json::{json, Value};

use super::{to_json, Result};
use crate::events::EventFilter;
use crate::rpc::RpcError;
use crate::DaemonState;

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const DEFAULT_EVENT_LIMIT: usize = 100;

/// `get_transaction_history`: recorded operations, newest first.
pub async fn get_transaction_history(state: &Arc<DaemonState>, params: &Value) -> Result {
    let signer = params
        .get("signer")
        .and_then(Value::as_str)
        .map(AccountId::from_str)
        .transpose()
        .map_err(|e| RpcError::invalid_params(&e.to_string()))?;
    let limit = params
        .get("limit")
        .and_then(Value::as_u64)
        .map_or(DEFAULT_HISTORY_LIMIT, |l| l.min(u64::from(u32::MAX)) as u32);

    let db = state.db.lock().await;
    let records = recent_transactions(&db, signer.as_ref(), limit)
        .map_err(|e| RpcError::internal_error(&e.to_string()))?;
    let counts = outcome_counts(&db).map_err(|e| RpcError::internal_error(&e.to_string()))?;

    Ok(json!({
        "transactions": to_json(&records)?,
        "counts": to_json(&counts)?,
    }))
}

/// `get_events`: backlogged events after sequence `after`.
pub async fn get_events(state: &Arc<DaemonState>, params: &Value) -> Result {
    let after = params.get("after").and_then(Value::as_u64).unwrap_or(0);
    let limit = params
        .get("limit")
        .and_then(Value::as_u64)
        .map_or(DEFAULT_EVENT_LIMIT, |l| l as usize);
    let filter = EventFilter {
        categories: params.get("categories").and_then(|c| {
            c.as_array().map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
        }),
        signer: params
            .get("signer")
            .and_then(Value::as_str)
            .map(str::to_string),
    };

    let events = state.event_bus.since(after, limit, &filter);
    Ok(json!({
        "events": to_json(&events)?,
        "sequence": state.event_bus.sequence(),
    }))
}
