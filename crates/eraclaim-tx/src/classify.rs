//! Classification of rejection messages and failure records.
//!
//! Signers do not report refusals through a structured signal, so a
//! refusal is recognised from its message text. That heuristic lives in
//! [`is_cancellation`] alone.

use eraclaim_ledger::EventRecord;

use crate::failure::TxFailure;

const CANCELLATION_MARKERS: &[&str] = &["cancelled", "canceled", "rejected by user", "user rejected"];

const FUNDS_MARKERS: &[&str] = &["inability to pay", "insufficient balance", "balance too low"];

const BLOCK_LIMIT_MARKERS: &[&str] = &["exhaust the block limits", "exhaustsresources", "exhausts resources"];

/// Whether a rejection message means the signer declined.
pub fn is_cancellation(message: &str) -> bool {
    let message = message.to_lowercase();
    CANCELLATION_MARKERS.iter().any(|m| message.contains(m))
}

/// Classify a rejection raised by the signer, the pool, or the transport.
pub fn classify_rejection(message: &str) -> TxFailure {
    let lower = message.to_lowercase();
    if FUNDS_MARKERS.iter().any(|m| lower.contains(m)) {
        TxFailure::InsufficientFunds {
            required: None,
            available: None,
        }
    } else if BLOCK_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        TxFailure::BlockLimitExceeded {
            message: message.to_string(),
        }
    } else {
        TxFailure::SubmissionFailed {
            message: message.to_string(),
        }
    }
}

/// Whether any record marks the operation as failed.
pub fn has_failure_marker(records: &[EventRecord]) -> bool {
    records.iter().any(EventRecord::is_failure_marker)
}

/// Classify the records of a failed inclusion.
pub fn failure_from_records(records: &[EventRecord]) -> TxFailure {
    let detail = records
        .iter()
        .filter(|r| r.is_failure_marker())
        .map(|r| r.data.to_string().to_lowercase())
        .collect::<String>();

    if detail.contains("insufficientbalance") || detail.contains("inabilitytopay") {
        TxFailure::InsufficientFunds {
            required: None,
            available: None,
        }
    } else if detail.contains("exhaustsresources") {
        TxFailure::BlockLimitExceeded {
            message: "dispatch exhausted block resources".to_string(),
        }
    } else {
        TxFailure::ExtrinsicFailed {
            records: records.to_vec(),
        }
    }
}
