//! Classified failures of a submitted operation.

use eraclaim_ledger::EventRecord;
use eraclaim_types::Balance;
use serde::Serialize;

/// Why an operation ended in `Error`.
#[derive(Clone, Debug, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxFailure {
    /// The signer cannot pay for the operation. Amounts are known when the
    /// pre-flight check caught it.
    #[error("insufficient funds to cover the transaction fee")]
    InsufficientFunds {
        required: Option<Balance>,
        available: Option<Balance>,
    },

    /// The operation does not fit in a block.
    #[error("operation exceeds block limits: {message}")]
    BlockLimitExceeded { message: String },

    /// Included, but the runtime rejected it.
    #[error("extrinsic failed: {}", dispatch_error(.records).unwrap_or("unknown dispatch error"))]
    ExtrinsicFailed { records: Vec<EventRecord> },

    /// Any other submission error, including a closed status stream.
    #[error("submission failed: {message}")]
    SubmissionFailed { message: String },
}

impl TxFailure {
    /// Stable identifier used in history rows and RPC payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::BlockLimitExceeded { .. } => "block_limit_exceeded",
            Self::ExtrinsicFailed { .. } => "extrinsic_failed",
            Self::SubmissionFailed { .. } => "submission_failed",
        }
    }

    /// What the user can do about it, if anything.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::InsufficientFunds { .. } => {
                Some("top up the signing account, then submit again")
            }
            Self::BlockLimitExceeded { .. } => Some("retry with a smaller batch"),
            Self::ExtrinsicFailed { .. } | Self::SubmissionFailed { .. } => None,
        }
    }
}

/// Error name of the first failure record, e.g. `AlreadyClaimed`.
pub fn dispatch_error(records: &[EventRecord]) -> Option<&str> {
    records
        .iter()
        .filter(|r| r.is_failure_marker())
        .find_map(|r| r.data.pointer("/dispatch_error/error"))
        .and_then(serde_json::Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_dispatch_error() {
        let failure = TxFailure::ExtrinsicFailed {
            records: vec![EventRecord::new(
                "system",
                "ExtrinsicFailed",
                serde_json::json!({ "dispatch_error": { "module": "Staking", "error": "AlreadyClaimed" } }),
            )],
        };
        assert_eq!(failure.to_string(), "extrinsic failed: AlreadyClaimed");
        assert_eq!(failure.kind(), "extrinsic_failed");
        assert!(failure.guidance().is_none());
    }

    #[test]
    fn test_block_limit_guidance() {
        let failure = TxFailure::BlockLimitExceeded {
            message: "exhausts resources".to_string(),
        };
        assert_eq!(failure.guidance(), Some("retry with a smaller batch"));
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let failure = TxFailure::InsufficientFunds {
            required: Some(10),
            available: Some(3),
        };
        let json = serde_json::to_value(&failure).expect("serialize");
        assert_eq!(json["kind"], "insufficient_funds");
        assert_eq!(json["required"], 10);
    }
}
