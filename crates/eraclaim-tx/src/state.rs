//! Lifecycle states, events and the transition function.

use eraclaim_ledger::{EventRecord, TxStatus};
use eraclaim_types::{hash_to_hex, Balance, BlockHash};
use serde::Serialize;

use crate::cancel::CancelReason;
use crate::classify::{classify_rejection, failure_from_records, has_failure_marker, is_cancellation};
use crate::failure::TxFailure;
use crate::session::TxOutcome;

/// Lifecycle state of one operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TxState {
    #[default]
    Idle,
    /// Waiting for the signer.
    Signing,
    /// Signed and sent; waiting for the pool. Carries the best block hash
    /// known at submission.
    AwaitingNetworkAck {
        #[serde(serialize_with = "serialize_opt_hash")]
        best_block: Option<BlockHash>,
    },
    /// In the pool.
    Pending,
    /// Included, not yet final.
    Finalizing {
        #[serde(serialize_with = "serialize_hash")]
        block_hash: BlockHash,
    },
    Success {
        #[serde(serialize_with = "serialize_hash")]
        block_hash: BlockHash,
    },
    Error {
        failure: TxFailure,
    },
    Canceled {
        reason: CancelReason,
    },
}

fn serialize_hash<S: serde::Serializer>(hash: &BlockHash, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hash_to_hex(hash))
}

fn serialize_opt_hash<S: serde::Serializer>(
    hash: &Option<BlockHash>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match hash {
        Some(hash) => s.serialize_some(&hash_to_hex(hash)),
        None => s.serialize_none(),
    }
}

impl TxState {
    /// Whether no further event is accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success { .. } | Self::Error { .. } | Self::Canceled { .. }
        )
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Signing => "signing",
            Self::AwaitingNetworkAck { .. } => "awaiting_network_ack",
            Self::Pending => "pending",
            Self::Finalizing { .. } => "finalizing",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
            Self::Canceled { .. } => "canceled",
        }
    }

    /// Position along the forward path. Terminal states share the last rank.
    fn rank(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Signing => 1,
            Self::AwaitingNetworkAck { .. } => 2,
            Self::Pending => 3,
            Self::Finalizing { .. } => 4,
            Self::Success { .. } | Self::Error { .. } | Self::Canceled { .. } => 5,
        }
    }

    /// The outcome carried by a terminal state.
    pub fn outcome(&self) -> Option<TxOutcome> {
        match self {
            Self::Success { block_hash } => Some(TxOutcome::Success {
                block_hash: *block_hash,
            }),
            Self::Error { failure } => Some(TxOutcome::Failed(failure.clone())),
            Self::Canceled { reason } => Some(TxOutcome::Canceled(*reason)),
            _ => None,
        }
    }
}

/// Inputs to the lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub enum TxEvent {
    /// Signing requested.
    Start,
    /// Pre-flight found the fee exceeds the free balance.
    InsufficientFunds { required: Balance, available: Balance },
    /// The signer produced a signature and the operation was sent.
    Signed { best_block: Option<BlockHash> },
    /// Accepted into the pool.
    Ready,
    InBlock {
        block_hash: BlockHash,
        records: Vec<EventRecord>,
    },
    Finalized {
        block_hash: BlockHash,
        records: Vec<EventRecord>,
    },
    /// The signer, pool or transport raised an error.
    Rejected { message: String },
    Cancel(CancelReason),
    /// The status stream ended before a terminal status.
    StreamClosed,
}

impl From<TxStatus> for TxEvent {
    fn from(status: TxStatus) -> Self {
        match status {
            TxStatus::Ready => Self::Ready,
            TxStatus::InBlock {
                block_hash,
                records,
            } => Self::InBlock {
                block_hash,
                records,
            },
            TxStatus::Finalized {
                block_hash,
                records,
            } => Self::Finalized {
                block_hash,
                records,
            },
        }
    }
}

/// Advance `state` by `event`.
///
/// Returns `None` only when `state` is terminal. Every non-terminal state
/// accepts every event; an event that would move backwards leaves the
/// state as it is.
pub fn transition(state: &TxState, event: &TxEvent) -> Option<TxState> {
    if state.is_terminal() {
        return None;
    }

    let forward = |next: TxState| {
        if next.rank() > state.rank() {
            next
        } else {
            state.clone()
        }
    };

    let next = match event {
        TxEvent::Start => forward(TxState::Signing),
        TxEvent::InsufficientFunds {
            required,
            available,
        } => TxState::Error {
            failure: TxFailure::InsufficientFunds {
                required: Some(*required),
                available: Some(*available),
            },
        },
        TxEvent::Signed { best_block } => forward(TxState::AwaitingNetworkAck {
            best_block: *best_block,
        }),
        TxEvent::Ready => forward(TxState::Pending),
        TxEvent::InBlock {
            block_hash,
            records,
        } => {
            if has_failure_marker(records) {
                TxState::Error {
                    failure: failure_from_records(records),
                }
            } else {
                forward(TxState::Finalizing {
                    block_hash: *block_hash,
                })
            }
        }
        TxEvent::Finalized {
            block_hash,
            records,
        } => {
            if has_failure_marker(records) {
                TxState::Error {
                    failure: failure_from_records(records),
                }
            } else {
                TxState::Success {
                    block_hash: *block_hash,
                }
            }
        }
        TxEvent::Rejected { message } => {
            if is_cancellation(message) {
                TxState::Canceled {
                    reason: CancelReason::SignerRejected,
                }
            } else {
                TxState::Error {
                    failure: classify_rejection(message),
                }
            }
        }
        TxEvent::Cancel(reason) => TxState::Canceled { reason: *reason },
        TxEvent::StreamClosed => TxState::Error {
            failure: TxFailure::SubmissionFailed {
                message: "status stream closed before finality".to_string(),
            },
        },
    };

    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: BlockHash = [7u8; 32];

    fn non_terminal_states() -> Vec<TxState> {
        vec![
            TxState::Idle,
            TxState::Signing,
            TxState::AwaitingNetworkAck { best_block: None },
            TxState::Pending,
            TxState::Finalizing { block_hash: HASH },
        ]
    }

    fn terminal_states() -> Vec<TxState> {
        vec![
            TxState::Success { block_hash: HASH },
            TxState::Error {
                failure: TxFailure::SubmissionFailed {
                    message: "x".to_string(),
                },
            },
            TxState::Canceled {
                reason: CancelReason::UserRequested,
            },
        ]
    }

    fn all_events() -> Vec<TxEvent> {
        vec![
            TxEvent::Start,
            TxEvent::InsufficientFunds {
                required: 2,
                available: 1,
            },
            TxEvent::Signed {
                best_block: Some(HASH),
            },
            TxEvent::Ready,
            TxEvent::InBlock {
                block_hash: HASH,
                records: vec![],
            },
            TxEvent::Finalized {
                block_hash: HASH,
                records: vec![],
            },
            TxEvent::Rejected {
                message: "boom".to_string(),
            },
            TxEvent::Cancel(CancelReason::UserRequested),
            TxEvent::StreamClosed,
        ]
    }

    fn failed_record() -> EventRecord {
        EventRecord::new(
            "system",
            "ExtrinsicFailed",
            serde_json::json!({ "dispatch_error": { "module": "Staking", "error": "AlreadyClaimed" } }),
        )
    }

    #[test]
    fn test_totality() {
        for state in non_terminal_states() {
            for event in all_events() {
                assert!(
                    transition(&state, &event).is_some(),
                    "{state:?} rejected {event:?}"
                );
            }
        }
        for state in terminal_states() {
            for event in all_events() {
                assert!(transition(&state, &event).is_none());
            }
        }
    }

    #[test]
    fn test_happy_path() {
        let events = [
            TxEvent::Start,
            TxEvent::Signed {
                best_block: Some(HASH),
            },
            TxEvent::Ready,
            TxEvent::InBlock {
                block_hash: HASH,
                records: vec![],
            },
            TxEvent::Finalized {
                block_hash: HASH,
                records: vec![],
            },
        ];
        let mut state = TxState::Idle;
        let mut names = vec![state.name()];
        for event in &events {
            state = transition(&state, event).expect("non-terminal");
            names.push(state.name());
        }
        assert_eq!(
            names,
            vec![
                "idle",
                "signing",
                "awaiting_network_ack",
                "pending",
                "finalizing",
                "success"
            ]
        );
        assert_eq!(
            state.outcome(),
            Some(TxOutcome::Success { block_hash: HASH })
        );
    }

    #[test]
    fn test_backward_events_are_ignored() {
        let finalizing = TxState::Finalizing { block_hash: HASH };
        assert_eq!(transition(&finalizing, &TxEvent::Ready), Some(finalizing.clone()));
        assert_eq!(transition(&finalizing, &TxEvent::Start), Some(finalizing.clone()));
        assert_eq!(
            transition(&TxState::Pending, &TxEvent::Signed { best_block: None }),
            Some(TxState::Pending)
        );
    }

    #[test]
    fn test_ready_may_skip_signed() {
        assert_eq!(
            transition(&TxState::Signing, &TxEvent::Ready),
            Some(TxState::Pending)
        );
    }

    #[test]
    fn test_failure_marker_in_block_is_error() {
        let next = transition(
            &TxState::Pending,
            &TxEvent::InBlock {
                block_hash: HASH,
                records: vec![failed_record()],
            },
        )
        .expect("transition");
        assert!(matches!(
            next,
            TxState::Error {
                failure: TxFailure::ExtrinsicFailed { .. }
            }
        ));
    }

    #[test]
    fn test_failure_marker_at_finality_is_error() {
        let next = transition(
            &TxState::Finalizing { block_hash: HASH },
            &TxEvent::Finalized {
                block_hash: HASH,
                records: vec![failed_record()],
            },
        )
        .expect("transition");
        assert_eq!(next.name(), "error");
    }

    #[test]
    fn test_rejection_classification() {
        let canceled = transition(
            &TxState::Signing,
            &TxEvent::Rejected {
                message: "Cancelled".to_string(),
            },
        );
        assert_eq!(
            canceled,
            Some(TxState::Canceled {
                reason: CancelReason::SignerRejected
            })
        );

        let limit = transition(
            &TxState::AwaitingNetworkAck { best_block: None },
            &TxEvent::Rejected {
                message: "Transaction would exhaust the block limits".to_string(),
            },
        )
        .expect("transition");
        assert!(matches!(
            limit,
            TxState::Error {
                failure: TxFailure::BlockLimitExceeded { .. }
            }
        ));
    }

    #[test]
    fn test_preflight_funds() {
        let next = transition(
            &TxState::Idle,
            &TxEvent::InsufficientFunds {
                required: 10,
                available: 4,
            },
        );
        assert_eq!(
            next,
            Some(TxState::Error {
                failure: TxFailure::InsufficientFunds {
                    required: Some(10),
                    available: Some(4)
                }
            })
        );
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(TxState::Finalizing { block_hash: HASH }).expect("json");
        assert_eq!(json["state"], "finalizing");
        assert_eq!(json["block_hash"], "07".repeat(32));
    }
}
