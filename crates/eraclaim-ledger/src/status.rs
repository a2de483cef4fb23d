//! Submission statuses, event records and block headers.

use eraclaim_types::{BlockHash, BlockNumber};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// A block header, reduced to what the engine uses.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub number: BlockNumber,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub hash: BlockHash,
}

/// A runtime event emitted while applying an extrinsic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub pallet: String,
    pub method: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventRecord {
    pub fn new(pallet: &str, method: &str, data: serde_json::Value) -> Self {
        Self {
            pallet: pallet.to_string(),
            method: method.to_string(),
            data,
        }
    }

    /// Case-insensitive match on `pallet.method`.
    pub fn is(&self, pallet: &str, method: &str) -> bool {
        self.pallet.eq_ignore_ascii_case(pallet) && self.method.eq_ignore_ascii_case(method)
    }

    /// Whether this record marks the extrinsic (or part of a batch) as failed.
    pub fn is_failure_marker(&self) -> bool {
        self.is("system", "ExtrinsicFailed") || self.is("utility", "BatchInterrupted")
    }
}

/// Status update for a submitted operation.
#[derive(Clone, Debug, PartialEq)]
pub enum TxStatus {
    /// Accepted into the transaction pool.
    Ready,
    /// Included in a block.
    InBlock {
        block_hash: BlockHash,
        records: Vec<EventRecord>,
    },
    /// The including block was finalized.
    Finalized {
        block_hash: BlockHash,
        records: Vec<EventRecord>,
    },
}
