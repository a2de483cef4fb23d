//! # eraclaim-ledger
//!
//! Boundary between the claim engine and the ledger it runs against.
//!
//! The engine consumes four capabilities and nothing else:
//!
//! - [`api::LedgerReader`]: point-in-time reads of eras, rewards, points and
//!   account ledgers
//! - [`api::SubmissionChannel`]: submits an [`call::Operation`] and streams
//!   its [`status::TxStatus`] updates
//! - [`api::HeaderSource`]: block headers, used as a synchronization barrier
//! - [`api::FeeEstimator`]: fee estimates for pre-flight checks
//!
//! [`memory::MemoryLedger`] implements all four deterministically and is the
//! backend for tests and for snapshot-driven daemon runs.

pub mod api;
pub mod call;
pub mod memory;
pub mod status;

pub use api::{
    AccountStaking, Chain, FeeEstimator, HeaderSource, LedgerReader, SubmissionChannel,
    TxSubscription,
};
pub use call::{Call, Operation, RewardDestination};
pub use status::{EventRecord, Header, TxStatus};

/// Error types for ledger reads.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The ledger has no answer yet (node syncing, storage item absent).
    #[error("ledger data unavailable: {0}")]
    Unavailable(String),

    /// The underlying transport failed.
    #[error("ledger rpc error: {0}")]
    Rpc(String),

    /// A chain snapshot could not be loaded.
    #[error("invalid chain snapshot: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the submission channel, before or after signing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The signer or the transaction pool refused the operation. The message
    /// is passed through verbatim for classification.
    #[error("{0}")]
    Rejected(String),

    /// The connection to the node failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Convenience result type for ledger reads.
pub type Result<T> = std::result::Result<T, LedgerError>;
