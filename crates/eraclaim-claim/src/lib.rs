//! # eraclaim-claim
//!
//! Claims every pending payout of a set of accounts, one bounded batch at a
//! time, until nothing is left or a batch does not succeed.
//!
//! ## Modules
//!
//! - [`orchestrator`]: the continuation loop and its progress reporting

pub mod orchestrator;

pub use orchestrator::{
    BatchReport, ClaimConfig, ClaimOutcome, ClaimProgress, ClaimSession, ClaimTerminal,
    PendingSource,
};

/// Error types for a claim run.
///
/// Only a failure to load the first pending view is an error. Once a batch
/// has been submitted, every ending is a [`ClaimTerminal`].
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("rewards error: {0}")]
    Rewards(#[from] eraclaim_rewards::RewardsError),

    #[error("ledger error: {0}")]
    Ledger(#[from] eraclaim_ledger::LedgerError),
}

/// Convenience result type for claim runs.
pub type Result<T> = std::result::Result<T, ClaimError>;
