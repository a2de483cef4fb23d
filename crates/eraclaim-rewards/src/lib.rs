//! # eraclaim-rewards
//!
//! Reward aggregation over the trailing era window.
//!
//! Each validator receives a share of an era's reward pool proportional to
//! the points it earned in that era. Aggregation walks every era of the
//! window for every address and splits the result into what was earned and
//! what can still be claimed.
//!
//! ## Modules
//!
//! - [`window`]: era window resolution
//! - [`accounting`]: reward shares and per-address aggregation
//! - [`rollup`]: stake totals across accounts
//! - [`fetch`]: loading aggregation inputs from a [`eraclaim_ledger::LedgerReader`]

pub mod accounting;
pub mod fetch;
pub mod rollup;
pub mod window;

pub use accounting::{aggregate, report, reward_share, AccountRewards, RewardInputs, RewardReport};
pub use fetch::{load_reward_inputs, load_summary, RewardSummary};
pub use rollup::StakeRollup;
pub use window::resolve_window;

use eraclaim_types::EraIndex;

/// Error types for reward aggregation.
#[derive(Debug, thiserror::Error)]
pub enum RewardsError {
    /// The window's oldest era lies after its current era.
    #[error("malformed era window: oldest era {oldest} is after current era {current}")]
    MalformedWindow {
        /// Oldest era of the window.
        oldest: EraIndex,
        /// Current era of the window.
        current: EraIndex,
    },

    /// A ledger read failed for a reason other than missing data.
    #[error("ledger error: {0}")]
    Ledger(#[from] eraclaim_ledger::LedgerError),
}

/// Convenience result type for reward aggregation.
pub type Result<T> = std::result::Result<T, RewardsError>;
