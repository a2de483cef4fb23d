//! # eraclaim-payout
//!
//! Turns unclaimed eras into ordered, bounded payout batches.
//!
//! ## Modules
//!
//! - [`batch`]: per-transaction payout bound
//! - [`planner`]: flattening, ordering and slicing of payout units
//! - [`overlay`]: units already claimed in the running session

pub mod batch;
pub mod overlay;
pub mod planner;

pub use batch::{bounded_batch_size, max_batch_size};
pub use overlay::ClaimedOverlay;
pub use planner::{plan, PayoutPlan};
