//! # eraclaim-tx
//!
//! Lifecycle of one submitted operation, from signing to finality.
//!
//! ```text
//! Idle -> Signing -> AwaitingNetworkAck -> Pending -> Finalizing -> Success
//!                                                               \-> Error
//!                                                               \-> Canceled
//! ```
//!
//! [`state::transition`] is the whole contract: a pure function from the
//! current state and one event to the next state. [`session`] feeds it the
//! events produced by a [`eraclaim_ledger::Chain`] and owns every side effect.
//!
//! ## Modules
//!
//! - [`state`]: states, events and the transition function
//! - [`failure`]: classified failures
//! - [`classify`]: message and event-record classifiers
//! - [`cancel`]: cancellation signal
//! - [`session`]: async driver for one operation

pub mod cancel;
pub mod classify;
pub mod failure;
pub mod session;
pub mod state;

pub use cancel::{cancellation, CancelHandle, CancelReason, CancelToken};
pub use failure::TxFailure;
pub use session::{SessionConfig, TransactionSession, TxOutcome};
pub use state::{transition, TxEvent, TxState};
