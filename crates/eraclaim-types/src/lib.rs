//! # eraclaim-types
//!
//! Shared domain types used across the eraclaim workspace: accounts, eras,
//! balances, ledger records and payout units.

pub mod account;
pub mod staking;

pub use account::AccountId;
pub use staking::{
    EraRewardPoints, EraWindow, LedgerEntry, PayoutUnit, StakingRole, UnlockChunk,
};

/// Era index. Eras are counted from genesis and never negative.
pub type EraIndex = u32;

/// Balance in the ledger's smallest unit.
pub type Balance = u128;

/// Reward points earned by a validator in one era.
pub type RewardPoint = u32;

/// Block number.
pub type BlockNumber = u32;

/// Block hash.
pub type BlockHash = [u8; 32];

/// Number of trailing eras for which unclaimed rewards remain claimable.
pub const HISTORY_DEPTH: u32 = 84;

/// Reward computations that fit in one block (`36 * 64`).
pub const BLOCK_REWARD_CAPACITY: u32 = 36 * 64;

/// Eras an unbonded chunk stays locked before it becomes redeemable.
pub const BONDING_DURATION: u32 = 28;

/// Error types for parsing domain values.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Account identifier is empty or malformed.
    #[error("invalid account id: {0:?}")]
    InvalidAccountId(String),

    /// Hash is not 32 bytes of hex.
    #[error("invalid hash: {0}")]
    InvalidHash(String),
}

/// Render a block hash as `0x`-prefixed hex.
pub fn hash_to_hex(hash: &BlockHash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parse a `0x`-prefixed (or bare) hex string into a block hash.
pub fn hash_from_hex(s: &str) -> Result<BlockHash, TypesError> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).map_err(|e| TypesError::InvalidHash(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| TypesError::InvalidHash(format!("expected 32 bytes, got {}", v.len())))
}
