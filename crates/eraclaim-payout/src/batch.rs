//! Per-transaction payout bound.
//!
//! A block fits `36 * 64` rewarded nominator slots and every payout call
//! may reward up to `max_nominator_rewarded_per_validator` of them.

use eraclaim_types::BLOCK_REWARD_CAPACITY;

/// Batch size used when the runtime constant is missing or zero.
pub const FALLBACK_BATCH_SIZE: usize = 1;

/// Largest number of payout calls that fit in one transaction.
///
/// Always at least 1.
pub fn max_batch_size(max_nominator_rewarded_per_validator: Option<u32>) -> usize {
    match max_nominator_rewarded_per_validator {
        Some(max) if max > 0 => ((BLOCK_REWARD_CAPACITY / max) as usize).max(1),
        _ => FALLBACK_BATCH_SIZE,
    }
}

/// Batch size with an optional configured `limit`.
///
/// The limit can only lower the bound derived from the runtime constant.
pub fn bounded_batch_size(
    max_nominator_rewarded_per_validator: Option<u32>,
    limit: Option<usize>,
) -> usize {
    let computed = max_batch_size(max_nominator_rewarded_per_validator);
    match limit {
        Some(limit) => limit.clamp(1, computed),
        None => computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typical_runtime_constant() {
        assert_eq!(max_batch_size(Some(256)), 9);
        assert_eq!(max_batch_size(Some(512)), 4);
        assert_eq!(max_batch_size(Some(64)), 36);
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(max_batch_size(None), 1);
        assert_eq!(max_batch_size(Some(0)), 1);
    }

    #[test]
    fn test_constant_above_capacity() {
        assert_eq!(max_batch_size(Some(BLOCK_REWARD_CAPACITY + 1)), 1);
    }

    #[test]
    fn test_limit_only_lowers_the_bound() {
        assert_eq!(bounded_batch_size(Some(576), None), 4);
        assert_eq!(bounded_batch_size(Some(576), Some(2)), 2);
        assert_eq!(bounded_batch_size(Some(576), Some(10)), 4);
        assert_eq!(bounded_batch_size(Some(576), Some(0)), 1);
        assert_eq!(bounded_batch_size(None, Some(10)), 1);
    }
}
