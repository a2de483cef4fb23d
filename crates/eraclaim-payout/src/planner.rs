//! Payout planning.
//!
//! All pending `(validator, era)` units are flattened, de-duplicated and
//! sorted oldest era first. The next batch is the head of that order.

use std::collections::{BTreeMap, BTreeSet};

use eraclaim_types::{AccountId, EraIndex, PayoutUnit};
use serde::{Deserialize, Serialize};

/// Outcome of one planning pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPlan {
    /// Every pending unit in `(era, validator)` order.
    pub all_units: Vec<PayoutUnit>,
    /// The units to submit next.
    pub next_batch: Vec<PayoutUnit>,
    /// Units left after `next_batch`.
    pub remaining: Vec<PayoutUnit>,
}

impl PayoutPlan {
    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.all_units.is_empty()
    }
}

/// Plan the next batch of at most `max_batch_size` units.
///
/// A `max_batch_size` of zero is treated as 1.
pub fn plan(
    per_address_unclaimed: &BTreeMap<AccountId, Vec<EraIndex>>,
    max_batch_size: usize,
) -> PayoutPlan {
    let units: BTreeSet<PayoutUnit> = per_address_unclaimed
        .iter()
        .flat_map(|(validator, eras)| {
            eras.iter()
                .map(move |era| PayoutUnit::new(validator.clone(), *era))
        })
        .collect();
    let all_units: Vec<PayoutUnit> = units.into_iter().collect();

    let split = max_batch_size.max(1).min(all_units.len());
    let next_batch = all_units[..split].to_vec();
    let remaining = all_units[split..].to_vec();

    tracing::debug!(
        total = all_units.len(),
        batch = next_batch.len(),
        remaining = remaining.len(),
        "payout: planned batch"
    );

    PayoutPlan {
        all_units,
        next_batch,
        remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> AccountId {
        AccountId::new(s)
    }

    #[test]
    fn test_orders_by_era_then_validator() {
        let unclaimed = BTreeMap::from([
            (addr("b"), vec![5, 3]),
            (addr("a"), vec![4, 5]),
        ]);
        let plan = plan(&unclaimed, 2);
        assert_eq!(
            plan.all_units,
            vec![
                PayoutUnit::new(addr("b"), 3),
                PayoutUnit::new(addr("a"), 4),
                PayoutUnit::new(addr("a"), 5),
                PayoutUnit::new(addr("b"), 5),
            ]
        );
        assert_eq!(plan.next_batch, plan.all_units[..2].to_vec());
        assert_eq!(plan.remaining, plan.all_units[2..].to_vec());
    }

    #[test]
    fn test_deduplicates_units() {
        let unclaimed = BTreeMap::from([(addr("a"), vec![1, 1, 2])]);
        let plan = plan(&unclaimed, 10);
        assert_eq!(plan.all_units.len(), 2);
        assert!(plan.remaining.is_empty());
    }

    #[test]
    fn test_zero_bound_plans_one() {
        let unclaimed = BTreeMap::from([(addr("a"), vec![1, 2])]);
        let plan = plan(&unclaimed, 0);
        assert_eq!(plan.next_batch.len(), 1);
        assert_eq!(plan.remaining.len(), 1);
    }

    #[test]
    fn test_nothing_pending() {
        let plan = plan(&BTreeMap::new(), 4);
        assert!(plan.is_empty());
        assert!(plan.next_batch.is_empty());
    }
}
