//! Units claimed in the running session.
//!
//! The ledger's claimed sets may lag behind a finalized batch. The overlay
//! records every unit the session has seen succeed and takes precedence
//! over the ledger view, so no unit is planned twice.

use std::collections::{BTreeMap, BTreeSet};

use eraclaim_types::{AccountId, EraIndex, PayoutUnit};

/// Session-local set of claimed payout units.
#[derive(Clone, Debug, Default)]
pub struct ClaimedOverlay {
    claimed: BTreeSet<PayoutUnit>,
}

impl ClaimedOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `units` as claimed.
    pub fn mark<'a>(&mut self, units: impl IntoIterator<Item = &'a PayoutUnit>) {
        self.claimed.extend(units.into_iter().cloned());
    }

    pub fn contains(&self, unit: &PayoutUnit) -> bool {
        self.claimed.contains(unit)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    /// Remove claimed units from a per-address view of unclaimed eras.
    ///
    /// Addresses left with nothing are dropped.
    pub fn filter(
        &self,
        unclaimed: &BTreeMap<AccountId, Vec<EraIndex>>,
    ) -> BTreeMap<AccountId, Vec<EraIndex>> {
        unclaimed
            .iter()
            .filter_map(|(address, eras)| {
                let eras: Vec<EraIndex> = eras
                    .iter()
                    .copied()
                    .filter(|era| !self.contains(&PayoutUnit::new(address.clone(), *era)))
                    .collect();
                (!eras.is_empty()).then(|| (address.clone(), eras))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_removes_marked_units() {
        let a = AccountId::new("a");
        let b = AccountId::new("b");
        let unclaimed = BTreeMap::from([(a.clone(), vec![1, 2, 3]), (b.clone(), vec![2])]);

        let mut overlay = ClaimedOverlay::new();
        overlay.mark(&[PayoutUnit::new(a.clone(), 2), PayoutUnit::new(b.clone(), 2)]);

        let filtered = overlay.filter(&unclaimed);
        assert_eq!(filtered, BTreeMap::from([(a, vec![1, 3])]));
        assert_eq!(overlay.len(), 2);
    }

    #[test]
    fn test_empty_overlay_is_identity() {
        let unclaimed = BTreeMap::from([(AccountId::new("a"), vec![7])]);
        assert_eq!(ClaimedOverlay::new().filter(&unclaimed), unclaimed);
    }
}
