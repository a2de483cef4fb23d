//! Era window resolution.
//!
//! Rewards stay claimable for `history_depth` eras. The window is
//! `[current_era - history_depth, current_era)`, clamped at era zero.

use eraclaim_types::{EraIndex, EraWindow};

/// Resolve the claimable window for `current_era`.
///
/// Returns `None` when the current era is not yet known. Callers treat that
/// as "no data" and report zero earned and claimable.
pub fn resolve_window(current_era: Option<EraIndex>, history_depth: u32) -> Option<EraWindow> {
    let current_era = current_era?;
    Some(EraWindow {
        current_era,
        oldest_era: current_era.saturating_sub(history_depth),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_era_yields_none() {
        assert!(resolve_window(None, 84).is_none());
    }

    #[test]
    fn test_window_bounds() {
        let window = resolve_window(Some(104), 4).expect("window");
        assert_eq!(window.oldest_era, 100);
        assert_eq!(window.current_era, 104);
        assert_eq!(window.eras().collect::<Vec<_>>(), vec![100, 101, 102, 103]);
    }

    #[test]
    fn test_young_chain_clamps_to_zero() {
        let window = resolve_window(Some(3), 84).expect("window");
        assert_eq!(window.oldest_era, 0);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_era_zero_is_empty() {
        let window = resolve_window(Some(0), 84).expect("window");
        assert!(window.is_empty());
    }
}
