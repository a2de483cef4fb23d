//! Integration test: reward aggregation against a ledger.
//!
//! Exercises the read side end to end:
//! 1. Resolve the era window from the active era
//! 2. Load pools, points and claimed sets one era at a time
//! 3. Aggregate per address and total the report
//! 4. Roll up stake for the same addresses
//!
//! This test uses eraclaim-rewards (window, accounting, fetch),
//! eraclaim-ledger (memory ledger) and eraclaim-types.

use eraclaim_integration_tests::{account, ChainFixture};
use eraclaim_rewards::{load_summary, resolve_window};
use eraclaim_types::{EraWindow, HISTORY_DEPTH};

/// Pool 1000 in era 101, 100 points in total, 25 of them for "x".
fn quarter_share_chain() -> ChainFixture {
    ChainFixture::at_era(104)
        .validator("x")
        .era(101, 1_000, 100)
        .points(101, "x", 25)
}

#[tokio::test]
async fn test_unclaimed_share_is_claimable() {
    let ledger = quarter_share_chain().build();
    let summary = load_summary(&ledger, &[account("x")], HISTORY_DEPTH)
        .await
        .expect("summary");

    let rewards = &summary.rewards;
    assert!(rewards.data_available);
    assert_eq!(summary.current_era, Some(104));
    let x = &rewards.accounts[&account("x")];
    assert_eq!(x.total_earned, 250);
    assert_eq!(x.claimable, 250);
    assert_eq!(x.unclaimed_eras, vec![101]);
    assert_eq!(rewards.total_claimable, 250);
    assert_eq!(rewards.pending_payouts(), 1);
}

#[tokio::test]
async fn test_claimed_share_is_earned_but_not_claimable() {
    let ledger = quarter_share_chain().claimed(101, "x").build();
    let summary = load_summary(&ledger, &[account("x")], HISTORY_DEPTH)
        .await
        .expect("summary");

    let x = &summary.rewards.accounts[&account("x")];
    assert_eq!(x.total_earned, 250);
    assert_eq!(x.claimable, 0);
    assert!(x.unclaimed_eras.is_empty());
    assert!(summary.rewards.unclaimed_by_address().is_empty());
}

#[tokio::test]
async fn test_unknown_era_gives_zeroed_report() {
    let ledger = ChainFixture::unknown_era().validator("x").build();
    let summary = load_summary(&ledger, &[account("x"), account("y")], HISTORY_DEPTH)
        .await
        .expect("summary");

    assert!(!summary.rewards.data_available);
    assert!(summary.rewards.window.is_none());
    assert_eq!(summary.rewards.accounts.len(), 2);
    assert_eq!(summary.rewards.total_earned, 0);
    assert_eq!(summary.stake.redeemable, 0);
    assert_eq!(summary.stake.bonded_accounts, 1);
}

#[tokio::test]
async fn test_eras_outside_window_are_ignored() {
    // Era 10 fell out of an 84-era window ending at 104.
    let ledger = quarter_share_chain()
        .era(10, 1_000, 100)
        .points(10, "x", 50)
        .build();
    let window = resolve_window(Some(104), HISTORY_DEPTH).expect("window");
    assert_eq!(
        window,
        EraWindow {
            current_era: 104,
            oldest_era: 20
        }
    );

    let summary = load_summary(&ledger, &[account("x")], HISTORY_DEPTH)
        .await
        .expect("summary");
    assert_eq!(summary.rewards.accounts[&account("x")].total_earned, 250);
}

#[tokio::test]
async fn test_stake_rollup_across_addresses() {
    let ledger = quarter_share_chain()
        .validator("y")
        .funded("idle", 5_000)
        .build();
    let summary = load_summary(
        &ledger,
        &[account("x"), account("y"), account("idle")],
        HISTORY_DEPTH,
    )
    .await
    .expect("summary");

    let stake = &summary.stake;
    assert_eq!(stake.bonded_accounts, 2);
    assert_eq!(stake.total_stake, 2 * eraclaim_integration_tests::FUNDED / 10);
    assert!(stake.is_validator);
    assert!(!stake.is_nominator);
}
