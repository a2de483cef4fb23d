//! Integration test: batch claiming end to end.
//!
//! Exercises the claim loop against a scripted in-memory ledger:
//! 1. Plan pending payouts and split them by the runtime-derived bound
//! 2. Submit each batch through a transaction session
//! 3. Re-read the ledger between batches
//! 4. Stop on the first failure or on silence
//! 5. Record every batch in the transaction history
//!
//! This test uses eraclaim-claim (orchestrator), eraclaim-tx (sessions,
//! cancellation), eraclaim-ledger (memory ledger) and eraclaim-db.

use std::time::Duration;

use eraclaim_claim::{ClaimConfig, ClaimSession, ClaimTerminal, PendingSource};
use eraclaim_db::queries::history::{
    outcome_counts, record_transaction, recent_transactions, NewTransaction, OutcomeKind,
};
use eraclaim_integration_tests::{account, busy_chain, FlakyLedger};
use eraclaim_ledger::memory::{SubmissionBehaviour, BLOCK_LIMIT_MESSAGE};
use eraclaim_rewards::load_summary;
use eraclaim_tx::{cancellation, CancelReason, SessionConfig, TxFailure, TxOutcome};
use eraclaim_types::HISTORY_DEPTH;

/// Two validators with points in five eras: ten pending units.
fn ten_unit_chain() -> eraclaim_ledger::memory::MemoryLedger {
    busy_chain(10, &["v1", "v2"], &[1, 2, 3, 4, 5])
        // 2304 / 576 = 4 payouts per batch
        .max_nominator_rewarded(576)
        .build()
}

fn config() -> ClaimConfig {
    ClaimConfig {
        session: SessionConfig {
            grace_period: Duration::from_secs(30),
        },
        settle_delay: Duration::from_millis(500),
        max_batch_size: None,
    }
}

fn validators() -> PendingSource {
    PendingSource::ledger(vec![account("v1"), account("v2")])
}

#[tokio::test(start_paused = true)]
async fn test_ten_units_claimed_in_three_batches() {
    let chain = ten_unit_chain();
    let (_cancel, token) = cancellation();
    let mut session = ClaimSession::new(account("v1"), validators(), config());

    let outcome = session.run(&chain, token).await.expect("run");

    assert_eq!(outcome.terminal, ClaimTerminal::Completed);
    let sizes: Vec<usize> = outcome.batches.iter().map(|b| b.operation.len()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(chain.submissions().len(), 3);

    let summary = load_summary(&chain, &[account("v1"), account("v2")], HISTORY_DEPTH)
        .await
        .expect("summary");
    assert_eq!(summary.rewards.total_claimable, 0);
    assert_eq!(summary.rewards.pending_payouts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_configured_batch_size_capped_by_runtime_bound() {
    let chain = ten_unit_chain();
    let (_cancel, token) = cancellation();
    let config = ClaimConfig {
        max_batch_size: Some(10),
        ..config()
    };
    let mut session = ClaimSession::new(account("v1"), validators(), config);

    let outcome = session.run(&chain, token).await.expect("run");

    assert_eq!(outcome.terminal, ClaimTerminal::Completed);
    let sizes: Vec<usize> = outcome.batches.iter().map(|b| b.operation.len()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(outcome.claimed.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_ledger_error_after_first_batch_keeps_progress() {
    let chain = FlakyLedger::new(ten_unit_chain(), 1);
    let (_cancel, token) = cancellation();
    let mut session = ClaimSession::new(account("v1"), validators(), config());

    let outcome = session.run(&chain, token).await.expect("run");

    assert!(matches!(
        &outcome.terminal,
        ClaimTerminal::Aborted(reason) if reason.contains("connection reset")
    ));
    assert_eq!(outcome.batches.len(), 1);
    assert!(outcome.batches[0].outcome.is_success());
    assert_eq!(outcome.claimed.len(), 4);
    assert_eq!(session.overlay().len(), 4);
    assert_eq!(chain.inner().submissions().len(), 1);

    let json = serde_json::to_value(&outcome).expect("json");
    assert_eq!(json["terminal"]["terminal"], "aborted");
}

#[tokio::test(start_paused = true)]
async fn test_ledger_error_before_first_batch_is_an_error() {
    let chain = FlakyLedger::new(ten_unit_chain(), 0);
    let (_cancel, token) = cancellation();
    let mut session = ClaimSession::new(account("v1"), validators(), config());

    let err = session.run(&chain, token).await.expect_err("no view");
    assert!(err.to_string().contains("connection reset"));
    assert!(chain.inner().submissions().is_empty());
}

#[tokio::test]
async fn test_summary_reads_accounts_once() {
    let chain = FlakyLedger::new(ten_unit_chain(), usize::MAX);
    let summary = load_summary(&chain, &[account("v1"), account("v2")], HISTORY_DEPTH)
        .await
        .expect("summary");
    assert_eq!(summary.rewards.pending_payouts(), 10);
    assert!(summary.stake.is_validator);
    assert_eq!(chain.account_reads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_block_limit_on_first_batch_stops_the_run() {
    let chain = ten_unit_chain();
    chain.script(SubmissionBehaviour::Raise {
        message: BLOCK_LIMIT_MESSAGE.to_string(),
    });
    let (_cancel, token) = cancellation();
    let mut session = ClaimSession::new(account("v1"), validators(), config());

    let outcome = session.run(&chain, token).await.expect("run");

    assert!(matches!(
        outcome.terminal,
        ClaimTerminal::Failed(TxFailure::BlockLimitExceeded { .. })
    ));
    assert_eq!(chain.submissions().len(), 1);
    assert!(outcome.claimed.is_empty());
    assert!(session.overlay().is_empty());
    for name in ["v1", "v2"] {
        let ledger = chain.ledger_of(&account(name)).expect("ledger");
        assert!(ledger.claimed_rewards.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_silent_submission_cancels_after_grace_period() {
    let chain = ten_unit_chain();
    chain.script(SubmissionBehaviour::Silent);
    let (_cancel, token) = cancellation();
    let mut session = ClaimSession::new(account("v1"), validators(), config());

    let started = tokio::time::Instant::now();
    let outcome = session.run(&chain, token).await.expect("run");

    assert_eq!(outcome.terminal, ClaimTerminal::Canceled(CancelReason::Silence));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(chain.unsubscribe_count(), 1);
    assert_eq!(outcome.batches.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_signer_rejection_cancels_the_run() {
    let chain = ten_unit_chain();
    chain.script(SubmissionBehaviour::RejectSigning {
        message: "Cancelled".to_string(),
    });
    let (_cancel, token) = cancellation();
    let mut session = ClaimSession::new(account("v1"), validators(), config());

    let outcome = session.run(&chain, token).await.expect("run");
    assert_eq!(
        outcome.terminal,
        ClaimTerminal::Canceled(CancelReason::SignerRejected)
    );
    assert!(outcome.claimed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_handle_cancels_the_run() {
    let chain = ten_unit_chain();
    let (cancel, token) = cancellation();
    drop(cancel);
    let mut session = ClaimSession::new(account("v1"), validators(), config());

    let outcome = session.run(&chain, token).await.expect("run");
    assert_eq!(
        outcome.terminal,
        ClaimTerminal::Canceled(CancelReason::HandleDropped)
    );
    assert!(chain.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_run_finds_nothing_pending() {
    let chain = ten_unit_chain();
    let (_cancel, token) = cancellation();
    ClaimSession::new(account("v1"), validators(), config())
        .run(&chain, token)
        .await
        .expect("first run");

    let (_cancel, token) = cancellation();
    let outcome = ClaimSession::new(account("v2"), validators(), config())
        .run(&chain, token)
        .await
        .expect("second run");
    assert_eq!(outcome.terminal, ClaimTerminal::Completed);
    assert!(outcome.batches.is_empty());
    assert_eq!(chain.submissions().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_batches_recorded_in_history() {
    let chain = ten_unit_chain();
    chain.script(SubmissionBehaviour::Finalize);
    chain.script(SubmissionBehaviour::FailInBlock {
        error: "AlreadyClaimed".to_string(),
    });
    let (_cancel, token) = cancellation();
    let signer = account("v1");
    let outcome = ClaimSession::new(signer.clone(), validators(), config())
        .run(&chain, token)
        .await
        .expect("run");
    assert_eq!(outcome.batches.len(), 2);

    let conn = eraclaim_db::open_memory().expect("db");
    for batch in &outcome.batches {
        let description = batch.operation.describe();
        let detail = match &batch.outcome {
            TxOutcome::Failed(failure) => Some(failure.kind().to_string()),
            _ => None,
        };
        let eras = batch.units.first().map(|u| u.era).zip(batch.units.last().map(|u| u.era));
        record_transaction(
            &conn,
            &NewTransaction {
                signer: &signer,
                operation: &description,
                call_count: batch.operation.len(),
                eras,
                outcome: if batch.outcome.is_success() {
                    OutcomeKind::Success
                } else {
                    OutcomeKind::Failed
                },
                detail: detail.as_deref(),
                block_hash: batch.outcome.block_hash(),
                fee_estimate: batch.fee_estimate,
                recorded_at: 1_700_000_000 + batch.index as u64,
            },
        )
        .expect("record");
    }

    let counts = outcome_counts(&conn).expect("counts");
    assert_eq!((counts.success, counts.failed), (1, 1));

    let records = recent_transactions(&conn, Some(&signer), 10).expect("history");
    assert_eq!(records[0].detail.as_deref(), Some("extrinsic_failed"));
    assert_eq!(records[1].operation, "utility.batch_all(staking.payout_stakers x4)");
    assert_eq!((records[1].first_era, records[1].last_era), (Some(1), Some(2)));
    assert!(records[1].block_hash.is_some());

    let json = serde_json::to_value(&outcome).expect("json");
    assert_eq!(json["terminal"]["terminal"], "failed");
    assert_eq!(json["batches"][0]["outcome"]["outcome"], "success");
}
