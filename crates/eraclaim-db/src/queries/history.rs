//! Transaction history queries.

use eraclaim_types::{AccountId, Balance, BlockHash, EraIndex};
use rusqlite::{Connection, Row};
use serde::Serialize;
use serde_with::serde_as;

use crate::{DbError, Result};

/// Terminal outcome of a recorded transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failed,
    Canceled,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(DbError::Corrupt(format!("unknown outcome '{other}'"))),
        }
    }
}

/// A transaction to record.
#[derive(Clone, Debug)]
pub struct NewTransaction<'a> {
    pub signer: &'a AccountId,
    /// Operation description, e.g. `utility.batch_all(staking.payout_stakers x4)`.
    pub operation: &'a str,
    pub call_count: usize,
    /// Era range of the payouts carried, if any.
    pub eras: Option<(EraIndex, EraIndex)>,
    pub outcome: OutcomeKind,
    /// Failure kind and message, or the cancel reason.
    pub detail: Option<&'a str>,
    pub block_hash: Option<BlockHash>,
    pub fee_estimate: Option<Balance>,
    pub recorded_at: u64,
}

/// A recorded transaction.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub signer: AccountId,
    pub operation: String,
    pub call_count: usize,
    pub first_era: Option<EraIndex>,
    pub last_era: Option<EraIndex>,
    pub outcome: OutcomeKind,
    pub detail: Option<String>,
    #[serde_as(as = "Option<serde_with::hex::Hex>")]
    pub block_hash: Option<BlockHash>,
    #[serde_as(as = "Option<serde_with::DisplayFromStr>")]
    pub fee_estimate: Option<Balance>,
    pub recorded_at: u64,
}

/// Tally of recorded outcomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub success: u64,
    pub failed: u64,
    pub canceled: u64,
}

/// Record a finished transaction. Returns the row id.
pub fn record_transaction(conn: &Connection, tx: &NewTransaction<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO transaction_history
            (signer, operation, call_count, first_era, last_era, outcome, detail,
             block_hash, fee_estimate, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            tx.signer.as_str(),
            tx.operation,
            tx.call_count as i64,
            tx.eras.map(|(first, _)| first),
            tx.eras.map(|(_, last)| last),
            tx.outcome.as_str(),
            tx.detail,
            tx.block_hash.as_ref().map(|h| h.as_slice()),
            tx.fee_estimate.map(|fee| fee.to_string()),
            tx.recorded_at as i64,
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(id, operation = tx.operation, outcome = tx.outcome.as_str(), "db: recorded transaction");
    Ok(id)
}

/// Most recent transactions first, optionally for one signer.
pub fn recent_transactions(
    conn: &Connection,
    signer: Option<&AccountId>,
    limit: u32,
) -> Result<Vec<TransactionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, signer, operation, call_count, first_era, last_era, outcome, detail,
                block_hash, fee_estimate, recorded_at
         FROM transaction_history
         WHERE ?1 IS NULL OR signer = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(
        rusqlite::params![signer.map(AccountId::as_str), limit],
        RawRecord::from_row,
    )?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.into_record()?);
    }
    Ok(records)
}

/// Count recorded transactions by outcome.
pub fn outcome_counts(conn: &Connection) -> Result<OutcomeCounts> {
    let mut stmt =
        conn.prepare("SELECT outcome, COUNT(*) FROM transaction_history GROUP BY outcome")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut counts = OutcomeCounts::default();
    for row in rows {
        let (outcome, count) = row?;
        let count = count as u64;
        match OutcomeKind::parse(&outcome)? {
            OutcomeKind::Success => counts.success = count,
            OutcomeKind::Failed => counts.failed = count,
            OutcomeKind::Canceled => counts.canceled = count,
        }
    }
    Ok(counts)
}

/// Row as stored, before validation.
struct RawRecord {
    id: i64,
    signer: String,
    operation: String,
    call_count: i64,
    first_era: Option<EraIndex>,
    last_era: Option<EraIndex>,
    outcome: String,
    detail: Option<String>,
    block_hash: Option<Vec<u8>>,
    fee_estimate: Option<String>,
    recorded_at: i64,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            signer: row.get(1)?,
            operation: row.get(2)?,
            call_count: row.get(3)?,
            first_era: row.get(4)?,
            last_era: row.get(5)?,
            outcome: row.get(6)?,
            detail: row.get(7)?,
            block_hash: row.get(8)?,
            fee_estimate: row.get(9)?,
            recorded_at: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<TransactionRecord> {
        let block_hash = self
            .block_hash
            .map(|bytes| {
                BlockHash::try_from(bytes.as_slice())
                    .map_err(|_| DbError::Corrupt(format!("block hash of {} bytes", bytes.len())))
            })
            .transpose()?;
        let fee_estimate = self
            .fee_estimate
            .map(|fee| {
                fee.parse::<Balance>()
                    .map_err(|e| DbError::Corrupt(format!("fee estimate '{fee}': {e}")))
            })
            .transpose()?;

        Ok(TransactionRecord {
            id: self.id,
            signer: AccountId::new(self.signer),
            operation: self.operation,
            call_count: self.call_count as usize,
            first_era: self.first_era,
            last_era: self.last_era,
            outcome: OutcomeKind::parse(&self.outcome)?,
            detail: self.detail,
            block_hash,
            fee_estimate,
            recorded_at: self.recorded_at as u64,
        })
    }
}
