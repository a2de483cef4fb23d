//! SQL schema definitions.

/// Initial schema.
pub const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS transaction_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    signer TEXT NOT NULL,
    operation TEXT NOT NULL,
    call_count INTEGER NOT NULL,
    first_era INTEGER,
    last_era INTEGER,
    outcome TEXT NOT NULL CHECK (outcome IN ('success', 'failed', 'canceled')),
    detail TEXT,
    block_hash BLOB,
    fee_estimate TEXT,
    recorded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transaction_history_signer
    ON transaction_history (signer, recorded_at DESC);
";
