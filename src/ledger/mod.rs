//! Durable fact store and checkpoint
//!
//! The ledger is the single source of truth. The aggregator is a materialized view that
//! is rebuilt from `all_facts()` on every restart.
//!
//! Tables (see `/sql/`):
//! - `blocks` - `hash -> {miner, reward, timestamp, epoch, observed_at}`, write-once
//! - `metadata` - `latest_epoch` checkpoint, never lowered

pub mod sqlite;

pub use sqlite::SqliteLedger;

use crate::pipeline::types::BlockFact;
use std::collections::BTreeMap;

/// Metadata key of the checkpoint
pub const LATEST_EPOCH_KEY: &str = "latest_epoch";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to create ledger directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row for block {hash}: {reason}")]
    CorruptRow { hash: String, reason: String },

    #[error("Ledger connection lock poisoned")]
    Poisoned,
}

/// Storage contract used by the ingestion engine.
///
/// Methods are synchronous: the engine calls them while holding its apply lock, and
/// every call is a short local SQLite operation.
pub trait Ledger: Send + Sync {
    /// Whether a fact for `hash` is durably stored.
    fn exists(&self, hash: &str) -> Result<bool, LedgerError>;

    /// Bulk write of one epoch's new facts, atomically. Existing hashes are left untouched.
    fn put(&self, facts: &BTreeMap<String, BlockFact>) -> Result<(), LedgerError>;

    /// Every stored fact, for recovery replay.
    fn all_facts(&self) -> Result<Vec<BlockFact>, LedgerError>;

    fn fact_count(&self) -> Result<u64, LedgerError>;

    fn get_checkpoint(&self) -> Result<Option<u64>, LedgerError>;

    /// Advance the checkpoint. Values at or below the stored one are ignored.
    fn set_checkpoint(&self, epoch: u64) -> Result<(), LedgerError>;
}
