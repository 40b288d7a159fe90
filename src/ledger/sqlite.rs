//! SQLite implementation of the ledger (rusqlite)

use super::{Ledger, LedgerError, LATEST_EPOCH_KEY};
use crate::pipeline::types::{BlockFact, Reward};
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Schema files, applied in order. Every statement uses IF NOT EXISTS.
const MIGRATIONS: &[(&str, &str)] = &[
    ("01_blocks.sql", include_str!("../../sql/01_blocks.sql")),
    ("02_metadata.sql", include_str!("../../sql/02_metadata.sql")),
];

pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger at `db_path`, creating parent directories.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;
        Self::from_connection(conn)
    }

    /// Ledger backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        run_schema_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }
}

fn run_schema_migrations(conn: &Connection) -> Result<(), LedgerError> {
    for (name, sql) in MIGRATIONS {
        conn.execute_batch(sql)?;
        log::debug!("   ├─ Applied schema: {}", name);
    }
    Ok(())
}

fn epoch_to_sql(epoch: u64) -> i64 {
    epoch.min(i64::MAX as u64) as i64
}

impl Ledger for SqliteLedger {
    fn exists(&self, hash: &str) -> Result<bool, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT 1 FROM blocks WHERE hash = ?1")?;
        Ok(stmt.exists([hash])?)
    }

    fn put(&self, facts: &BTreeMap<String, BlockFact>) -> Result<(), LedgerError> {
        if facts.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO blocks (hash, miner, reward, timestamp, epoch, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (hash, fact) in facts {
                stmt.execute(params![
                    hash,
                    fact.miner,
                    fact.reward.to_string(),
                    fact.chain_timestamp,
                    epoch_to_sql(fact.epoch),
                    fact.observed_at,
                ])?;
            }
        }
        tx.commit()?;

        log::debug!("✅ Stored {} block facts", facts.len());
        Ok(())
    }

    fn all_facts(&self) -> Result<Vec<BlockFact>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT hash, miner, reward, timestamp, epoch, observed_at
             FROM blocks ORDER BY epoch, timestamp, hash",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut facts = Vec::new();
        for row in rows {
            let (hash, miner, reward, chain_timestamp, epoch, observed_at) = row?;
            let reward = reward.parse::<Reward>().map_err(|e| LedgerError::CorruptRow {
                hash: hash.clone(),
                reason: format!("reward {:?}: {}", reward, e),
            })?;
            let epoch = u64::try_from(epoch).map_err(|_| LedgerError::CorruptRow {
                hash: hash.clone(),
                reason: format!("negative epoch {}", epoch),
            })?;
            facts.push(BlockFact {
                hash,
                miner,
                reward,
                chain_timestamp,
                epoch,
                observed_at,
            });
        }

        Ok(facts)
    }

    fn fact_count(&self) -> Result<u64, LedgerError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn get_checkpoint(&self) -> Result<Option<u64>, LedgerError> {
        let conn = self.conn()?;
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                [LATEST_EPOCH_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(|v| v.max(0) as u64))
    }

    fn set_checkpoint(&self, epoch: u64) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)",
            params![LATEST_EPOCH_KEY, epoch_to_sql(epoch)],
        )?;
        Ok(())
    }
}
