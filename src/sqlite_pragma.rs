//! SQLite connection tuning shared by every ledger connection.

use rusqlite::Connection;
use std::time::Duration;

/// Apply the ledger's PRAGMA set.
///
/// - WAL journal so the progress reporter and query reads never block an epoch write
/// - `synchronous = NORMAL` (safe with WAL, one fsync per checkpoint)
/// - in-memory temp store and a 64MB page cache
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    // journal_mode reports the resulting mode as a row
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("📊 SQLite journal mode: {}", mode);
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "cache_size", -64_000)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}
