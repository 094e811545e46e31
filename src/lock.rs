use chrono::Utc;
use log::{info, warn};
use rusqlite::TransactionBehavior;

use crate::database::Database;
use crate::error::SqlBootError;

const ENSURE_LOCK_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS bootstrap_lock (
    lock_id INTEGER PRIMARY KEY,
    holder TEXT NOT NULL,
    acquired_at INTEGER NOT NULL
);
"#;

/// Cluster-wide named mutual exclusion for the bootstrap critical section.
///
/// SQLite has no server-side advisory locks, so the lock is a claim row in a
/// dedicated table, written inside an immediate transaction. The policy is
/// fail-fast: if another holder owns the row, `acquire` returns `LockBusy`
/// and the caller's retry loop decides when to try again.
///
/// A claim older than `ttl_secs` is presumed to belong to a crashed process
/// and is replaced on the next acquisition attempt.
pub struct BootstrapLock {
    lock_id: i64,
    holder: String,
    ttl_secs: i64,
}

impl BootstrapLock {
    pub fn new(lock_id: i64, ttl_secs: i64) -> Self {
        // Holder identity only needs to be unique across concurrently
        // starting processes
        let holder = format!(
            "{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        BootstrapLock {
            lock_id,
            holder,
            ttl_secs,
        }
    }

    /// Attempts to claim the lock. Fails fast with `LockBusy` if another
    /// live holder owns it.
    pub fn acquire(&self, db: &Database) -> Result<(), SqlBootError> {
        let mut conn = db.conn()?;
        conn.execute_batch(ENSURE_LOCK_TABLE_SQL)?;

        let now = Utc::now().timestamp();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Evict a stale claim before attempting our own
        let evicted = tx.execute(
            "DELETE FROM bootstrap_lock WHERE lock_id = ?1 AND acquired_at < ?2",
            rusqlite::params![self.lock_id, now - self.ttl_secs],
        )?;
        if evicted > 0 {
            warn!("Evicted stale bootstrap lock claim (older than {}s)", self.ttl_secs);
        }

        tx.execute(
            "INSERT OR IGNORE INTO bootstrap_lock (lock_id, holder, acquired_at)
                VALUES (?1, ?2, ?3)",
            rusqlite::params![self.lock_id, self.holder, now],
        )?;

        let current_holder: String = tx.query_row(
            "SELECT holder FROM bootstrap_lock WHERE lock_id = ?",
            [self.lock_id],
            |row| row.get(0),
        )?;

        tx.commit()?;

        if current_holder == self.holder {
            info!("Bootstrap lock {} acquired", self.lock_id);
            Ok(())
        } else {
            Err(SqlBootError::LockBusy(format!(
                "lock {} is held by {}",
                self.lock_id, current_holder
            )))
        }
    }

    /// Releases the lock if this process holds it. Idempotent, and never
    /// surfaces an error to the caller: a failed release is logged and
    /// swallowed so it can't mask the error that got us here.
    pub fn release(&self, db: &Database) {
        let conn = match db.conn() {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Could not release bootstrap lock {}: {}", self.lock_id, e);
                return;
            }
        };

        match conn.execute(
            "DELETE FROM bootstrap_lock WHERE lock_id = ?1 AND holder = ?2",
            rusqlite::params![self.lock_id, self.holder],
        ) {
            Ok(deleted) if deleted > 0 => info!("Bootstrap lock {} released", self.lock_id),
            Ok(_) => {} // Not held by us (never acquired, or already released)
            Err(e) => warn!("Could not release bootstrap lock {}: {}", self.lock_id, e),
        }
    }
}
