use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::SqlBootError;

const POOL_SIZE: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Shared handle to the SQLite database.
///
/// Owns the connection pool and nothing else. Every component that talks to
/// the database receives a `&Database`, so independent instances can be built
/// against independent database files in tests.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Opens (creating if necessary) the database file at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, SqlBootError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            // journal_mode returns a row, so it can't go through pragma_update
            conn.query_row("PRAGMA journal_mode=WAL", [], |_row| Ok(()))?;
            conn.pragma_update(None, "foreign_keys", true)?;
            conn.busy_timeout(BUSY_TIMEOUT)
        });

        let pool = Pool::builder()
            .max_size(POOL_SIZE)
            .build(manager)
            .map_err(|e| {
                SqlBootError::Error(format!(
                    "Cannot open database '{}': {}",
                    db_path.display(),
                    e
                ))
            })?;

        Ok(Database { pool })
    }

    /// Checks out a connection from the pool.
    pub fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SqlBootError> {
        Ok(self.pool.get()?)
    }

    /// Cheap liveness probe used by callers that only need to know the
    /// database file is reachable.
    pub fn health_check(&self) -> Result<(), SqlBootError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_row| Ok(()))?;
        Ok(())
    }
}
