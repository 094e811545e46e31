use rusqlite::{Connection, OptionalExtension};

use crate::database::Database;
use crate::error::SqlBootError;

/// Ledger schema. The `schema_migrations` table is the single source of
/// truth for idempotency: a migration whose name appears here is never run
/// again, and rows are never updated or deleted.
const ENSURE_LEDGER_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    migration_name TEXT NOT NULL UNIQUE,
    checksum TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    execution_time_ms INTEGER,
    executed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_schema_migrations_name ON schema_migrations (migration_name);
CREATE INDEX IF NOT EXISTS idx_schema_migrations_executed_at ON schema_migrations (executed_at);
"#;

/// One row of the migration ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub name: String,
    pub checksum: String,
    pub file_size: i64,
    pub execution_time_ms: Option<i64>,
    pub executed_at: String,
}

impl MigrationRecord {
    /// Creates the ledger table and its indexes if they don't exist.
    pub fn ensure_table(db: &Database) -> Result<(), SqlBootError> {
        let conn = db.conn()?;
        conn.execute_batch(ENSURE_LEDGER_SQL)?;
        Ok(())
    }

    pub fn is_applied(conn: &Connection, name: &str) -> Result<bool, rusqlite::Error> {
        conn.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE migration_name = ?",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)
    }

    /// Records a migration as applied. `INSERT OR IGNORE` keeps this a no-op
    /// rather than an error if a concurrent run already recorded the name.
    pub fn record(
        conn: &Connection,
        name: &str,
        checksum: &str,
        file_size: i64,
        execution_time_ms: i64,
    ) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations (migration_name, checksum, file_size, execution_time_ms)
                VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![name, checksum, file_size, execution_time_ms],
        )?;
        Ok(())
    }

    pub fn recorded_checksum(
        conn: &Connection,
        name: &str,
    ) -> Result<Option<String>, rusqlite::Error> {
        conn.query_row(
            "SELECT checksum FROM schema_migrations WHERE migration_name = ?",
            [name],
            |row| row.get(0),
        )
        .optional()
    }

    /// True iff the ledger is empty - i.e. no migration has ever been
    /// applied to this database. Gates the seed phase.
    pub fn is_first_run(db: &Database) -> Result<bool, SqlBootError> {
        Ok(Self::count(&*db.conn()?)? == 0)
    }

    pub fn applied_count(db: &Database) -> Result<u64, SqlBootError> {
        Ok(Self::count(&*db.conn()?)? as u64)
    }

    fn count(conn: &Connection) -> Result<i64, rusqlite::Error> {
        conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
            row.get(0)
        })
    }

    /// All ledger rows in execution order, for status reporting.
    pub fn status(db: &Database) -> Result<Vec<MigrationRecord>, SqlBootError> {
        let conn = db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT migration_name, checksum, file_size, execution_time_ms, executed_at
                FROM schema_migrations
                ORDER BY executed_at, id",
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(MigrationRecord {
                    name: row.get(0)?,
                    checksum: row.get(1)?,
                    file_size: row.get(2)?,
                    execution_time_ms: row.get(3)?,
                    executed_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}
