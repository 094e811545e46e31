use std::fs;
use std::path::Path;
use std::time::Instant;

use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::database::Database;
use crate::error::SqlBootError;
use crate::ledger::MigrationRecord;
use crate::resolver;

/// What a migration pass did: the names applied this run, plus any
/// checksum-drift warnings for migrations that were already applied.
#[derive(Debug, Default)]
pub struct MigrationOutcome {
    pub applied: Vec<String>,
    pub warnings: Vec<String>,
}

/// SHA-256 fingerprint of a migration's full text, hex-encoded.
pub fn checksum(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}

/// Applies every unapplied migration in `dir`, in ascending filename order.
///
/// Each migration runs as one batch inside its own transaction; the ledger
/// row is inserted in that same transaction, so a migration is recorded iff
/// its statements committed. Failure policy is halt-on-first-error: the
/// failing file's transaction rolls back, the error propagates, and later
/// files are not attempted. Re-running after a fix picks up where it left
/// off because applied names are skipped.
///
/// An already-applied migration whose on-disk text no longer matches its
/// recorded checksum produces a warning. The file is not re-run.
pub fn apply_pending(db: &Database, dir: &Path) -> Result<MigrationOutcome, SqlBootError> {
    let files = resolver::resolve(dir)?;
    let mut outcome = MigrationOutcome::default();

    for file in files {
        let mut conn = db.conn()?;

        if MigrationRecord::is_applied(&conn, &file.name)? {
            debug!("Migration {} already applied", file.name);

            let sql = fs::read_to_string(&file.path)?;
            if let Some(recorded) = MigrationRecord::recorded_checksum(&conn, &file.name)? {
                if recorded != checksum(&sql) {
                    let msg = format!(
                        "Migration {} was edited after being applied (checksum drift)",
                        file.name
                    );
                    warn!("{msg}");
                    outcome.warnings.push(msg);
                }
            }
            continue;
        }

        let sql = fs::read_to_string(&file.path)?;
        let started = Instant::now();

        // Dropped without commit on any error below, which rolls it back
        let tx = conn.transaction()?;
        tx.execute_batch(&sql)
            .map_err(|e| SqlBootError::MigrationError {
                name: file.name.clone(),
                source: e,
            })?;

        MigrationRecord::record(
            &tx,
            &file.name,
            &checksum(&sql),
            sql.len() as i64,
            started.elapsed().as_millis() as i64,
        )?;
        tx.commit()?;

        info!(
            "Migration {} applied in {}ms",
            file.name,
            started.elapsed().as_millis()
        );
        outcome.applied.push(file.name);
    }

    Ok(outcome)
}
