use std::fs;
use std::path::Path;
use std::time::Instant;

use log::{debug, info, warn};

use crate::database::Database;
use crate::error::SqlBootError;

/// Fixed execution order. This is a hard dependency chain: permissions
/// reference roles, menus reference permissions, and the default
/// administrator account references a role.
pub const SEED_ORDER: [&str; 4] = [
    "roles.seed.sql",
    "permissions.seed.sql",
    "menus.seed.sql",
    "admin.seed.sql",
];

#[derive(Debug, Default)]
pub struct SeedOutcome {
    pub executed: Vec<String>,
    pub warnings: Vec<String>,
}

/// Runs the seed scripts, each in its own transaction.
///
/// Seeds run only on the first-ever bootstrap of a database; `first_run`
/// must be captured from the ledger before any migration of this run is
/// recorded, otherwise the fresh ledger rows would mask a fresh database.
///
/// A missing seed file is a warning, not an error. A SQL error rolls back
/// that seed and halts the remaining ones, matching the migration phase's
/// halt-on-first-error policy. Seed scripts are expected to be internally
/// idempotent (`INSERT OR IGNORE`) as defense in depth.
pub fn run_seeds(db: &Database, dir: &Path, first_run: bool) -> Result<SeedOutcome, SqlBootError> {
    let mut outcome = SeedOutcome::default();

    if !first_run {
        debug!("Seeds skipped (database already initialized)");
        return Ok(outcome);
    }

    for name in SEED_ORDER {
        let path = dir.join(name);
        if !path.is_file() {
            let msg = format!("Seed file not found: {name}");
            warn!("{msg}");
            outcome.warnings.push(msg);
            continue;
        }

        let sql = fs::read_to_string(&path)?;
        let started = Instant::now();

        let mut conn = db.conn()?;
        let tx = conn.transaction()?;
        tx.execute_batch(&sql).map_err(|e| SqlBootError::SeedError {
            name: name.to_string(),
            source: e,
        })?;
        tx.commit()?;

        info!("Seed {} executed in {}ms", name, started.elapsed().as_millis());
        outcome.executed.push(name.to_string());
    }

    Ok(outcome)
}
