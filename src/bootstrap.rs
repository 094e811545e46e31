use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use serde::Serialize;

use crate::config::{Backoff, BootstrapConfig};
use crate::database::Database;
use crate::error::SqlBootError;
use crate::ledger::MigrationRecord;
use crate::lock::BootstrapLock;
use crate::{migrate, reconcile, seed, validate};

/// Everything a caller learns about a bootstrap run. This is the only thing
/// `initialize` produces - on every exit path, including failures.
#[derive(Debug, Serialize)]
pub struct BootstrapResult {
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
    pub actions: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub migrations_applied: u64,
    pub seeds_executed: u64,
}

impl BootstrapResult {
    fn new() -> Self {
        BootstrapResult {
            success: false,
            message: String::new(),
            duration_ms: 0,
            actions: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            migrations_applied: 0,
            seeds_executed: 0,
        }
    }
}

/// Orchestrates the whole bootstrap: lock, ledger, migrations, seeds,
/// validation, privilege reconciliation. Holds only references to the
/// injected database handle and configuration, so independent instances can
/// run against independent databases.
pub struct Bootstrap<'a> {
    db: &'a Database,
    config: &'a BootstrapConfig,
}

impl<'a> Bootstrap<'a> {
    pub fn new(db: &'a Database, config: &'a BootstrapConfig) -> Self {
        Bootstrap { db, config }
    }

    /// Brings the database from whatever state it is in to a fully
    /// migrated, seeded, validated state.
    ///
    /// Contract: never panics and never returns an error - the outcome,
    /// good or bad, is described by the returned `BootstrapResult`. The
    /// bootstrap lock is released on every exit path. Does nothing unless
    /// `auto_bootstrap` is explicitly enabled.
    pub fn initialize(&self) -> BootstrapResult {
        let started = Instant::now();
        let mut result = BootstrapResult::new();

        if !self.config.auto_bootstrap {
            info!("Bootstrap disabled (auto_bootstrap is not set)");
            result.success = true;
            result.message = "Bootstrap disabled".to_string();
            result.actions.push("Bootstrap disabled".to_string());
            return result;
        }

        info!("Starting database bootstrap");
        let lock = BootstrapLock::new(self.config.lock_id, self.config.lock_ttl_secs);

        match self.run_phases(&lock, &mut result) {
            Ok(()) => {
                result.success = true;
                result.message = "Bootstrap completed".to_string();
            }
            Err(e) => {
                result.success = false;
                result.message = format!("Bootstrap failed: {e}");
                if result.errors.is_empty() {
                    result.errors.push(e.to_string());
                }
                error!("Bootstrap failed: {e}");
            }
        }

        // Released unconditionally; a no-op if acquisition never succeeded
        lock.release(self.db);

        result.duration_ms = started.elapsed().as_millis() as u64;
        if result.success {
            info!("Bootstrap finished in {}ms", result.duration_ms);
        }
        result
    }

    fn run_phases(
        &self,
        lock: &BootstrapLock,
        result: &mut BootstrapResult,
    ) -> Result<(), SqlBootError> {
        self.with_retry("acquire bootstrap lock", result, || lock.acquire(self.db))?;
        result.actions.push("Acquired bootstrap lock".to_string());

        self.with_retry("prepare migration ledger", result, || {
            MigrationRecord::ensure_table(self.db)
        })?;
        result.actions.push("Prepared migration ledger".to_string());

        // Captured before this run records anything, so a fresh database is
        // still recognizable after its migrations land in the ledger
        let first_run = MigrationRecord::is_first_run(self.db)?;

        let migrations = self.with_retry("apply migrations", result, || {
            migrate::apply_pending(self.db, self.config.migrations_dir())
        })?;
        result.migrations_applied = migrations.applied.len() as u64;
        result.warnings.extend(migrations.warnings);
        result
            .actions
            .push(format!("Applied {} migration(s)", migrations.applied.len()));

        let seeds = self.with_retry("execute seeds", result, || {
            seed::run_seeds(self.db, self.config.seeds_dir(), first_run)
        })?;
        result.seeds_executed = seeds.executed.len() as u64;
        result.warnings.extend(seeds.warnings);
        result
            .actions
            .push(format!("Executed {} seed(s)", seeds.executed.len()));

        self.with_retry("validate installation", result, || {
            validate::validate(self.db)
        })?;
        result.actions.push("Validated installation".to_string());

        // Reconciliation never fails the bootstrap: a missing super-admin
        // role is a legitimate state for a database seeded another way
        match reconcile::reconcile(self.db) {
            Ok(outcome) => {
                if !outcome.role_found {
                    result.warnings.push(format!(
                        "Role '{}' not found, permission grants skipped",
                        reconcile::SUPER_ADMIN_ROLE
                    ));
                }
                result.actions.push(format!(
                    "Granted {} permission(s) to '{}'",
                    outcome.granted,
                    reconcile::SUPER_ADMIN_ROLE
                ));
            }
            Err(e) => {
                warn!("Privilege reconciliation failed: {e}");
                result
                    .warnings
                    .push(format!("Privilege reconciliation failed: {e}"));
            }
        }

        Ok(())
    }

    /// Runs one phase up to `max_retries` times, sleeping between attempts
    /// per the configured backoff. If every attempt fails, the phase's error
    /// is recorded on the result and propagated.
    fn with_retry<T>(
        &self,
        phase: &str,
        result: &mut BootstrapResult,
        mut op: impl FnMut() -> Result<T, SqlBootError>,
    ) -> Result<T, SqlBootError> {
        let max = self.config.max_retries.max(1);
        let mut last_err = None;

        for attempt in 1..=max {
            match op() {
                Ok(value) => {
                    if attempt > 1 {
                        info!("Phase '{phase}' succeeded on attempt {attempt}");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!("Phase '{phase}' attempt {attempt}/{max} failed: {e}");
                    last_err = Some(e);
                    if attempt < max {
                        thread::sleep(self.retry_delay(attempt));
                    }
                }
            }
        }

        let err = last_err
            .unwrap_or_else(|| SqlBootError::Error(format!("phase '{phase}' never ran")));
        result
            .errors
            .push(format!("Phase '{phase}' failed after {max} attempt(s): {err}"));
        Err(err)
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_delay_ms;
        let ms = match self.config.backoff() {
            Backoff::Fixed => base,
            // 1x, 2x, 4x, ... capped so the shift can't overflow
            Backoff::Exponential => base.saturating_mul(1u64 << (attempt - 1).min(16)),
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lock::BootstrapLock;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// A complete on-disk setup: database file, migration directory with the
    /// RBAC schema split across three ordered files, and the four seeds.
    struct Fixture {
        _temp: TempDir,
        db: Database,
        config: BootstrapConfig,
    }

    const MIGRATION_001: &str = r#"
        CREATE TABLE people (id INTEGER PRIMARY KEY, email TEXT UNIQUE);
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            username TEXT UNIQUE,
            person_id INTEGER REFERENCES people(id)
        );
    "#;

    const MIGRATION_002: &str = r#"
        CREATE TABLE roles (id INTEGER PRIMARY KEY, code TEXT UNIQUE);
        CREATE TABLE permissions (id INTEGER PRIMARY KEY, code TEXT UNIQUE);
        CREATE TABLE menus (id INTEGER PRIMARY KEY, name TEXT);
    "#;

    const MIGRATION_003: &str = r#"
        CREATE TABLE authorizations (
            role_id INTEGER NOT NULL,
            permission_id INTEGER NOT NULL,
            menu_id INTEGER NOT NULL,
            created_at TEXT,
            updated_at TEXT,
            UNIQUE (role_id, permission_id, menu_id)
        );
    "#;

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let db = Database::open(&temp.path().join("boot.db")).unwrap();

        let migrations = temp.path().join("migrations");
        let seeds = temp.path().join("seeds");
        fs::create_dir(&migrations).unwrap();
        fs::create_dir(&seeds).unwrap();

        fs::write(migrations.join("001_identity.sql"), MIGRATION_001).unwrap();
        fs::write(migrations.join("002_rbac.sql"), MIGRATION_002).unwrap();
        fs::write(migrations.join("003_authorizations.sql"), MIGRATION_003).unwrap();

        fs::write(
            seeds.join("roles.seed.sql"),
            "INSERT OR IGNORE INTO roles (id, code) VALUES (1, 'super_admin'), (2, 'admin'), (3, 'user');",
        )
        .unwrap();
        fs::write(
            seeds.join("permissions.seed.sql"),
            "INSERT OR IGNORE INTO permissions (id, code) VALUES (1, 'users.read'), (2, 'users.write');",
        )
        .unwrap();
        fs::write(
            seeds.join("menus.seed.sql"),
            "INSERT OR IGNORE INTO menus (id, name) VALUES (1, 'root');",
        )
        .unwrap();
        fs::write(
            seeds.join("admin.seed.sql"),
            "INSERT OR IGNORE INTO people (id, email) VALUES (1, 'admin@example.com');
             INSERT OR IGNORE INTO users (id, username, person_id) VALUES (1, 'admin', 1);",
        )
        .unwrap();

        let mut config = Config::default_config().bootstrap;
        config.auto_bootstrap = true;
        config.migrations_dir = migrations.to_string_lossy().into_owned();
        config.seeds_dir = seeds.to_string_lossy().into_owned();
        config.retry_delay_ms = 0; // No point sleeping in tests

        Fixture {
            _temp: temp,
            db,
            config,
        }
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn()
            .unwrap()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn test_disabled_bootstrap_is_a_successful_noop() {
        let mut f = fixture();
        f.config.auto_bootstrap = false;

        let result = Bootstrap::new(&f.db, &f.config).initialize();
        assert!(result.success);
        assert_eq!(result.migrations_applied, 0);
        assert_eq!(result.seeds_executed, 0);
        assert!(result.errors.is_empty());

        // Nothing was touched, not even the ledger
        let conn = f.db.conn().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn test_empty_database_full_scenario() {
        let f = fixture();
        let result = Bootstrap::new(&f.db, &f.config).initialize();

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.migrations_applied, 3);
        assert_eq!(result.seeds_executed, 4);
        assert!(result.errors.is_empty());

        // Ledger has one row per migration file
        assert_eq!(MigrationRecord::applied_count(&f.db).unwrap(), 3);

        // Super-admin got every seeded permission
        assert_eq!(count(&f.db, "authorizations"), 2);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let f = fixture();
        let boot = Bootstrap::new(&f.db, &f.config);
        assert!(boot.initialize().success);

        let second = boot.initialize();
        assert!(second.success);
        assert_eq!(second.migrations_applied, 0);
        assert_eq!(second.seeds_executed, 0);
        assert_eq!(MigrationRecord::applied_count(&f.db).unwrap(), 3);
        assert_eq!(count(&f.db, "authorizations"), 2);
        assert_eq!(count(&f.db, "users"), 1);
    }

    #[test]
    fn test_failure_returns_result_and_releases_lock() {
        let f = fixture();
        // Poison the last migration so the run fails mid-way
        fs::write(
            Path::new(&f.config.migrations_dir).join("004_bad.sql"),
            "INSERT INTO nonexistent VALUES (1);",
        )
        .unwrap();

        let result = Bootstrap::new(&f.db, &f.config).initialize();
        assert!(!result.success);
        assert!(result.message.contains("Bootstrap failed"));
        assert!(!result.errors.is_empty());

        // The lock must be free again for the next process
        let lock = BootstrapLock::new(f.config.lock_id, f.config.lock_ttl_secs);
        lock.acquire(&f.db).unwrap();
    }

    #[test]
    fn test_lock_released_when_validation_fails() {
        let f = fixture();
        // Remove the seed that creates the admin account so validation fails
        fs::remove_file(Path::new(&f.config.seeds_dir).join("admin.seed.sql")).unwrap();

        let result = Bootstrap::new(&f.db, &f.config).initialize();
        assert!(!result.success);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("validate installation")));
        // The missing seed was reported as a warning before the failure
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("admin.seed.sql")));

        let lock = BootstrapLock::new(f.config.lock_id, f.config.lock_ttl_secs);
        lock.acquire(&f.db).unwrap();
    }

    #[test]
    fn test_lock_busy_fails_after_retries() {
        let mut f = fixture();
        f.config.max_retries = 2;

        // Another process holds the lock for the whole run
        let other = BootstrapLock::new(f.config.lock_id, f.config.lock_ttl_secs);
        other.acquire(&f.db).unwrap();

        let result = Bootstrap::new(&f.db, &f.config).initialize();
        assert!(!result.success);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("acquire bootstrap lock") && e.contains("2 attempt(s)")));

        // The loser must not have released the winner's lock
        let third = BootstrapLock::new(f.config.lock_id, f.config.lock_ttl_secs);
        assert!(third.acquire(&f.db).is_err());
    }

    #[test]
    fn test_seeds_skipped_when_ledger_has_history() {
        let f = fixture();
        // Simulate an earlier bootstrap by pre-populating the ledger
        MigrationRecord::ensure_table(&f.db).unwrap();
        let conn = f.db.conn().unwrap();
        MigrationRecord::record(&conn, "000_previous.sql", "cafe", 1, 1).unwrap();
        drop(conn);

        let result = Bootstrap::new(&f.db, &f.config).initialize();

        // Migrations still run, but the first-run gate holds seeds back,
        // so validation fails on the missing admin account
        assert!(!result.success);
        assert_eq!(result.migrations_applied, 3);
        assert_eq!(result.seeds_executed, 0);
        assert_eq!(count(&f.db, "users"), 0);
    }

    #[test]
    fn test_new_migration_after_bootstrap_is_applied_and_granted() {
        let f = fixture();
        let boot = Bootstrap::new(&f.db, &f.config);
        assert!(boot.initialize().success);

        // A later release ships one more migration adding a permission
        fs::write(
            Path::new(&f.config.migrations_dir).join("004_reports.sql"),
            "INSERT INTO permissions (id, code) VALUES (3, 'reports.read');",
        )
        .unwrap();

        let result = boot.initialize();
        assert!(result.success);
        assert_eq!(result.migrations_applied, 1);
        assert_eq!(result.seeds_executed, 0);
        // Reconciliation picked up the new permission for super_admin
        assert_eq!(count(&f.db, "authorizations"), 3);
    }
}
