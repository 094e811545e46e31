use log::info;

use crate::database::Database;
use crate::error::SqlBootError;

/// Tables that must exist after a successful bootstrap.
pub const REQUIRED_TABLES: [&str; 5] = ["people", "users", "roles", "permissions", "menus"];

/// Well-known username of the default privileged account.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Asserts the installation is complete: every required table exists and
/// exactly one default administrator account is present, linked to its
/// profile record. Any miss is fatal - there is nothing to retry here, the
/// earlier phases have to have actually produced this state.
pub fn validate(db: &Database) -> Result<(), SqlBootError> {
    let conn = db.conn()?;

    for table in REQUIRED_TABLES {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [table],
            |row| row.get(0),
        )?;
        if count == 0 {
            return Err(SqlBootError::ValidationError(format!(
                "required table missing: {table}"
            )));
        }
    }

    let admin_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users u
            JOIN people p ON u.person_id = p.id
            WHERE u.username = ?",
        [DEFAULT_ADMIN_USERNAME],
        |row| row.get(0),
    )?;

    if admin_count == 0 {
        return Err(SqlBootError::ValidationError(format!(
            "default administrator account '{DEFAULT_ADMIN_USERNAME}' not found"
        )));
    }
    if admin_count > 1 {
        return Err(SqlBootError::ValidationError(format!(
            "expected exactly one '{DEFAULT_ADMIN_USERNAME}' account, found {admin_count}"
        )));
    }

    info!("Installation validated");
    Ok(())
}
