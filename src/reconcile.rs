use log::{info, warn};
use rusqlite::OptionalExtension;

use crate::database::Database;
use crate::error::SqlBootError;

/// Well-known code of the highest-privilege role.
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

/// Menu the blanket grants are attached to (the root menu).
const ROOT_MENU_ID: i64 = 1;

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Grants inserted by this run. Zero when the role already had everything.
    pub granted: u64,
    pub role_found: bool,
}

/// Grants every permission that currently exists to the super-admin role.
///
/// This is how permissions introduced by later migrations become usable by
/// the top-level role without a manual grant step. Conflict-safe insertion
/// makes repeated runs no-ops. A missing super-admin role is a legitimate
/// empty-database state, so it is a warning rather than a failure.
pub fn reconcile(db: &Database) -> Result<ReconcileOutcome, SqlBootError> {
    let mut conn = db.conn()?;

    let role_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM roles WHERE code = ?",
            [SUPER_ADMIN_ROLE],
            |row| row.get(0),
        )
        .optional()?;

    let Some(role_id) = role_id else {
        warn!("Role '{SUPER_ADMIN_ROLE}' not found, permission grants skipped");
        return Ok(ReconcileOutcome::default());
    };

    let tx = conn.transaction()?;
    let granted = tx.execute(
        "INSERT OR IGNORE INTO authorizations (role_id, permission_id, menu_id, created_at, updated_at)
            SELECT ?1, p.id, ?2, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP
            FROM permissions p",
        rusqlite::params![role_id, ROOT_MENU_ID],
    )?;
    tx.commit()?;

    info!("Granted {granted} permission(s) to '{SUPER_ADMIN_ROLE}'");
    Ok(ReconcileOutcome {
        granted: granted as u64,
        role_found: true,
    })
}
