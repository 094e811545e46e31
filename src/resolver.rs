use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SqlBootError;

/// A candidate migration script discovered on disk.
///
/// Ephemeral and read-only: the ledger, not this struct, is the durable
/// record of what has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub path: PathBuf,
    pub name: String,
}

/// Lists the migration scripts in `dir`, sorted by filename.
///
/// Files are discovered by their `.sql` extension (case-insensitive); dumps
/// and exports (any name containing "export") are skipped. Lexical order on
/// the filename is the execution order, so migrations are expected to carry
/// a numeric ordinal prefix (`001_`, `002_`, ...).
pub fn resolve(dir: &Path) -> Result<Vec<MigrationFile>, SqlBootError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        SqlBootError::Error(format!(
            "Cannot read migrations directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.to_ascii_lowercase().ends_with(".sql") {
            continue;
        }
        if name.contains("export") {
            continue;
        }
        files.push(MigrationFile {
            name: name.to_string(),
            path,
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(files)
}
