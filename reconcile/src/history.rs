//! Historical trigger discovery.
//!
//! Prior migration artifacts are scanned as text, never parsed or executed.
//! Every trigger name that any `*.sql` file ever created is historical, which
//! over-approximates what is live but is safe because the drops are
//! `IF EXISTS`.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::DiscoveryError;

static CREATE_TRIGGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bCREATE\s+(?:TEMP(?:ORARY)?\s+)?TRIGGER\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:[`"\[]?\w+[`"\]]?\.)?[`"'\[]?(\w+)"#,
    )
    .expect("static regex must compile")
});

/// Trigger names created anywhere in `sql`, distinct, in first-seen order.
///
/// # Examples
///
/// ```
/// use trigger_migrate_reconcile::trigger_names_in;
///
/// let sql = r#"
/// CREATE TRIGGER "audit_insert" AFTER INSERT ON "logs" BEGIN SELECT 1; END;
/// create temp trigger if not exists main.audit_delete after delete on logs begin select 1; end;
/// "#;
/// assert_eq!(trigger_names_in(sql), ["audit_insert", "audit_delete"]);
/// ```
pub fn trigger_names_in(sql: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    CREATE_TRIGGER_RE
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Every `*.sql` file directly inside `dir`, sorted by file name.
///
/// A missing directory has no artifacts.
pub fn migration_files(dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "migration directory does not exist; no history");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(DiscoveryError::MigrationDir {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DiscoveryError::MigrationDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension() == Some(OsStr::new("sql")) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// What prior artifacts say about triggers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct History {
    /// Artifacts scanned, in scan order.
    pub files: Vec<PathBuf>,
    /// Distinct trigger names in first-seen order across `files`.
    pub names: Vec<String>,
}

impl History {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Scans the migration directory for every trigger name ever created.
pub fn scan_history(dir: &Path) -> Result<History, DiscoveryError> {
    let files = migration_files(dir)?;
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for file in &files {
        let bytes = fs::read(file).map_err(|source| DiscoveryError::ReadFile {
            path: file.clone(),
            source,
        })?;
        // Names are plain identifiers, so undecodable bytes elsewhere are irrelevant.
        let found = trigger_names_in(&String::from_utf8_lossy(&bytes));
        debug!(file = %file.display(), triggers = found.len(), "scanned migration artifact");
        for name in found {
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }
    }

    Ok(History { files, names })
}
