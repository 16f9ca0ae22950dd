//! Error types for applying migrations to SQLite.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building a scratch database or applying
/// migration SQL to it.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// One statement of a migration failed; `index` is zero-based.
    #[error("statement {index} failed: {source}\n{statement}")]
    StatementFailed {
        index: usize,
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A declared table has no columns, which SQLite cannot create.
    #[error("table '{0}' declares no columns")]
    EmptyTable(String),

    /// A migration file could not be read.
    #[error("failed to read migration '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
