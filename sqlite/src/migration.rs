//! Applying generated migrations to a SQLite connection.
//!
//! Provides [`Migration`] for creating scratch tables, applying
//! breakpoint-separated migration SQL, and reading back the live trigger
//! set. All mutation operations use transactions so a failing statement
//! leaves the database as it was.
//!
//! # Example
//!
//! ```
//! use trigger_migrate_core::Table;
//! use trigger_migrate_sqlite::Migration;
//!
//! let mut migration = Migration::in_memory().unwrap();
//! migration.up([&Table::new("logs", ["id"])]).unwrap();
//! migration
//!     .apply(
//!         "DROP TRIGGER IF EXISTS \"logs_guard\";\
//!          --> statement-breakpoint\n\
//!          CREATE TRIGGER \"logs_guard\" BEFORE DELETE ON \"logs\" BEGIN SELECT RAISE(ABORT, 'no'); END;",
//!     )
//!     .unwrap();
//!
//! let status = migration.status().unwrap();
//! assert_eq!(status.triggers[0].name, "logs_guard");
//! ```

use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;
use trigger_migrate_core::{STATEMENT_BREAKPOINT, Table};

use crate::error::{Result, SqliteError};
use crate::schema::{generate_drop_sql, generate_schema_sql};

/// Splits migration SQL on the statement breakpoint, dropping blank chunks.
///
/// Trigger bodies contain `;`, so the breakpoint is the only safe statement
/// boundary.
pub fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(STATEMENT_BREAKPOINT.trim_end())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// A trigger as stored in `sqlite_master`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveTrigger {
    pub name: String,
    pub table: String,
    pub sql: String,
}

/// Manages a connection that migrations are applied to.
pub struct Migration {
    conn: Connection,
}

impl Migration {
    /// Wraps an existing connection.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Opens a fresh in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Creates typeless scratch tables.
    ///
    /// Uses `CREATE TABLE IF NOT EXISTS` so it is safe to call multiple times.
    pub fn up<'a>(&mut self, tables: impl IntoIterator<Item = &'a Table>) -> Result<()> {
        let sql = generate_schema_sql(tables)?;
        let tx = self.conn.transaction()?;
        tx.execute_batch(&sql)?;
        tx.commit()?;
        Ok(())
    }

    /// Drops the given tables and, with them, their triggers.
    pub fn down<'a>(&mut self, tables: impl IntoIterator<Item = &'a Table>) -> Result<()> {
        let sql = generate_drop_sql(tables);
        let tx = self.conn.transaction()?;
        tx.execute_batch(&sql)?;
        tx.commit()?;
        Ok(())
    }

    /// Applies breakpoint-separated migration SQL in one transaction.
    ///
    /// Returns the number of statements executed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::StatementFailed`] naming the first statement
    /// that failed; nothing is committed in that case.
    pub fn apply(&mut self, sql: &str) -> Result<usize> {
        let statements = split_statements(sql);
        let tx = self.conn.transaction()?;
        for (index, statement) in statements.iter().enumerate() {
            tx.execute_batch(statement)
                .map_err(|source| SqliteError::StatementFailed {
                    index,
                    statement: statement.to_string(),
                    source,
                })?;
        }
        tx.commit()?;
        Ok(statements.len())
    }

    /// Reads and applies one migration file.
    pub fn apply_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let sql = std::fs::read_to_string(path).map_err(|source| SqliteError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.apply(&sql)
    }

    /// Live triggers ordered by name.
    pub fn live_triggers(&self) -> Result<Vec<LiveTrigger>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, tbl_name, sql FROM sqlite_master WHERE type = 'trigger' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LiveTrigger {
                name: row.get(0)?,
                table: row.get(1)?,
                sql: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Returns the current table and trigger state.
    pub fn status(&self) -> Result<MigrationStatus> {
        // rusqlite range-checks the COUNT(*) into usize.
        let table_count: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )?;
        Ok(MigrationStatus {
            table_count,
            triggers: self.live_triggers()?,
        })
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the migration and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

/// Snapshot of a database after migrations were applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Number of user tables.
    pub table_count: usize,
    /// Live triggers ordered by name.
    pub triggers: Vec<LiveTrigger>,
}

impl MigrationStatus {
    pub fn trigger_names(&self) -> Vec<&str> {
        self.triggers.iter().map(|t| t.name.as_str()).collect()
    }
}
