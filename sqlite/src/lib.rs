//! SQLite execution of generated trigger migrations.
//!
//! Generated migrations are plain SQL with `--> statement-breakpoint`
//! between top-level statements. This crate applies them to a SQLite
//! connection and reads back the live trigger set, which is how the CLI's
//! `verify` command and the test suites check that a migration converges.
//!
//! - **`schema`**: typeless scratch tables from declared [`Table`]s
//! - **`migration`**: [`Migration`], applying breakpoint-separated SQL
//! - **`verify`**: [`verify_idempotence`], apply-twice comparison
//!
//! # Quick start
//!
//! ```
//! use trigger_migrate_core::{Operation, Statement, Table, TriggerSpec, compile, serialize_query};
//! use trigger_migrate_sqlite::verify_idempotence;
//!
//! let logs = Table::new("logs", ["id"]);
//! let spec = TriggerSpec::builder("logs_audit")
//!     .operation(Operation::Insert)
//!     .table(logs.clone())
//!     .action(Statement::raw("SELECT 1"))
//!     .build()
//!     .unwrap();
//! let sql = serialize_query(&compile(&spec).unwrap().statement().to_query()).unwrap();
//!
//! let report = verify_idempotence([&logs], &[], &sql).unwrap();
//! assert!(report.is_idempotent());
//! ```
//!
//! [`Table`]: trigger_migrate_core::Table

mod error;
mod migration;
mod schema;
mod verify;

pub use error::{Result, SqliteError};
pub use migration::{LiveTrigger, Migration, MigrationStatus, split_statements};
pub use schema::{generate_drop_sql, generate_schema_sql};
pub use verify::{IdempotenceReport, verify_idempotence};
