//! Trigger model, validation and idempotent SQL compilation.
//!
//! This crate defines the declarative side of `trigger-migrate`:
//!
//! - [`TriggerSpec`]: a validated trigger declaration (name, operation,
//!   timing, table, optional column filter, condition and action).
//! - [`Expr`] / [`Statement`]: the expression algebra used for conditions
//!   and actions, evaluated against [`RowAliases`].
//! - [`compile`]: turns a spec into a [`CompiledTrigger`], an idempotent
//!   `DROP TRIGGER IF EXISTS` + `CREATE TRIGGER` pair.
//! - [`Sql`] / [`join`]: parameterized fragments that skip empty clauses.
//! - [`serialize_query`]: inlines bound parameters into literal SQL for
//!   migration files.
//!
//! Nothing here performs I/O or executes SQL.
//!
//! # Example
//!
//! ```
//! use trigger_migrate_core::*;
//!
//! let papers = Table::new("papers", ["paper_id", "downloads"]);
//! let spec = TriggerSpec::builder("papers_no_negative_downloads")
//!     .operation(Operation::Update)
//!     .timing(Timing::Before)
//!     .table(papers)
//!     .of_column("downloads")
//!     .when(Expr::new_col("downloads").lt(Expr::value(0)))
//!     .action(Statement::raise(RaiseKind::Abort, "downloads cannot be negative"))
//!     .build()
//!     .unwrap();
//!
//! let compiled = compile(&spec).unwrap();
//! let sql = serialize_query(&compiled.statement().to_query()).unwrap();
//! assert!(sql.contains("FOR EACH ROW WHEN new.\"downloads\" < 0"));
//! assert!(sql.contains("SELECT RAISE(ABORT, 'downloads cannot be negative');"));
//! ```

mod alias;
mod compile;
mod expr;
mod serialize;
mod sql;
mod types;
mod validate;

pub use alias::{RowAlias, RowAliases, Shadow};
pub use compile::{CompileError, CompiledTrigger, compile, drop_trigger_statement};
pub use expr::{Assignment, Delete, Evaluate, Expr, Insert, Raise, RaiseKind, Statement, Update};
pub use serialize::{SerializeError, literal, serialize_query};
pub use sql::{Query, STATEMENT_BREAKPOINT, Sql, Value, join, quote_identifier, quote_string};
pub use types::{Operation, Table, Timing, TriggerSpec, TriggerSpecBuilder};
pub use validate::{ValidationError, is_valid_identifier, validate_trigger, validate_trigger_set};
