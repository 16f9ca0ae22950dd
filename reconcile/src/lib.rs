//! Reconciliation of declared triggers against migration history.
//!
//! A run loads the current trigger set from declaration files into a
//! [`TriggerRegistry`], scans prior migration artifacts for every trigger
//! name they ever created, and writes one new artifact that drops all of
//! those and recreates the declared set.
//!
//! # Main entry points
//!
//! - [`reconcile`]: load a [`ReconcileConfig`] and run once.
//! - [`Reconciler::plan`]: compute the migration SQL without writing.
//! - [`scan_history`] / [`trigger_names_in`]: historical discovery only.
//! - [`ConvergencePlan::compute`]: the pure drop/recreate ordering.
//!
//! # Example
//!
//! ```
//! use trigger_migrate_core::{Operation, Statement, Table, TriggerSpec};
//! use trigger_migrate_reconcile::{Reconciler, TimestampGenerator, TriggerRegistry};
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(
//!     dir.path().join("0001_init.sql"),
//!     "CREATE TRIGGER \"legacy_audit\" AFTER INSERT ON logs BEGIN SELECT 1; END;",
//! )
//! .unwrap();
//!
//! let mut registry = TriggerRegistry::new();
//! registry
//!     .register(
//!         TriggerSpec::builder("logs_audit")
//!             .operation(Operation::Insert)
//!             .table(Table::new("logs", ["id"]))
//!             .action(Statement::raw("SELECT 1"))
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let reconciler = Reconciler::new(dir.path(), Box::new(TimestampGenerator::default()));
//! let planned = reconciler.plan(&registry).unwrap();
//! assert!(planned.sql.starts_with("DROP TRIGGER IF EXISTS \"legacy_audit\";"));
//! assert!(planned.sql.contains("CREATE TRIGGER \"logs_audit\""));
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod history;
pub mod plan;
pub mod reconciler;
pub mod source;

pub use config::{
    CommandGeneratorConfig, DEFAULT_CONFIG_FILE, GeneratorConfig, ReconcileConfig,
    TimestampGeneratorConfig,
};
pub use error::{DiscoveryError, ReconcileError, Result};
pub use generator::{
    CommandGenerator, MigrationFileGenerator, TimestampGenerator, generator_from_config,
};
pub use history::{History, migration_files, scan_history, trigger_names_in};
pub use plan::{ConvergencePlan, PlanStep};
pub use reconciler::{PlannedMigration, ReconcileReport, Reconciler, load_registry, reconcile};
pub use source::{
    DeclarationFile, DeclarationFiles, TriggerDecl, TriggerRegistry, TriggerSource,
    collect_declaration_paths, parse_declaration_file,
};
