//! Reconciliation workflow example.
//!
//! Writes a declaration file into a scratch project, runs two reconciliations
//! (the second after renaming a trigger) and replays the whole migration
//! directory against an in-memory SQLite database.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p trigger-migrate-demos --example reconcile_dir
//! ```

use std::fs;

use trigger_migrate_reconcile::{
    DeclarationFiles, ReconcileConfig, load_registry, migration_files, reconcile,
};
use trigger_migrate_sqlite::Migration;

const DECLARATIONS: &str = r#"
tables:
  - name: logs
    columns: [id, msg]
triggers:
  - name: logs_append_only
    operation: delete
    timing: before
    table: logs
    action:
      raise: { kind: abort, message: "logs are append-only" }
"#;

fn main() {
    // === Step 1: Set up a scratch project ===
    let project = std::env::temp_dir().join("trigger_migrate_reconcile_example");
    let _ = fs::remove_dir_all(&project);
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("logs.yaml"), DECLARATIONS).unwrap();

    let mut config = ReconcileConfig::new(vec!["logs.yaml".into()], "migrations");
    config.resolve_relative_to(&project);

    // === Step 2: First reconciliation ===
    println!("=== First run ===");
    let report = reconcile(&config).unwrap();
    println!("Wrote {:?}", report.artifact);
    println!("  Recreated: {:?}", report.current);

    // === Step 3: Rename the trigger and reconcile again ===
    println!("\n=== Second run (renamed trigger) ===");
    fs::write(
        project.join("logs.yaml"),
        DECLARATIONS.replace("logs_append_only", "logs_no_delete"),
    )
    .unwrap();
    println!("Declared triggers: {:?}", load_registry(&config).unwrap().names());
    let report = reconcile(&config).unwrap();
    println!("Wrote {:?}", report.artifact);
    println!("  Dropped:   {:?}", report.historical);
    println!("  Recreated: {:?}", report.current);

    // === Step 4: Replay every migration file ===
    println!("\n=== Replay ===");
    let tables = DeclarationFiles::new(config.schema.iter().cloned())
        .tables()
        .unwrap();
    let mut migration = Migration::in_memory().unwrap();
    migration.up(&tables).unwrap();
    for file in migration_files(&config.migrations).unwrap() {
        let statements = migration.apply_file(&file).unwrap();
        println!("Applied {} ({statements} statement(s))", file.display());
    }
    let status = migration.status().unwrap();
    println!("Live triggers: {:?}", status.trigger_names());

    // === Step 5: Cleanup ===
    fs::remove_dir_all(&project).unwrap();
}
