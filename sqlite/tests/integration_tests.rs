//! Integration tests for the trigger-migrate-sqlite crate.

use std::fs;

use tempfile::TempDir;
use trigger_migrate_core::Table;
use trigger_migrate_reconcile::{
    ReconcileConfig, Reconciler, TimestampGenerator, load_registry, migration_files,
};
use trigger_migrate_sqlite::{Migration, verify_idempotence};

const DECLARATIONS: &str = r#"
tables:
  - name: papers
    columns: [paper_id, paper_title, downloads, row_updated_at]
  - name: paper_events
    columns: [paper_id, kind]
triggers:
  - name: papers_no_negative_downloads
    operation: update
    timing: before
    table: papers
    of: downloads
    when: { lt: [{ new: downloads }, { value: 0 }] }
    action:
      raise: { kind: abort, message: "downloads can't be negative" }
  - name: papers_log_delete
    operation: delete
    table: papers
    action:
      insert:
        table: paper_events
        columns: [paper_id, kind]
        values: [{ old: paper_id }, { value: deleted }]
"#;

fn project() -> (TempDir, ReconcileConfig) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("papers.yaml"), DECLARATIONS).unwrap();
    let mut config = ReconcileConfig::new(vec![dir.path().join("papers.yaml")], "migrations");
    config.resolve_relative_to(dir.path());
    (dir, config)
}

fn declared_tables() -> Vec<Table> {
    vec![
        Table::new("papers", ["paper_id", "paper_title", "downloads", "row_updated_at"]),
        Table::new("paper_events", ["paper_id", "kind"]),
    ]
}

#[test]
fn test_generated_migration_fires_triggers() {
    let (_dir, config) = project();
    let registry = load_registry(&config).unwrap();
    let reconciler = Reconciler::new(&config.migrations, Box::new(TimestampGenerator::default()));
    let artifact = reconciler.run(registry).unwrap().artifact.unwrap();

    let tables = declared_tables();
    let mut migration = Migration::in_memory().unwrap();
    migration.up(&tables).unwrap();
    assert_eq!(migration.apply_file(&artifact).unwrap(), 4);

    let conn = migration.connection();
    conn.execute("INSERT INTO papers (paper_id, downloads) VALUES (7, 3)", [])
        .unwrap();
    let err = conn
        .execute("UPDATE papers SET downloads = -1 WHERE paper_id = 7", [])
        .unwrap_err();
    assert!(err.to_string().contains("downloads can't be negative"));

    conn.execute("DELETE FROM papers WHERE paper_id = 7", []).unwrap();
    let kind: String = conn
        .query_row("SELECT kind FROM paper_events WHERE paper_id = 7", [], |r| r.get(0))
        .unwrap();
    assert_eq!(kind, "deleted");
}

#[test]
fn test_every_run_converges_after_full_history() {
    let (dir, config) = project();
    let reconciler = Reconciler::new(&config.migrations, Box::new(TimestampGenerator::default()));
    reconciler.run(load_registry(&config).unwrap()).unwrap();

    // Rename one trigger and drop the other.
    let renamed = DECLARATIONS
        .replace("papers_log_delete", "papers_audit_delete")
        .replace("papers_no_negative_downloads", "papers_downloads_guard");
    fs::write(dir.path().join("papers.yaml"), renamed).unwrap();
    reconciler.run(load_registry(&config).unwrap()).unwrap();

    let tables = declared_tables();
    let mut migration = Migration::in_memory().unwrap();
    migration.up(&tables).unwrap();
    for file in migration_files(&config.migrations).unwrap() {
        migration.apply_file(file).unwrap();
    }
    assert_eq!(
        migration.status().unwrap().trigger_names(),
        ["papers_audit_delete", "papers_downloads_guard"]
    );
}

#[test]
fn test_plan_applied_twice_matches_once() {
    let (_dir, config) = project();
    let reconciler = Reconciler::new(&config.migrations, Box::new(TimestampGenerator::default()));
    let planned = reconciler.plan(&load_registry(&config).unwrap()).unwrap();

    let tables = declared_tables();
    let report = verify_idempotence(&tables, &[], &planned.sql).unwrap();
    assert!(report.is_idempotent());
    assert_eq!(
        report.trigger_names(),
        ["papers_log_delete", "papers_no_negative_downloads"]
    );
}
