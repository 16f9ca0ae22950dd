//! Idempotence verification for generated migrations.
//!
//! A converging migration must leave the same live trigger set whether it
//! is applied once or any number of times. [`verify_idempotence`] checks that
//! on a scratch in-memory database built from the declared tables.

use serde::Serialize;
use trigger_migrate_core::Table;

use crate::error::Result;
use crate::migration::{LiveTrigger, Migration};

/// Live trigger sets after one and after two applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdempotenceReport {
    pub statements: usize,
    pub after_first: Vec<LiveTrigger>,
    pub after_second: Vec<LiveTrigger>,
}

impl IdempotenceReport {
    pub fn is_idempotent(&self) -> bool {
        self.after_first == self.after_second
    }

    pub fn trigger_names(&self) -> Vec<&str> {
        self.after_second.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Applies `sql` twice to a fresh database holding `tables`.
///
/// `history` is applied first, in order, so the check also covers
/// migrations that must replace previously created triggers.
///
/// # Errors
///
/// Returns the first table creation or statement failure.
pub fn verify_idempotence<'a>(
    tables: impl IntoIterator<Item = &'a Table>,
    history: &[String],
    sql: &str,
) -> Result<IdempotenceReport> {
    let mut migration = Migration::in_memory()?;
    migration.up(tables)?;
    for prior in history {
        migration.apply(prior)?;
    }

    let statements = migration.apply(sql)?;
    let after_first = migration.live_triggers()?;
    migration.apply(sql)?;
    let after_second = migration.live_triggers()?;

    Ok(IdempotenceReport {
        statements,
        after_first,
        after_second,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trigger_migrate_core::{
        Expr, Operation, STATEMENT_BREAKPOINT, Statement, TriggerSpec, Update, compile,
        serialize_query,
    };

    fn papers() -> Table {
        Table::new("papers", ["paper_id", "paper_title", "row_updated_at"])
    }

    fn touch_trigger() -> String {
        let spec = TriggerSpec::builder("papers_touch")
            .operation(Operation::Update)
            .table(papers())
            .of_column("paper_title")
            .when(Expr::new_col("paper_title").is_not(Expr::old_col("paper_title")))
            .action(
                Update::table("papers")
                    .set("row_updated_at", Expr::value(42))
                    .filter(Expr::column("paper_id").eq(Expr::new_col("paper_id")))
                    .into(),
            )
            .build()
            .unwrap();
        serialize_query(&compile(&spec).unwrap().statement().to_query()).unwrap()
    }

    #[test]
    fn test_compiled_trigger_is_idempotent() {
        let sql = touch_trigger();
        let report = verify_idempotence([&papers()], &[], &sql).unwrap();
        assert!(report.is_idempotent());
        assert_eq!(report.statements, 2);
        assert_eq!(report.trigger_names(), ["papers_touch"]);
    }

    #[test]
    fn test_history_is_replaced() {
        let legacy = "CREATE TRIGGER \"legacy\" AFTER INSERT ON \"papers\" BEGIN SELECT 1; END;".to_string();
        let sql = format!(
            "DROP TRIGGER IF EXISTS \"legacy\";{STATEMENT_BREAKPOINT}{}",
            touch_trigger()
        );
        let report = verify_idempotence([&papers()], &[legacy], &sql).unwrap();
        assert!(report.is_idempotent());
        assert_eq!(report.trigger_names(), ["papers_touch"]);
    }

    #[test]
    fn test_raw_action_with_trailing_comment_applies() {
        let spec = TriggerSpec::builder("papers_noop")
            .operation(Operation::Insert)
            .table(papers())
            .action(Statement::raw("SELECT 1 -- placeholder until auditing lands"))
            .build()
            .unwrap();
        let sql = serialize_query(&compile(&spec).unwrap().statement().to_query()).unwrap();
        let report = verify_idempotence([&papers()], &[], &sql).unwrap();
        assert_eq!(report.trigger_names(), ["papers_noop"]);
    }

    #[test]
    fn test_bare_create_is_not_reapplicable() {
        let sql = "CREATE TRIGGER \"once\" AFTER INSERT ON \"papers\" BEGIN SELECT 1; END;";
        assert!(verify_idempotence([&papers()], &[], sql).is_err());
    }

    #[test]
    fn test_compiled_update_trigger_fires() {
        let mut migration = Migration::in_memory().unwrap();
        migration.up([&papers()]).unwrap();
        migration.apply(&touch_trigger()).unwrap();

        let conn = migration.connection();
        conn.execute(
            "INSERT INTO papers (paper_id, paper_title, row_updated_at) VALUES (1, 'a', 0)",
            [],
        )
        .unwrap();
        conn.execute("UPDATE papers SET paper_title = 'a' WHERE paper_id = 1", [])
            .unwrap();
        let unchanged: i64 = conn
            .query_row("SELECT row_updated_at FROM papers WHERE paper_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(unchanged, 0);

        conn.execute("UPDATE papers SET paper_title = 'b' WHERE paper_id = 1", [])
            .unwrap();
        let touched: i64 = conn
            .query_row("SELECT row_updated_at FROM papers WHERE paper_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(touched, 42);
    }
}
