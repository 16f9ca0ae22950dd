//! Trigger compilation example.
//!
//! Builds two triggers with the expression algebra, compiles each into its
//! drop + create pair and prints the literal SQL a migration file would hold.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p trigger-migrate-demos --example compile_trigger
//! ```

use trigger_migrate_core::{
    Expr, Operation, RaiseKind, STATEMENT_BREAKPOINT, Statement, Table, Timing, TriggerSpec,
    Update, compile, serialize_query,
};

fn main() {
    let papers = Table::new(
        "papers",
        ["paper_id", "paper_title", "downloads", "row_updated_at"],
    );

    // Refresh the timestamp whenever the title actually changes.
    let touch = TriggerSpec::builder("papers_touch_updated_at")
        .operation(Operation::Update)
        .table(papers.clone())
        .of_column("paper_title")
        .when(Expr::new_col("paper_title").is_not(Expr::old_col("paper_title")))
        .action(
            Update::table("papers")
                .set("row_updated_at", Expr::raw("unixepoch()"))
                .filter(Expr::column("paper_id").eq(Expr::new_col("paper_id")))
                .into(),
        )
        .build()
        .unwrap();

    let guard = TriggerSpec::builder("papers_no_negative_downloads")
        .operation(Operation::Update)
        .timing(Timing::Before)
        .table(papers)
        .of_column("downloads")
        .when(Expr::new_col("downloads").lt(Expr::value(0)))
        .action(Statement::raise(RaiseKind::Abort, "downloads can't be negative"))
        .build()
        .unwrap();

    for spec in [&touch, &guard] {
        let compiled = compile(spec).unwrap();
        let query = compiled.statement().to_query();
        println!("=== {} ({} bound parameter(s)) ===", compiled.name(), query.params.len());
        println!("{}\n", serialize_query(&query).unwrap());
    }

    println!("Statements are separated by {:?}.", STATEMENT_BREAKPOINT);
}
