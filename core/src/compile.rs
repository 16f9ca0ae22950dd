//! Trigger compilation into idempotent DROP + CREATE pairs.
//!
//! [`compile`] turns a [`TriggerSpec`] into a [`CompiledTrigger`]: a
//! `DROP TRIGGER IF EXISTS` followed by the `CREATE TRIGGER`, separated by
//! the statement breakpoint. Because the drop always comes first and
//! tolerates a missing trigger, applying the same pair any number of times
//! leaves exactly one, current trigger in place.
//!
//! # Output layout
//!
//! ```text
//! DROP TRIGGER IF EXISTS "name";--> statement-breakpoint
//! CREATE TRIGGER "name"
//! 	AFTER UPDATE OF "column" ON "table"
//! 	FOR EACH ROW WHEN <condition>
//! BEGIN
//! 	<action>;
//! END;
//! ```

use thiserror::Error;

use crate::alias::{RowAliases, Shadow};
use crate::expr::{Evaluate, RaiseKind};
use crate::sql::{STATEMENT_BREAKPOINT, Sql, join};
use crate::validate::{ValidationError, validate_trigger};
use crate::{Operation, TriggerSpec};

/// Errors raised while compiling a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The spec failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A condition or action referenced a shadow row the operation lacks.
    #[error("'{shadow}' row is not available in {operation} triggers")]
    AliasUnavailable {
        shadow: Shadow,
        operation: Operation,
    },
    /// A shadow-row reference named a column the table does not declare.
    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },
    /// A function name is not a plain identifier.
    #[error("invalid function name '{0}'")]
    InvalidIdentifier(String),
    /// A connective, assignment list or raw fragment is empty.
    #[error("empty {0} expression")]
    EmptyExpression(&'static str),
    /// An insert lists a different number of columns and values.
    #[error("insert lists {columns} columns but {values} values")]
    ArityMismatch { columns: usize, values: usize },
    /// `RAISE` other than `IGNORE` requires a message.
    #[error("RAISE({0:?}) requires a message")]
    MissingRaiseMessage(RaiseKind),
    /// Wraps any error with the trigger it occurred in.
    #[error("trigger '{trigger}': {source}")]
    InTrigger {
        trigger: String,
        #[source]
        source: Box<CompileError>,
    },
}

/// A compiled trigger: its drop and create statements.
///
/// Both statements are kept as parameterized [`Sql`]; use
/// [`statement`](Self::statement) for the breakpoint-joined pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTrigger {
    name: String,
    drop: Sql,
    create: Sql,
}

impl CompiledTrigger {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `DROP TRIGGER IF EXISTS "<name>";`
    pub fn drop_statement(&self) -> &Sql {
        &self.drop
    }

    /// `CREATE TRIGGER "<name>" ... END;`
    pub fn create_statement(&self) -> &Sql {
        &self.create
    }

    /// The drop and create statements joined by the statement breakpoint.
    pub fn statement(&self) -> Sql {
        join(
            [Some(self.drop.clone()), Some(self.create.clone())],
            STATEMENT_BREAKPOINT,
        )
    }
}

/// Builds `DROP TRIGGER IF EXISTS "<name>";`.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::drop_trigger_statement;
///
/// assert_eq!(
///     drop_trigger_statement("papers_touch").to_query().sql,
///     r#"DROP TRIGGER IF EXISTS "papers_touch";"#
/// );
/// ```
pub fn drop_trigger_statement(name: &str) -> Sql {
    Sql::raw("DROP TRIGGER IF EXISTS ")
        .append(Sql::identifier(name))
        .append(Sql::raw(";"))
}

/// Compiles a trigger spec into its drop + create pair.
///
/// Pure and deterministic: the same spec always yields identical output, and
/// nothing is produced unless every part compiles.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::*;
///
/// let papers = Table::new("papers", ["paper_id", "paper_title", "row_updated_at"]);
/// let spec = TriggerSpec::builder("papers_touch")
///     .operation(Operation::Update)
///     .table(papers)
///     .of_column("paper_title")
///     .when(Expr::new_col("paper_title").is_not(Expr::old_col("paper_title")))
///     .action(
///         Update::table("papers")
///             .set("row_updated_at", Expr::raw("unixepoch()"))
///             .filter(Expr::column("paper_id").eq(Expr::new_col("paper_id")))
///             .into(),
///     )
///     .build()
///     .unwrap();
///
/// let compiled = compile(&spec).unwrap();
/// let sql = compiled.statement().to_query().sql;
/// assert!(sql.starts_with("DROP TRIGGER IF EXISTS \"papers_touch\";"));
/// assert!(sql.contains("\tAFTER UPDATE OF \"paper_title\" ON \"papers\"\n"));
/// assert!(sql.ends_with("END;"));
/// ```
///
/// # Errors
///
/// Returns [`CompileError::InTrigger`] wrapping the validation or
/// evaluation failure.
pub fn compile(spec: &TriggerSpec) -> Result<CompiledTrigger, CompileError> {
    compile_inner(spec).map_err(|source| CompileError::InTrigger {
        trigger: spec.name().to_string(),
        source: Box::new(source),
    })
}

fn compile_inner(spec: &TriggerSpec) -> Result<CompiledTrigger, CompileError> {
    validate_trigger(spec)?;

    let column_filter = match spec.of_column() {
        Some(column) if spec.operation() == Operation::Update => {
            Some(Sql::raw("OF ").append(Sql::identifier(column)))
        }
        _ => None,
    };
    let header = join(
        [
            Some(Sql::raw(spec.timing().as_sql())),
            Some(Sql::raw(spec.operation().as_sql())),
            column_filter,
            Some(Sql::raw("ON")),
            Some(Sql::identifier(&spec.table().name)),
        ],
        " ",
    );

    let rows = RowAliases::for_operation(spec.table(), spec.operation());

    let condition = spec
        .when()
        .map(|when| -> Result<Sql, CompileError> {
            Ok(Sql::raw("\tFOR EACH ROW WHEN ").append(when.evaluate(&rows)?))
        })
        .transpose()?;

    let body = Sql::raw("\t")
        .append(spec.action().evaluate(&rows)?)
        .append(Sql::raw(";"));

    let create = join(
        [
            Some(Sql::raw("CREATE TRIGGER ").append(Sql::identifier(spec.name()))),
            Some(Sql::raw("\t").append(header)),
            condition,
            Some(Sql::raw("BEGIN")),
            Some(body),
            Some(Sql::raw("END")),
        ],
        "\n",
    )
    .append(Sql::raw(";"));

    Ok(CompiledTrigger {
        name: spec.name().to_string(),
        drop: drop_trigger_statement(spec.name()),
        create,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expr, Insert, Statement, Table, Timing, Update, Value};

    fn papers() -> Table {
        Table::new(
            "papers",
            ["paper_id", "paper_title", "downloads", "row_updated_at"],
        )
    }

    fn touch_spec() -> TriggerSpec {
        TriggerSpec::builder("papers_touch_updated_at")
            .operation(Operation::Update)
            .table(papers())
            .of_column("paper_title")
            .when(Expr::new_col("paper_title").is_not(Expr::old_col("paper_title")))
            .action(
                Update::table("papers")
                    .set("row_updated_at", Expr::raw("unixepoch()"))
                    .filter(Expr::column("paper_id").eq(Expr::new_col("paper_id")))
                    .into(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_compile_full_layout() {
        let sql = compile(&touch_spec()).unwrap().statement().to_query().sql;
        let expected = concat!(
            "DROP TRIGGER IF EXISTS \"papers_touch_updated_at\";",
            "--> statement-breakpoint\n",
            "CREATE TRIGGER \"papers_touch_updated_at\"\n",
            "\tAFTER UPDATE OF \"paper_title\" ON \"papers\"\n",
            "\tFOR EACH ROW WHEN new.\"paper_title\" IS NOT old.\"paper_title\"\n",
            "BEGIN\n",
            "\tUPDATE \"papers\" SET \"row_updated_at\" = unixepoch() WHERE \"paper_id\" = new.\"paper_id\";\n",
            "END;",
        );
        assert_eq!(sql, expected);
    }

    #[test]
    fn test_compile_without_condition_or_column() {
        let spec = TriggerSpec::builder("papers_audit_insert")
            .operation(Operation::Insert)
            .timing(Timing::Before)
            .table(papers())
            .action(
                Insert::into_table("audit_log")
                    .value("paper_id", Expr::new_col("paper_id"))
                    .value("kind", Expr::value("insert"))
                    .into(),
            )
            .build()
            .unwrap();

        let compiled = compile(&spec).unwrap();
        let query = compiled.create_statement().to_query();
        assert_eq!(
            query.sql,
            concat!(
                "CREATE TRIGGER \"papers_audit_insert\"\n",
                "\tBEFORE INSERT ON \"papers\"\n",
                "BEGIN\n",
                "\tINSERT INTO \"audit_log\" (\"paper_id\", \"kind\") VALUES (new.\"paper_id\", ?);\n",
                "END;",
            )
        );
        assert_eq!(query.params, vec![Value::from("insert")]);
        assert!(!query.sql.contains("FOR EACH ROW"));
    }

    #[test]
    fn test_exactly_one_drop_before_one_create() {
        let sql = compile(&touch_spec()).unwrap().statement().to_query().sql;
        assert_eq!(sql.matches("DROP TRIGGER IF EXISTS").count(), 1);
        assert_eq!(sql.matches("CREATE TRIGGER").count(), 1);
        assert!(sql.find("DROP TRIGGER").unwrap() < sql.find("CREATE TRIGGER").unwrap());
        assert_eq!(sql.matches(STATEMENT_BREAKPOINT).count(), 1);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let spec = touch_spec();
        let first = compile(&spec).unwrap();
        let second = compile(&spec).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.statement().to_query(),
            second.statement().to_query()
        );
    }

    #[test]
    fn test_instead_of_timing_keyword() {
        let spec = TriggerSpec::builder("v_insert")
            .operation(Operation::Insert)
            .timing(Timing::InsteadOf)
            .table(Table::new("paper_view", ["paper_id"]))
            .action(Statement::raw("SELECT 1"))
            .build()
            .unwrap();
        let sql = compile(&spec).unwrap().create_statement().to_query().sql;
        assert!(sql.contains("\tINSTEAD OF INSERT ON \"paper_view\"\n"));
    }

    #[test]
    fn test_illegal_alias_in_action_aborts_compilation() {
        let spec = TriggerSpec::builder("papers_bad")
            .operation(Operation::Insert)
            .table(papers())
            .action(
                Update::table("papers")
                    .set("downloads", Expr::old_col("downloads"))
                    .into(),
            )
            .build()
            .unwrap();
        let err = compile(&spec).unwrap_err();
        assert_eq!(
            err,
            CompileError::InTrigger {
                trigger: "papers_bad".to_string(),
                source: Box::new(CompileError::AliasUnavailable {
                    shadow: Shadow::Old,
                    operation: Operation::Insert,
                }),
            }
        );
        assert_eq!(
            err.to_string(),
            "trigger 'papers_bad': 'old' row is not available in INSERT triggers"
        );
    }

    #[test]
    fn test_unknown_column_in_condition_aborts_compilation() {
        let spec = TriggerSpec::builder("papers_bad_col")
            .operation(Operation::Delete)
            .table(papers())
            .when(Expr::old_col("abstract").is_not_null())
            .action(Statement::raw("SELECT 1"))
            .build()
            .unwrap();
        assert!(matches!(
            compile(&spec),
            Err(CompileError::InTrigger { source, .. })
                if matches!(*source, CompileError::UnknownColumn { .. })
        ));
    }
}
