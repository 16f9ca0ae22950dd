//! Expression algebra for trigger conditions and actions.
//!
//! Conditions ([`Expr`]) and actions ([`Statement`]) are plain data evaluated
//! against the trigger's [`RowAliases`]. Evaluation is where shadow-row
//! references are checked: an `old` reference in an insert trigger, or a
//! column the table does not declare, fails with a [`CompileError`] instead
//! of producing SQL that only breaks when the migration is applied.
//!
//! Both types deserialize from declaration files:
//!
//! ```
//! use trigger_migrate_core::{Expr, Statement};
//!
//! let when: Expr = serde_json::from_str(
//!     r#"{ "ne": [{ "new": "paper_title" }, { "old": "paper_title" }] }"#,
//! ).unwrap();
//! assert_eq!(when, Expr::new_col("paper_title").ne(Expr::old_col("paper_title")));
//!
//! let action: Statement = serde_json::from_str(r#"{ "raw": "SELECT 1" }"#).unwrap();
//! assert_eq!(action, Statement::raw("SELECT 1"));
//! ```

use serde::{Deserialize, Serialize};

use crate::alias::{RowAliases, Shadow};
use crate::compile::CompileError;
use crate::sql::{Sql, Value, join};
use crate::validate::is_valid_identifier;

/// Something that renders to SQL given the trigger's shadow rows.
pub trait Evaluate {
    /// Renders `self` as a fragment.
    ///
    /// # Errors
    ///
    /// Fails when the expression references a shadow row or column that is
    /// not available, or is structurally empty.
    fn evaluate(&self, rows: &RowAliases<'_>) -> Result<Sql, CompileError>;
}

/// A scalar or boolean SQL expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Column of the `new` shadow row.
    New(String),
    /// Column of the `old` shadow row.
    Old(String),
    /// Unqualified column of the statement's own table.
    Column(String),
    /// Bound parameter.
    Value(Value),
    /// Raw SQL, emitted verbatim (e.g. `unixepoch()`).
    Raw(String),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    Is(Box<Expr>, Box<Expr>),
    IsNot(Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    /// Scalar function call, e.g. `coalesce(new."a", 0)`.
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    pub fn new_col(column: impl Into<String>) -> Self {
        Self::New(column.into())
    }

    pub fn old_col(column: impl Into<String>) -> Self {
        Self::Old(column.into())
    }

    pub fn column(column: impl Into<String>) -> Self {
        Self::Column(column.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            name: name.into(),
            args,
        }
    }

    /// Conjunction of `items`.
    pub fn all(items: Vec<Expr>) -> Self {
        Self::And(items)
    }

    /// Disjunction of `items`.
    pub fn any(items: Vec<Expr>) -> Self {
        Self::Or(items)
    }

    pub fn eq(self, rhs: Expr) -> Self {
        Self::Eq(Box::new(self), Box::new(rhs))
    }

    pub fn ne(self, rhs: Expr) -> Self {
        Self::Ne(Box::new(self), Box::new(rhs))
    }

    pub fn lt(self, rhs: Expr) -> Self {
        Self::Lt(Box::new(self), Box::new(rhs))
    }

    pub fn le(self, rhs: Expr) -> Self {
        Self::Le(Box::new(self), Box::new(rhs))
    }

    pub fn gt(self, rhs: Expr) -> Self {
        Self::Gt(Box::new(self), Box::new(rhs))
    }

    pub fn ge(self, rhs: Expr) -> Self {
        Self::Ge(Box::new(self), Box::new(rhs))
    }

    /// Null-safe equality (`IS`).
    pub fn is(self, rhs: Expr) -> Self {
        Self::Is(Box::new(self), Box::new(rhs))
    }

    /// Null-safe inequality (`IS NOT`), the usual "did this column change" test.
    pub fn is_not(self, rhs: Expr) -> Self {
        Self::IsNot(Box::new(self), Box::new(rhs))
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Self::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Self {
        Self::IsNotNull(Box::new(self))
    }

    fn binary(&self) -> Option<(&Expr, &'static str, &Expr)> {
        let (lhs, op, rhs) = match self {
            Self::Eq(l, r) => (l, "=", r),
            Self::Ne(l, r) => (l, "<>", r),
            Self::Lt(l, r) => (l, "<", r),
            Self::Le(l, r) => (l, "<=", r),
            Self::Gt(l, r) => (l, ">", r),
            Self::Ge(l, r) => (l, ">=", r),
            Self::Is(l, r) => (l, "IS", r),
            Self::IsNot(l, r) => (l, "IS NOT", r),
            _ => return None,
        };
        Some((lhs.as_ref(), op, rhs.as_ref()))
    }

    /// Whether the rendered form needs parentheses when nested as an operand.
    fn is_compound(&self) -> bool {
        match self {
            Self::And(items) | Self::Or(items) => items.len() > 1,
            Self::Not(_) | Self::IsNull(_) | Self::IsNotNull(_) => true,
            // Raw text is opaque and may hold its own operators.
            Self::Raw(_) => true,
            other => other.binary().is_some(),
        }
    }

    fn operand(&self, rows: &RowAliases<'_>) -> Result<Sql, CompileError> {
        let inner = self.evaluate(rows)?;
        if self.is_compound() {
            Ok(Sql::raw("(").append(inner).append(Sql::raw(")")))
        } else {
            Ok(inner)
        }
    }

    fn connective(
        items: &[Expr],
        keyword: &'static str,
        rows: &RowAliases<'_>,
    ) -> Result<Sql, CompileError> {
        if items.is_empty() {
            return Err(CompileError::EmptyExpression(keyword));
        }
        let parts = items
            .iter()
            .map(|item| item.operand(rows).map(Some))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(join(parts, &format!(" {keyword} ")))
    }
}

impl Evaluate for Expr {
    fn evaluate(&self, rows: &RowAliases<'_>) -> Result<Sql, CompileError> {
        match self {
            Self::New(column) => rows.get(Shadow::New)?.column(column),
            Self::Old(column) => rows.get(Shadow::Old)?.column(column),
            Self::Column(column) => Ok(Sql::identifier(column)),
            Self::Value(value) => Ok(Sql::param(value.clone())),
            Self::Raw(sql) => {
                if sql.trim().is_empty() {
                    return Err(CompileError::EmptyExpression("raw"));
                }
                Ok(Sql::raw(close_line_comment(sql)))
            }
            Self::Eq(..)
            | Self::Ne(..)
            | Self::Lt(..)
            | Self::Le(..)
            | Self::Gt(..)
            | Self::Ge(..)
            | Self::Is(..)
            | Self::IsNot(..) => {
                let Some((lhs, op, rhs)) = self.binary() else {
                    return Err(CompileError::EmptyExpression("comparison"));
                };
                Ok(join(
                    [
                        Some(lhs.operand(rows)?),
                        Some(Sql::raw(op)),
                        Some(rhs.operand(rows)?),
                    ],
                    " ",
                ))
            }
            Self::And(items) => Self::connective(items, "AND", rows),
            Self::Or(items) => Self::connective(items, "OR", rows),
            Self::Not(inner) => Ok(Sql::raw("NOT ").append(inner.operand(rows)?)),
            Self::IsNull(inner) => Ok(inner.operand(rows)?.append(Sql::raw(" IS NULL"))),
            Self::IsNotNull(inner) => Ok(inner.operand(rows)?.append(Sql::raw(" IS NOT NULL"))),
            Self::Call { name, args } => {
                if !is_valid_identifier(name) {
                    return Err(CompileError::InvalidIdentifier(name.clone()));
                }
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(rows).map(Some))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Sql::raw(format!("{name}("))
                    .append(join(args, ", "))
                    .append(Sql::raw(")")))
            }
        }
    }
}

/// One `column = value` pair of an `UPDATE ... SET`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

/// `UPDATE <table> SET ... [WHERE ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub table: String,
    pub set: Vec<Assignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
}

impl Update {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: Vec::new(),
            filter: None,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: Expr) -> Self {
        self.set.push(Assignment {
            column: column.into(),
            value,
        });
        self
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// `INSERT INTO <table> (...) VALUES (...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Expr>,
}

impl Insert {
    pub fn into_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, column: impl Into<String>, value: Expr) -> Self {
        self.columns.push(column.into());
        self.values.push(value);
        self
    }
}

/// `DELETE FROM <table> [WHERE ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
}

impl Delete {
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Resolution passed to SQLite's `RAISE()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaiseKind {
    Ignore,
    Rollback,
    Abort,
    Fail,
}

impl RaiseKind {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Ignore => "IGNORE",
            Self::Rollback => "ROLLBACK",
            Self::Abort => "ABORT",
            Self::Fail => "FAIL",
        }
    }
}

/// `SELECT RAISE(<kind>[, '<message>'])`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raise {
    pub kind: RaiseKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The single statement a trigger body runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    Update(Update),
    Insert(Insert),
    Delete(Delete),
    Raise(Raise),
    /// Raw SQL statement without its terminating semicolon.
    Raw(String),
}

impl Statement {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    pub fn raise(kind: RaiseKind, message: impl Into<String>) -> Self {
        Self::Raise(Raise {
            kind,
            message: Some(message.into()),
        })
    }
}

impl From<Update> for Statement {
    fn from(update: Update) -> Self {
        Self::Update(update)
    }
}

impl From<Insert> for Statement {
    fn from(insert: Insert) -> Self {
        Self::Insert(insert)
    }
}

impl From<Delete> for Statement {
    fn from(delete: Delete) -> Self {
        Self::Delete(delete)
    }
}

fn where_clause(filter: Option<&Expr>, rows: &RowAliases<'_>) -> Result<Option<Sql>, CompileError> {
    match filter {
        Some(expr) => Ok(Some(Sql::raw("WHERE ").append(expr.evaluate(rows)?))),
        None => Ok(None),
    }
}

impl Evaluate for Statement {
    fn evaluate(&self, rows: &RowAliases<'_>) -> Result<Sql, CompileError> {
        match self {
            Self::Update(update) => {
                if update.set.is_empty() {
                    return Err(CompileError::EmptyExpression("set"));
                }
                let assignments = update
                    .set
                    .iter()
                    .map(|a| -> Result<Option<Sql>, CompileError> {
                        Ok(Some(
                            Sql::identifier(&a.column)
                                .append(Sql::raw(" = "))
                                .append(a.value.evaluate(rows)?),
                        ))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(join(
                    [
                        Some(Sql::raw("UPDATE ").append(Sql::identifier(&update.table))),
                        Some(Sql::raw("SET ").append(join(assignments, ", "))),
                        where_clause(update.filter.as_ref(), rows)?,
                    ],
                    " ",
                ))
            }
            Self::Insert(insert) => {
                if insert.columns.is_empty() {
                    return Err(CompileError::EmptyExpression("values"));
                }
                if insert.columns.len() != insert.values.len() {
                    return Err(CompileError::ArityMismatch {
                        columns: insert.columns.len(),
                        values: insert.values.len(),
                    });
                }
                let columns = insert
                    .columns
                    .iter()
                    .map(|c| Some(Sql::identifier(c)));
                let values = insert
                    .values
                    .iter()
                    .map(|v| v.evaluate(rows).map(Some))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Sql::raw("INSERT INTO ")
                    .append(Sql::identifier(&insert.table))
                    .append(Sql::raw(" ("))
                    .append(join(columns, ", "))
                    .append(Sql::raw(") VALUES ("))
                    .append(join(values, ", "))
                    .append(Sql::raw(")")))
            }
            Self::Delete(delete) => Ok(join(
                [
                    Some(Sql::raw("DELETE FROM ").append(Sql::identifier(&delete.table))),
                    where_clause(delete.filter.as_ref(), rows)?,
                ],
                " ",
            )),
            Self::Raise(raise) => {
                let message = match (raise.kind, raise.message.as_deref()) {
                    (RaiseKind::Ignore, _) => None,
                    (_, Some(message)) => Some(Sql::string_literal(message)),
                    (kind, None) => return Err(CompileError::MissingRaiseMessage(kind)),
                };
                Ok(Sql::raw("SELECT RAISE(")
                    .append(join([Some(Sql::raw(raise.kind.as_sql())), message], ", "))
                    .append(Sql::raw(")")))
            }
            Self::Raw(sql) => {
                let sql = sql.trim().trim_end_matches(';').trim_end();
                if sql.is_empty() {
                    return Err(CompileError::EmptyExpression("raw"));
                }
                Ok(Sql::raw(close_line_comment(sql)))
            }
        }
    }
}

/// Ends raw SQL with a newline when its last line holds a `--` comment, so
/// whatever follows is not commented out.
fn close_line_comment(sql: &str) -> String {
    let last_line = sql.rsplit('\n').next().unwrap_or(sql);
    if last_line.contains("--") {
        format!("{sql}\n")
    } else {
        sql.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Operation, Table};

    fn papers() -> Table {
        Table::new("papers", ["paper_id", "paper_title", "downloads", "row_updated_at"])
    }

    fn render(expr: &impl Evaluate, operation: Operation) -> Result<String, CompileError> {
        let table = papers();
        let rows = RowAliases::for_operation(&table, operation);
        expr.evaluate(&rows).map(|sql| sql.to_query().sql)
    }

    #[test]
    fn test_comparison_of_shadow_rows() {
        let expr = Expr::new_col("paper_title").is_not(Expr::old_col("paper_title"));
        assert_eq!(
            render(&expr, Operation::Update).unwrap(),
            r#"new."paper_title" IS NOT old."paper_title""#
        );
    }

    #[test]
    fn test_connectives_parenthesize_nested_operands() {
        let expr = Expr::any(vec![
            Expr::new_col("downloads").gt(Expr::value(10)),
            Expr::all(vec![
                Expr::new_col("paper_title").is_not_null(),
                Expr::raw("1 = 1"),
            ]),
        ]);
        assert_eq!(
            render(&expr, Operation::Insert).unwrap(),
            r#"(new."downloads" > ?) OR ((new."paper_title" IS NOT NULL) AND (1 = 1))"#
        );
    }

    #[test]
    fn test_raw_operand_keeps_its_own_precedence() {
        let expr = Expr::all(vec![
            Expr::new_col("downloads").eq(Expr::value(1)),
            Expr::raw("0 = 1 OR 1 = 1"),
        ]);
        assert_eq!(
            render(&expr, Operation::Insert).unwrap(),
            r#"(new."downloads" = ?) AND (0 = 1 OR 1 = 1)"#
        );
        assert_eq!(
            render(&Expr::raw("0 = 1 OR 1 = 1").negate(), Operation::Insert).unwrap(),
            "NOT (0 = 1 OR 1 = 1)"
        );
    }

    #[test]
    fn test_single_item_connective_is_not_wrapped() {
        let expr = Expr::all(vec![Expr::new_col("downloads").is_null()]).negate();
        assert_eq!(
            render(&expr, Operation::Insert).unwrap(),
            r#"NOT (new."downloads" IS NULL)"#
        );
    }

    #[test]
    fn test_empty_connective_is_an_error() {
        assert_eq!(
            render(&Expr::all(vec![]), Operation::Insert),
            Err(CompileError::EmptyExpression("AND"))
        );
    }

    #[test]
    fn test_illegal_shadow_row_is_rejected_at_evaluation() {
        let expr = Expr::old_col("paper_id").eq(Expr::value(1));
        assert_eq!(
            render(&expr, Operation::Insert),
            Err(CompileError::AliasUnavailable {
                shadow: Shadow::Old,
                operation: Operation::Insert
            })
        );
    }

    #[test]
    fn test_function_call_validates_name() {
        let ok = Expr::call("coalesce", vec![Expr::new_col("downloads"), Expr::value(0)]);
        assert_eq!(
            render(&ok, Operation::Update).unwrap(),
            r#"coalesce(new."downloads", ?)"#
        );

        let bad = Expr::call("drop table x; --", vec![]);
        assert!(matches!(
            render(&bad, Operation::Update),
            Err(CompileError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_update_statement() {
        let stmt: Statement = Update::table("papers")
            .set("row_updated_at", Expr::raw("unixepoch()"))
            .filter(Expr::column("paper_id").eq(Expr::new_col("paper_id")))
            .into();
        assert_eq!(
            render(&stmt, Operation::Update).unwrap(),
            r#"UPDATE "papers" SET "row_updated_at" = unixepoch() WHERE "paper_id" = new."paper_id""#
        );
    }

    #[test]
    fn test_insert_statement_binds_values() {
        let stmt: Statement = Insert::into_table("audit_log")
            .value("paper_id", Expr::old_col("paper_id"))
            .value("kind", Expr::value("deleted"))
            .into();
        let table = papers();
        let rows = RowAliases::for_operation(&table, Operation::Delete);
        let query = stmt.evaluate(&rows).unwrap().to_query();
        assert_eq!(
            query.sql,
            r#"INSERT INTO "audit_log" ("paper_id", "kind") VALUES (old."paper_id", ?)"#
        );
        assert_eq!(query.params, vec![Value::from("deleted")]);
    }

    #[test]
    fn test_insert_arity_mismatch() {
        let stmt = Statement::Insert(Insert {
            table: "t".into(),
            columns: vec!["a".into(), "b".into()],
            values: vec![Expr::value(1)],
        });
        assert_eq!(
            render(&stmt, Operation::Insert),
            Err(CompileError::ArityMismatch {
                columns: 2,
                values: 1
            })
        );
    }

    #[test]
    fn test_delete_without_filter() {
        let stmt: Statement = Delete::from_table("cache").into();
        assert_eq!(
            render(&stmt, Operation::Delete).unwrap(),
            r#"DELETE FROM "cache""#
        );
    }

    #[test]
    fn test_raise_inlines_message_literal() {
        let stmt = Statement::raise(RaiseKind::Abort, "papers are append-only");
        assert_eq!(
            render(&stmt, Operation::Delete).unwrap(),
            "SELECT RAISE(ABORT, 'papers are append-only')"
        );

        let ignore = Statement::Raise(Raise {
            kind: RaiseKind::Ignore,
            message: None,
        });
        assert_eq!(render(&ignore, Operation::Delete).unwrap(), "SELECT RAISE(IGNORE)");

        let missing = Statement::Raise(Raise {
            kind: RaiseKind::Fail,
            message: None,
        });
        assert_eq!(
            render(&missing, Operation::Delete),
            Err(CompileError::MissingRaiseMessage(RaiseKind::Fail))
        );
    }

    #[test]
    fn test_raw_statement_drops_trailing_semicolon() {
        assert_eq!(
            render(&Statement::raw("  SELECT 1;  "), Operation::Insert).unwrap(),
            "SELECT 1"
        );
        assert_eq!(
            render(&Statement::raw(" ; "), Operation::Insert),
            Err(CompileError::EmptyExpression("raw"))
        );
    }

    #[test]
    fn test_trailing_line_comment_is_closed() {
        assert_eq!(
            render(&Statement::raw("SELECT 1 -- note"), Operation::Insert).unwrap(),
            "SELECT 1 -- note\n"
        );
        assert_eq!(
            render(&Statement::raw("-- note\nSELECT 1"), Operation::Insert).unwrap(),
            "-- note\nSELECT 1"
        );
        let expr = Expr::any(vec![Expr::raw("1 -- always"), Expr::raw("0")]);
        assert_eq!(
            render(&expr, Operation::Insert).unwrap(),
            "(1 -- always\n) OR (0)"
        );
    }

    #[test]
    fn test_statements_deserialize_from_yaml() {
        let yaml = r#"
update:
  table: papers
  set:
    - column: row_updated_at
      value: { raw: "unixepoch()" }
  filter:
    eq: [{ column: paper_id }, { new: paper_id }]
"#;
        let stmt: Statement = serde_yaml::from_str(yaml).unwrap();
        let expected: Statement = Update::table("papers")
            .set("row_updated_at", Expr::raw("unixepoch()"))
            .filter(Expr::column("paper_id").eq(Expr::new_col("paper_id")))
            .into();
        assert_eq!(stmt, expected);
    }
}
