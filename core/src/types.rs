//! Trigger model definitions.
//!
//! A [`TriggerSpec`] is the validated, declarative description of one
//! trigger. It can only be obtained through [`TriggerSpec::builder`], so every
//! spec in circulation has already passed [`validate_trigger`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::{Expr, Statement};
use crate::validate::{ValidationError, validate_trigger};

/// Row operation that fires a trigger.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::Operation;
///
/// assert_eq!(Operation::Update.to_string(), "UPDATE");
/// assert!(Operation::Insert.has_new_row());
/// assert!(!Operation::Insert.has_old_row());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// SQL keyword for the operation.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the `new` shadow row exists for this operation.
    pub fn has_new_row(self) -> bool {
        self != Self::Delete
    }

    /// Whether the `old` shadow row exists for this operation.
    pub fn has_old_row(self) -> bool {
        self != Self::Insert
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// When a trigger fires relative to its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    Before,
    /// The default timing.
    #[default]
    After,
    InsteadOf,
}

impl Timing {
    /// SQL keywords for the timing.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
            Self::InsteadOf => "INSTEAD OF",
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A relation a trigger is attached to, with its known columns.
///
/// Columns make shadow rows addressable: `new.<column>` only resolves for
/// columns listed here.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::Table;
///
/// let papers = Table::new("papers", ["paper_id", "paper_title"]);
/// assert!(papers.has_column("paper_title"));
/// assert!(!papers.has_column("abstract"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

impl Table {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Validated description of one trigger.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::*;
///
/// let papers = Table::new("papers", ["paper_id", "downloads"]);
/// let spec = TriggerSpec::builder("papers_count_downloads")
///     .operation(Operation::Update)
///     .table(papers)
///     .of_column("downloads")
///     .when(Expr::new_col("downloads").gt(Expr::old_col("downloads")))
///     .action(Statement::raw("SELECT 1"))
///     .build()
///     .unwrap();
///
/// assert_eq!(spec.name(), "papers_count_downloads");
/// assert_eq!(spec.timing(), Timing::After);
///
/// let err = TriggerSpec::builder("1bad")
///     .operation(Operation::Insert)
///     .table(Table::new("t", ["a"]))
///     .action(Statement::raw("SELECT 1"))
///     .build()
///     .unwrap_err();
/// assert_eq!(err, ValidationError::InvalidName("1bad".into()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerSpec {
    pub(crate) name: String,
    pub(crate) operation: Operation,
    pub(crate) timing: Timing,
    pub(crate) table: Table,
    pub(crate) of_column: Option<String>,
    pub(crate) when: Option<Expr>,
    pub(crate) action: Statement,
}

impl TriggerSpec {
    /// Starts a builder for a trigger named `name`.
    pub fn builder(name: impl Into<String>) -> TriggerSpecBuilder {
        TriggerSpecBuilder {
            name: Some(name.into()),
            ..TriggerSpecBuilder::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn of_column(&self) -> Option<&str> {
        self.of_column.as_deref()
    }

    pub fn when(&self) -> Option<&Expr> {
        self.when.as_ref()
    }

    pub fn action(&self) -> &Statement {
        &self.action
    }
}

/// Accumulates trigger fields; [`build`](Self::build) validates them.
///
/// Every field is optional here so that incomplete declarations surface as
/// [`ValidationError`]s instead of type errors.
#[derive(Debug, Clone, Default)]
pub struct TriggerSpecBuilder {
    pub name: Option<String>,
    pub operation: Option<Operation>,
    pub timing: Option<Timing>,
    pub table: Option<Table>,
    pub of_column: Option<String>,
    pub when: Option<Expr>,
    pub action: Option<Statement>,
}

impl TriggerSpecBuilder {
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn table(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }

    pub fn of_column(mut self, column: impl Into<String>) -> Self {
        self.of_column = Some(column.into());
        self
    }

    pub fn when(mut self, condition: Expr) -> Self {
        self.when = Some(condition);
        self
    }

    pub fn action(mut self, action: Statement) -> Self {
        self.action = Some(action);
        self
    }

    /// Validates the accumulated fields and produces a [`TriggerSpec`].
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn build(self) -> Result<TriggerSpec, ValidationError> {
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .ok_or(ValidationError::MissingName)?;
        let operation = self
            .operation
            .ok_or_else(|| ValidationError::MissingOperation(name.clone()))?;
        let table = self
            .table
            .ok_or_else(|| ValidationError::MissingTable(name.clone()))?;
        let action = self
            .action
            .ok_or_else(|| ValidationError::MissingAction(name.clone()))?;

        let spec = TriggerSpec {
            name,
            operation,
            timing: self.timing.unwrap_or_default(),
            table,
            of_column: self.of_column,
            when: self.when,
            action,
        };
        validate_trigger(&spec)?;
        Ok(spec)
    }
}
