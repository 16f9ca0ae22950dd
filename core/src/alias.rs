//! Shadow row aliases available inside a trigger.
//!
//! SQLite exposes the affected row as `new` (after the change) and `old`
//! (before it). Which of the two exist depends on the operation: inserts have
//! no `old` row and deletes have no `new` row. [`RowAliases`] only ever hands
//! out the legal subset, and each [`RowAlias`] only resolves columns the
//! target [`Table`] declares.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compile::CompileError;
use crate::sql::Sql;
use crate::{Operation, Table};

/// Fixed name of a shadow row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shadow {
    New,
    Old,
}

impl Shadow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Old => "old",
        }
    }
}

impl fmt::Display for Shadow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only, column-addressable view of the target table under a shadow name.
#[derive(Debug, Clone, Copy)]
pub struct RowAlias<'a> {
    shadow: Shadow,
    table: &'a Table,
}

impl<'a> RowAlias<'a> {
    pub fn shadow(&self) -> Shadow {
        self.shadow
    }

    pub fn table(&self) -> &'a Table {
        self.table
    }

    /// Reference to `column` on this shadow row, e.g. `new."paper_title"`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnknownColumn`] if the table does not declare
    /// the column.
    pub fn column(&self, column: &str) -> Result<Sql, CompileError> {
        if !self.table.has_column(column) {
            return Err(CompileError::UnknownColumn {
                table: self.table.name.clone(),
                column: column.to_string(),
            });
        }
        let mut sql = Sql::raw(self.shadow.as_str());
        sql.push_str(".");
        sql.push(Sql::identifier(column));
        Ok(sql)
    }
}

/// The shadow rows legal for one trigger.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::*;
///
/// let papers = Table::new("papers", ["paper_id"]);
/// let rows = RowAliases::for_operation(&papers, Operation::Insert);
///
/// assert!(rows.new_row().is_ok());
/// assert!(rows.old_row().is_err());
/// assert_eq!(
///     rows.new_row().unwrap().column("paper_id").unwrap().to_query().sql,
///     r#"new."paper_id""#
/// );
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RowAliases<'a> {
    operation: Operation,
    new_row: Option<RowAlias<'a>>,
    old_row: Option<RowAlias<'a>>,
}

impl<'a> RowAliases<'a> {
    pub fn for_operation(table: &'a Table, operation: Operation) -> Self {
        let alias = |shadow| RowAlias { shadow, table };
        Self {
            operation,
            new_row: operation.has_new_row().then(|| alias(Shadow::New)),
            old_row: operation.has_old_row().then(|| alias(Shadow::Old)),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The row after the change. Absent for deletes.
    pub fn new_row(&self) -> Result<RowAlias<'a>, CompileError> {
        self.get(Shadow::New)
    }

    /// The row before the change. Absent for inserts.
    pub fn old_row(&self) -> Result<RowAlias<'a>, CompileError> {
        self.get(Shadow::Old)
    }

    /// Looks up a shadow row by name.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::AliasUnavailable`] when the operation has no
    /// such row.
    pub fn get(&self, shadow: Shadow) -> Result<RowAlias<'a>, CompileError> {
        let alias = match shadow {
            Shadow::New => self.new_row,
            Shadow::Old => self.old_row,
        };
        alias.ok_or(CompileError::AliasUnavailable {
            shadow,
            operation: self.operation,
        })
    }
}
