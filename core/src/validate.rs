//! Trigger and trigger-set validation.
//!
//! Validates the structural invariants of a [`TriggerSpec`] (identifier
//! grammar, `OF <column>` placement) and of a whole set of triggers (unique
//! names) before any SQL is generated.
//!
//! # Examples
//!
//! ```
//! use trigger_migrate_core::*;
//!
//! assert!(is_valid_identifier("papers_touch"));
//! assert!(is_valid_identifier("_private1"));
//! assert!(!is_valid_identifier("1bad"));
//! assert!(!is_valid_identifier("drop;--"));
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::{Operation, TriggerSpec};

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex must compile"));

/// Trigger validation errors.
///
/// Variants carry the trigger name where one is known so that a failure in a
/// large declaration set can be traced back to its source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Trigger name is missing or empty.
    #[error("trigger name is required")]
    MissingName,
    /// Trigger has no operation (insert, update or delete).
    #[error("trigger '{0}' has no operation")]
    MissingOperation(String),
    /// Trigger has no target table.
    #[error("trigger '{0}' has no target table")]
    MissingTable(String),
    /// Trigger has no action.
    #[error("trigger '{0}' has no action")]
    MissingAction(String),
    /// Name does not match `^[A-Za-z_][A-Za-z0-9_]*$`.
    #[error(
        "invalid trigger name '{0}': must start with a letter or underscore and contain only letters, numbers, and underscores"
    )]
    InvalidName(String),
    /// Target table name is empty.
    #[error("trigger '{0}' targets a table with an empty name")]
    EmptyTableName(String),
    /// `OF <column>` given for an operation other than update.
    #[error("trigger '{trigger}' restricts to a column but fires on {operation}, not UPDATE")]
    ColumnFilterRequiresUpdate {
        trigger: String,
        operation: Operation,
    },
    /// `OF <column>` names a column the table does not declare.
    #[error("trigger '{trigger}' restricts to unknown column '{table}.{column}'")]
    UnknownColumnFilter {
        trigger: String,
        table: String,
        column: String,
    },
    /// Trigger references a table no declaration defines.
    #[error("trigger '{trigger}' references undeclared table '{table}'")]
    UnknownTable { trigger: String, table: String },
    /// The same table is declared twice with different columns.
    #[error("table '{0}' is declared more than once with different columns")]
    ConflictingTable(String),
    /// Two triggers in the same set share a name.
    #[error("duplicate trigger name: {0}")]
    DuplicateTrigger(String),
}

/// Returns `true` when `name` matches the SQL identifier grammar used for
/// trigger names.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Validates a single trigger.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate_trigger(spec: &TriggerSpec) -> Result<(), ValidationError> {
    if spec.name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    if !is_valid_identifier(&spec.name) {
        return Err(ValidationError::InvalidName(spec.name.clone()));
    }
    if spec.table.name.trim().is_empty() {
        return Err(ValidationError::EmptyTableName(spec.name.clone()));
    }

    if let Some(column) = &spec.of_column {
        if spec.operation != Operation::Update {
            return Err(ValidationError::ColumnFilterRequiresUpdate {
                trigger: spec.name.clone(),
                operation: spec.operation,
            });
        }
        if !spec.table.has_column(column) {
            return Err(ValidationError::UnknownColumnFilter {
                trigger: spec.name.clone(),
                table: spec.table.name.clone(),
                column: column.clone(),
            });
        }
    }

    Ok(())
}

/// Validates a set of triggers that will be emitted together.
///
/// Checks each trigger individually and rejects duplicate names. Stops at
/// the first error.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::*;
///
/// let table = Table::new("t", ["a"]);
/// let spec = TriggerSpec::builder("t_audit")
///     .operation(Operation::Insert)
///     .table(table)
///     .action(Statement::raw("SELECT 1"))
///     .build()
///     .unwrap();
///
/// assert!(validate_trigger_set(&[spec.clone()]).is_empty());
/// assert_eq!(
///     validate_trigger_set(&[spec.clone(), spec]),
///     vec![ValidationError::DuplicateTrigger("t_audit".into())]
/// );
/// ```
pub fn validate_trigger_set(specs: &[TriggerSpec]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for spec in specs {
        if let Err(err) = validate_trigger(spec) {
            errors.push(err);
            return errors;
        }
        if !seen.insert(spec.name.as_str()) {
            errors.push(ValidationError::DuplicateTrigger(spec.name.clone()));
            return errors;
        }
    }

    errors
}
