//! Parameterized SQL fragments.
//!
//! [`Sql`] is an ordered list of chunks: raw text, identifiers, and bound
//! parameters. Fragments are combined with [`join`], which skips absent and
//! empty pieces so optional clauses never leave stray separators behind.
//! [`Sql::to_query`] flattens a fragment into placeholder text plus its bound
//! values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker placed between independent top-level statements in one artifact.
pub const STATEMENT_BREAKPOINT: &str = "--> statement-breakpoint\n";

/// A bound parameter value.
///
/// Deserializes untagged, so `null`, `42`, `1.5` and `"text"` map directly.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::Value;
///
/// assert_eq!(Value::from("draft"), Value::Text("draft".into()));
/// assert_eq!(Value::from(3), Value::Integer(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Chunk {
    Text(String),
    Identifier(String),
    Param(Value),
}

/// A composable SQL fragment.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::{Sql, Value};
///
/// let mut sql = Sql::raw("SELECT * FROM ");
/// sql.push(Sql::identifier("papers"));
/// sql.push_str(" WHERE year = ");
/// sql.push(Sql::param(Value::from(2024)));
///
/// let query = sql.to_query();
/// assert_eq!(query.sql, r#"SELECT * FROM "papers" WHERE year = ?"#);
/// assert_eq!(query.params, vec![Value::Integer(2024)]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sql {
    chunks: Vec<Chunk>,
}

impl Sql {
    /// Creates an empty fragment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw SQL text, emitted verbatim.
    pub fn raw(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::new();
        }
        Self {
            chunks: vec![Chunk::Text(text)],
        }
    }

    /// A double-quoted identifier.
    pub fn identifier(name: impl Into<String>) -> Self {
        Self {
            chunks: vec![Chunk::Identifier(name.into())],
        }
    }

    /// A bound parameter, rendered as `?` in [`Query::sql`].
    pub fn param(value: Value) -> Self {
        Self {
            chunks: vec![Chunk::Param(value)],
        }
    }

    /// A single-quoted string literal, inlined rather than bound.
    ///
    /// Needed where SQLite only accepts literals, e.g. `RAISE(ABORT, '...')`.
    pub fn string_literal(text: &str) -> Self {
        Self::raw(quote_string(text))
    }

    /// Returns `true` when the fragment renders to nothing.
    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(|chunk| match chunk {
            Chunk::Text(text) => text.is_empty(),
            Chunk::Identifier(_) | Chunk::Param(_) => false,
        })
    }

    /// Appends another fragment in place.
    pub fn push(&mut self, other: Sql) {
        self.chunks.extend(other.chunks);
    }

    /// Appends raw text in place.
    pub fn push_str(&mut self, text: &str) {
        if !text.is_empty() {
            self.chunks.push(Chunk::Text(text.to_string()));
        }
    }

    /// Consumes `self` and returns it with `other` appended.
    pub fn append(mut self, other: Sql) -> Self {
        self.push(other);
        self
    }

    /// Number of bound parameters in the fragment.
    pub fn param_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|chunk| matches!(chunk, Chunk::Param(_)))
            .count()
    }

    /// Flattens the fragment into placeholder text plus bound values.
    pub fn to_query(&self) -> Query {
        let mut sql = String::new();
        let mut params = Vec::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Text(text) => sql.push_str(text),
                Chunk::Identifier(name) => sql.push_str(&quote_identifier(name)),
                Chunk::Param(value) => {
                    sql.push('?');
                    params.push(value.clone());
                }
            }
        }
        Query { sql, params }
    }
}

/// A flattened statement: SQL text with `?` placeholders and their values.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<Value>,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Joins fragments with `separator`, skipping absent and empty ones.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::{Sql, join};
///
/// let of_clause: Option<Sql> = None;
/// let header = join(
///     [Some(Sql::raw("AFTER")), Some(Sql::raw("UPDATE")), of_clause, Some(Sql::raw("ON t"))],
///     " ",
/// );
/// assert_eq!(header.to_query().sql, "AFTER UPDATE ON t");
/// ```
pub fn join<I>(fragments: I, separator: &str) -> Sql
where
    I: IntoIterator<Item = Option<Sql>>,
{
    let mut joined = Sql::new();
    let mut first = true;
    for fragment in fragments.into_iter().flatten() {
        if fragment.is_empty() {
            continue;
        }
        if !first {
            joined.push_str(separator);
        }
        joined.push(fragment);
        first = false;
    }
    joined
}

/// Quotes an identifier with double quotes, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal with single quotes, doubling embedded quotes.
pub fn quote_string(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
