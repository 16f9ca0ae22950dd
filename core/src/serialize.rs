//! Inlining bound parameters into self-contained SQL text.
//!
//! Migration artifacts are applied by tools that do not bind parameters, so
//! every `?` placeholder in a [`Query`] is replaced with the literal form of
//! its value. Text strings are single-quoted, everything else is emitted bare,
//! and all other text passes through unchanged. Question marks inside quoted
//! strings, quoted identifiers and comments are not placeholders.

use thiserror::Error;

use crate::sql::{Query, Value, quote_string};

/// Failures while inlining parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SerializeError {
    /// The number of placeholders differs from the number of bound values.
    #[error("query has {placeholders} placeholders but {params} bound parameters")]
    PlaceholderMismatch { placeholders: usize, params: usize },
    /// A real parameter is NaN or infinite and has no SQL literal form.
    #[error("parameter {index} is not a finite number")]
    NonFiniteReal { index: usize },
}

/// Renders a value as an SQL literal.
///
/// # Errors
///
/// Returns [`SerializeError::NonFiniteReal`] for NaN or infinite reals.
pub fn literal(value: &Value, index: usize) -> Result<String, SerializeError> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(r) if r.is_finite() => format!("{r:?}"),
        Value::Real(_) => return Err(SerializeError::NonFiniteReal { index }),
        Value::Text(text) => quote_string(text),
    })
}

/// Converts a parameterized query into literal SQL.
///
/// # Examples
///
/// ```
/// use trigger_migrate_core::{Query, Value, serialize_query};
///
/// let query = Query {
///     sql: "UPDATE t SET a = ?, b = ? WHERE id = ?".into(),
///     params: vec![Value::from("x"), Value::from("y"), Value::from(7)],
/// };
/// assert_eq!(
///     serialize_query(&query).unwrap(),
///     "UPDATE t SET a = 'x', b = 'y' WHERE id = 7"
/// );
/// ```
///
/// # Errors
///
/// Returns [`SerializeError::PlaceholderMismatch`] when placeholders and
/// parameters do not pair up, or [`SerializeError::NonFiniteReal`].
pub fn serialize_query(query: &Query) -> Result<String, SerializeError> {
    let offsets = placeholder_offsets(&query.sql);
    if offsets.len() != query.params.len() {
        return Err(SerializeError::PlaceholderMismatch {
            placeholders: offsets.len(),
            params: query.params.len(),
        });
    }

    let mut out = String::with_capacity(query.sql.len());
    let mut cursor = 0;
    for (index, (offset, value)) in offsets.iter().zip(&query.params).enumerate() {
        out.push_str(&query.sql[cursor..*offset]);
        out.push_str(&literal(value, index)?);
        cursor = offset + 1;
    }
    out.push_str(&query.sql[cursor..]);
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Byte offsets of every `?` that sits outside quotes and comments.
fn placeholder_offsets(sql: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut state = ScanState::Code;
    let mut chars = sql.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let next = chars.peek().map(|(_, next)| *next);
        state = match state {
            ScanState::Code => match c {
                '?' => {
                    offsets.push(offset);
                    ScanState::Code
                }
                '\'' | '"' | '`' => ScanState::Quoted(c),
                '[' => ScanState::Quoted(']'),
                '-' if next == Some('-') => ScanState::LineComment,
                '/' if next == Some('*') => {
                    chars.next();
                    ScanState::BlockComment
                }
                _ => ScanState::Code,
            },
            // A doubled quote closes and immediately reopens the literal.
            ScanState::Quoted(close) if c == close => ScanState::Code,
            ScanState::LineComment if c == '\n' => ScanState::Code,
            ScanState::BlockComment if c == '*' && next == Some('/') => {
                chars.next();
                ScanState::Code
            }
            other => other,
        };
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(sql: &str, params: Vec<Value>) -> Query {
        Query {
            sql: sql.to_string(),
            params,
        }
    }

    #[test]
    fn test_inlines_strings_quoted_and_numbers_bare() {
        let q = query(
            "INSERT INTO log (kind, note, n) VALUES (?, ?, ?);\n-- keep",
            vec![Value::from("paper"), Value::from("added"), Value::from(42)],
        );
        assert_eq!(
            serialize_query(&q).unwrap(),
            "INSERT INTO log (kind, note, n) VALUES ('paper', 'added', 42);\n-- keep"
        );
    }

    #[test]
    fn test_escapes_embedded_single_quotes() {
        let q = query("SELECT ?", vec![Value::from("O'Hara")]);
        assert_eq!(serialize_query(&q).unwrap(), "SELECT 'O''Hara'");
    }

    #[test]
    fn test_null_and_real_literals() {
        let q = query("VALUES (?, ?)", vec![Value::Null, Value::Real(1.5)]);
        assert_eq!(serialize_query(&q).unwrap(), "VALUES (NULL, 1.5)");
    }

    #[test]
    fn test_question_marks_inside_quotes_and_comments_are_kept() {
        let q = query(
            "SELECT '?', \"a?\", [b?], ? /* ? */ -- ?\n",
            vec![Value::from(1)],
        );
        assert_eq!(
            serialize_query(&q).unwrap(),
            "SELECT '?', \"a?\", [b?], 1 /* ? */ -- ?\n"
        );
    }

    #[test]
    fn test_doubled_quotes_do_not_end_a_literal() {
        let q = query("SELECT 'it''s ?', ?", vec![Value::from(2)]);
        assert_eq!(serialize_query(&q).unwrap(), "SELECT 'it''s ?', 2");
    }

    #[test]
    fn test_breakpoint_marker_is_not_a_placeholder_context() {
        let q = query(
            "DROP TRIGGER IF EXISTS \"a\";--> statement-breakpoint\nSELECT ?",
            vec![Value::from("x")],
        );
        assert_eq!(
            serialize_query(&q).unwrap(),
            "DROP TRIGGER IF EXISTS \"a\";--> statement-breakpoint\nSELECT 'x'"
        );
    }

    #[test]
    fn test_too_few_params_is_an_error() {
        let q = query("SELECT ?, ?", vec![Value::from(1)]);
        assert_eq!(
            serialize_query(&q),
            Err(SerializeError::PlaceholderMismatch {
                placeholders: 2,
                params: 1
            })
        );
    }

    #[test]
    fn test_too_many_params_is_an_error() {
        let q = query("SELECT 1", vec![Value::from(1)]);
        assert_eq!(
            serialize_query(&q),
            Err(SerializeError::PlaceholderMismatch {
                placeholders: 0,
                params: 1
            })
        );
    }

    #[test]
    fn test_non_finite_real_is_rejected() {
        let q = query("SELECT ?", vec![Value::Real(f64::NAN)]);
        assert_eq!(
            serialize_query(&q),
            Err(SerializeError::NonFiniteReal { index: 0 })
        );
    }
}
