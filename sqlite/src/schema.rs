//! Scratch table generation from declared tables.
//!
//! Trigger declarations only know column names, so scratch tables are
//! created with typeless columns. SQLite accepts any value in them, which is
//! enough for triggers to compile and fire.

use trigger_migrate_core::{Table, quote_identifier};

use crate::error::{Result, SqliteError};

/// Generates `CREATE TABLE IF NOT EXISTS` statements for `tables`.
///
/// # Errors
///
/// Returns [`SqliteError::EmptyTable`] for a table without columns.
pub fn generate_schema_sql<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Result<String> {
    let mut sql = String::new();
    for table in tables {
        if table.columns.is_empty() {
            return Err(SqliteError::EmptyTable(table.name.clone()));
        }
        let columns: Vec<String> = table.columns.iter().map(|c| quote_identifier(c)).collect();
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({});\n",
            quote_identifier(&table.name),
            columns.join(", ")
        ));
    }
    Ok(sql)
}

/// Generates `DROP TABLE IF EXISTS` statements for `tables`, in reverse order.
pub fn generate_drop_sql<'a>(tables: impl IntoIterator<Item = &'a Table>) -> String {
    let mut drops: Vec<String> = tables
        .into_iter()
        .map(|t| format!("DROP TABLE IF EXISTS {};\n", quote_identifier(&t.name)))
        .collect();
    drops.reverse();
    drops.concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_schema_sql_quotes_names() {
        let tables = [
            Table::new("papers", ["paper_id", "paper_title"]),
            Table::new("odd\"name", ["order"]),
        ];
        let sql = generate_schema_sql(&tables).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"papers\" (\"paper_id\", \"paper_title\");\n\
             CREATE TABLE IF NOT EXISTS \"odd\"\"name\" (\"order\");\n"
        );
    }

    #[test]
    fn test_generate_schema_sql_rejects_empty_table() {
        let tables = [Table::new("bare", Vec::<String>::new())];
        assert!(matches!(
            generate_schema_sql(&tables),
            Err(SqliteError::EmptyTable(ref t)) if t == "bare"
        ));
    }

    #[test]
    fn test_generated_schema_executes() {
        let tables = [Table::new("logs", ["id", "msg"])];
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&generate_schema_sql(&tables).unwrap()).unwrap();
        conn.execute("INSERT INTO logs (id, msg) VALUES (1, 'x')", []).unwrap();
        conn.execute_batch(&generate_drop_sql(&tables)).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
