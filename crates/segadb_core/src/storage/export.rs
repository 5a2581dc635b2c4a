//! One-way table exports to CSV, JSON, and SQLite.

use crate::error::{DbError, DbResult};
use crate::table::Table;
use rusqlite::params_from_iter;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

/// Target format for [`save_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Delimited text with a header row.
    Csv,
    /// Pretty-printed `{columns, records}` JSON.
    Json,
    /// A single-table SQLite file with all-text columns.
    Sqlite,
}

/// Writes a table to a file in the chosen format.
pub fn save_table(table: &Table, path: impl AsRef<Path>, format: TableFormat) -> DbResult<()> {
    match format {
        TableFormat::Csv => table_to_csv(table, path.as_ref()),
        TableFormat::Json => table_to_json(table, path.as_ref()),
        TableFormat::Sqlite => table_to_sqlite(table, path.as_ref()),
    }
}

/// CSV export: header row of declared columns, one row per record.
/// String values are written raw, nulls as empty fields, everything
/// else in its JSON text form.
pub fn table_to_csv(table: &Table, path: &Path) -> DbResult<()> {
    let mut writer = ::csv::Writer::from_path(path)
        .map_err(|e| DbError::invalid_operation(format!("csv writer: {e}")))?;
    writer
        .write_record(table.columns())
        .map_err(|e| DbError::invalid_operation(format!("csv header: {e}")))?;
    for record in table.records() {
        let row: Vec<String> = table
            .columns()
            .iter()
            .map(|col| value_to_plain(&record.get_or_null(col)))
            .collect();
        writer
            .write_record(&row)
            .map_err(|e| DbError::invalid_operation(format!("csv row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| DbError::invalid_operation(format!("csv flush: {e}")))?;
    Ok(())
}

/// JSON export: `{"columns": [...], "records": [{"id": n, ...data}]}`.
pub fn table_to_json(table: &Table, path: &Path) -> DbResult<()> {
    let records: Vec<Value> = table
        .records()
        .iter()
        .map(|r| {
            let mut obj = serde_json::Map::new();
            obj.insert("id".to_string(), json!(r.id()));
            for (k, v) in r.data() {
                obj.insert(k.clone(), v.clone());
            }
            Value::Object(obj)
        })
        .collect();
    let doc = json!({
        "columns": table.columns(),
        "records": records,
    });
    let text = serde_json::to_string_pretty(&doc)
        .map_err(|e| DbError::invalid_operation(format!("json export: {e}")))?;
    fs::write(path, text)?;
    Ok(())
}

/// SQLite export: a fresh single-table file, every column TEXT plus an
/// INTEGER PRIMARY KEY id. An existing file at the path is replaced.
pub fn table_to_sqlite(table: &Table, path: &Path) -> DbResult<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let conn = rusqlite::Connection::open(path)
        .map_err(|e| DbError::invalid_operation(format!("sqlite open: {e}")))?;

    let column_defs: Vec<String> = table
        .columns()
        .iter()
        .map(|c| format!("\"{}\" TEXT", c.replace('"', "\"\"")))
        .collect();
    let create = format!(
        "CREATE TABLE \"{}\" (id INTEGER PRIMARY KEY, {})",
        table.name().replace('"', "\"\""),
        column_defs.join(", ")
    );
    conn.execute(&create, [])
        .map_err(|e| DbError::invalid_operation(format!("sqlite create: {e}")))?;

    let placeholders: Vec<String> = (1..=table.columns().len() + 1)
        .map(|i| format!("?{i}"))
        .collect();
    let insert = format!(
        "INSERT INTO \"{}\" VALUES ({})",
        table.name().replace('"', "\"\""),
        placeholders.join(", ")
    );
    let mut stmt = conn
        .prepare(&insert)
        .map_err(|e| DbError::invalid_operation(format!("sqlite prepare: {e}")))?;

    for record in table.records() {
        let mut row: Vec<Option<String>> = vec![Some(record.id().to_string())];
        for col in table.columns() {
            let value = record.get_or_null(col);
            row.push(match value {
                Value::Null => None,
                other => Some(value_to_plain(&other)),
            });
        }
        stmt.execute(params_from_iter(row))
            .map_err(|e| DbError::invalid_operation(format!("sqlite insert: {e}")))?;
    }
    Ok(())
}

fn value_to_plain(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordData;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_table() -> Table {
        let mut t = Table::new("people", vec!["name".into(), "age".into()]);
        for (name, age) in [("ada", json!(36)), ("bob", Value::Null)] {
            let mut data = RecordData::new();
            data.insert("name".into(), json!(name));
            data.insert("age".into(), age);
            t.insert(data).unwrap();
        }
        t
    }

    #[test]
    fn csv_export_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.csv");
        table_to_csv(&sample_table(), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name,age");
        assert_eq!(lines[1], "ada,36");
        // null becomes an empty field
        assert_eq!(lines[2], "bob,");
    }

    #[test]
    fn json_export_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.json");
        table_to_json(&sample_table(), &path).unwrap();
        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["columns"], json!(["name", "age"]));
        assert_eq!(doc["records"][0]["id"], json!(1));
        assert_eq!(doc["records"][0]["name"], json!("ada"));
        assert_eq!(doc["records"][1]["age"], Value::Null);
    }

    #[test]
    fn sqlite_export_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.sqlite");
        table_to_sqlite(&sample_table(), &path).unwrap();

        let conn = rusqlite::Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
        let name: String = conn
            .query_row("SELECT name FROM people WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "ada");
        let age: Option<String> = conn
            .query_row("SELECT age FROM people WHERE id = 2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(age, None);

        // re-export replaces the existing file
        table_to_sqlite(&sample_table(), &path).unwrap();
    }

    #[test]
    fn save_table_dispatches() {
        let dir = tempdir().unwrap();
        let t = sample_table();
        save_table(&t, dir.path().join("a.csv"), TableFormat::Csv).unwrap();
        save_table(&t, dir.path().join("a.json"), TableFormat::Json).unwrap();
        save_table(&t, dir.path().join("a.sqlite"), TableFormat::Sqlite).unwrap();
    }
}
