use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::model::Collection;

pub const SCHEMA_VERSION: i64 = 2;

pub fn open_db(db_path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    bootstrap(&conn)?;
    Ok(conn)
}

pub fn open_db_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    bootstrap(&conn)?;
    Ok(conn)
}

fn bootstrap(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // Every collection is a document table; filtering happens in memory.
    for c in Collection::ALL {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {}(
                    id TEXT PRIMARY KEY,
                    body TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                c.table()
            ),
            [],
        )?;
    }

    // v1 workspaces stored documents without timestamp columns.
    for c in Collection::ALL {
        ensure_timestamp_columns(conn, c.table())?;
    }

    settings_set_json(
        conn,
        "schema.version",
        &serde_json::json!({ "version": SCHEMA_VERSION }),
    )?;
    Ok(())
}

fn ensure_timestamp_columns(conn: &Connection, table: &str) -> anyhow::Result<()> {
    if !table_has_column(conn, table, "created_at")? {
        conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN created_at TEXT NOT NULL DEFAULT ''",
                table
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "UPDATE {} SET created_at = COALESCE(json_extract(body, '$.createdAt'), '')",
                table
            ),
            [],
        )?;
    }
    if !table_has_column(conn, table, "updated_at")? {
        conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN updated_at TEXT NOT NULL DEFAULT ''",
                table
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "UPDATE {} SET updated_at = COALESCE(json_extract(body, '$.updatedAt'), created_at)",
                table
            ),
            [],
        )?;
    }
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_creates_collection_tables() {
        let conn = open_db_in_memory().expect("open");
        for c in Collection::ALL {
            assert!(table_has_column(&conn, c.table(), "body").expect("pragma"));
            assert!(table_has_column(&conn, c.table(), "updated_at").expect("pragma"));
        }
        let v = settings_get_json(&conn, "schema.version")
            .expect("read")
            .expect("present");
        assert_eq!(v["version"], SCHEMA_VERSION);
    }

    #[test]
    fn v1_tables_gain_timestamp_columns() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE students(id TEXT PRIMARY KEY, body TEXT NOT NULL)",
            [],
        )
        .expect("create v1");
        conn.execute(
            "INSERT INTO students(id, body) VALUES('s1', '{\"createdAt\":\"2025-01-01T00:00:00Z\"}')",
            [],
        )
        .expect("insert");
        bootstrap(&conn).expect("migrate");
        let (created, updated): (String, String) = conn
            .query_row(
                "SELECT created_at, updated_at FROM students WHERE id = 's1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .expect("row");
        assert_eq!(created, "2025-01-01T00:00:00Z");
        assert_eq!(updated, "2025-01-01T00:00:00Z");
    }
}
