//! Database schema for focus points and infos

/// SQL schema for the store database
pub const SCHEMA_SQL: &str = r#"
-- User-defined topics to mine
CREATE TABLE IF NOT EXISTS focus_points (
    id TEXT PRIMARY KEY,
    keywords TEXT NOT NULL,
    explanation TEXT NOT NULL DEFAULT '',
    restrictions TEXT NOT NULL DEFAULT '',
    role TEXT NOT NULL DEFAULT '',
    purpose TEXT NOT NULL DEFAULT '',
    custom_schema TEXT NOT NULL DEFAULT '',
    field_types TEXT NOT NULL DEFAULT '{}',
    activated INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_focus_points_activated ON focus_points(activated);

-- Extracted information
CREATE TABLE IF NOT EXISTS infos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    focus_id TEXT NOT NULL,
    focus_statement TEXT NOT NULL,
    kind TEXT NOT NULL,
    content TEXT NOT NULL,
    refs TEXT NOT NULL DEFAULT '',
    source_url TEXT NOT NULL DEFAULT '',
    source_title TEXT NOT NULL DEFAULT '',
    created TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_infos_focus ON infos(focus_id);
CREATE INDEX IF NOT EXISTS idx_infos_source ON infos(source_url);
"#;

/// Initializes the store schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["focus_points", "infos"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
