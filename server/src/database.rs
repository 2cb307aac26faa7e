//! SQLite storage for the forum records the sign-on layer reads and writes
//!
//! Holds user fields, hash-style objects (identity links) and group
//! membership.

use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Thread-safe database connection type
pub type DbConnection = Arc<Mutex<Connection>>;

/// Open (or create) the database at `db_path` and apply the schema
pub fn init_database(db_path: &Path) -> Result<DbConnection, Box<dyn std::error::Error + Send + Sync>> {
    let conn = Connection::open(db_path)?;

    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // journal_mode returns a row, so it cannot go through execute()
    conn.pragma_update(None, "journal_mode", "WAL")?;

    let schema_sql = include_str!("../migrations/001_forum_schema.sql");
    conn.execute_batch(schema_sql)?;

    Ok(Arc::new(Mutex::new(conn)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_database_initialization() {
        let temp_file = NamedTempFile::new().unwrap();
        let db = init_database(temp_file.path()).unwrap();

        let conn = db.lock().await;
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for table in ["users", "user_fields", "objects", "groups", "group_members"] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let temp_file = NamedTempFile::new().unwrap();
        let db = init_database(temp_file.path()).unwrap();
        let conn = db.lock().await;

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);
    }

    #[tokio::test]
    async fn test_reopen_keeps_builtin_groups_unique() {
        let temp_file = NamedTempFile::new().unwrap();
        init_database(temp_file.path()).unwrap();
        let db = init_database(temp_file.path()).unwrap();
        let conn = db.lock().await;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM groups WHERE name = 'registered-users'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
