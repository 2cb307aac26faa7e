//! Forum host services backed by the SQLite database

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use forum_sso_auth::{AuthError, GroupDirectory, ObjectStore, UserDirectory};

use crate::database::DbConnection;

fn db_error(e: rusqlite::Error) -> AuthError {
    AuthError::HostError(format!("database error: {}", e))
}

fn username_taken(conn: &Connection, candidate: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT 1 FROM user_fields WHERE field = 'username' AND value = ?1 COLLATE NOCASE",
        params![candidate],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

/// Append " 1", " 2", ... until the name is free
fn unique_username(conn: &Connection, wanted: &str) -> Result<String, rusqlite::Error> {
    if !username_taken(conn, wanted)? {
        return Ok(wanted.to_string());
    }
    let mut suffix = 1;
    loop {
        let candidate = format!("{} {}", wanted, suffix);
        if !username_taken(conn, &candidate)? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

#[derive(Clone)]
pub struct SqliteHost {
    db: DbConnection,
}

impl SqliteHost {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for SqliteHost {
    async fn create_user(&self, username: &str) -> Result<u64, AuthError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction().map_err(db_error)?;

        let username = unique_username(&tx, username).map_err(db_error)?;
        tx.execute(
            "INSERT INTO users (joindate) VALUES (strftime('%s', 'now'))",
            [],
        )
        .map_err(db_error)?;
        let uid = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO user_fields (uid, field, value) VALUES (?1, 'username', ?2)",
            params![uid, username],
        )
        .map_err(db_error)?;

        tx.commit().map_err(db_error)?;
        tracing::debug!(uid, username = %username, "Created user");
        Ok(uid as u64)
    }

    async fn get_user_field(&self, uid: u64, field: &str) -> Result<Option<String>, AuthError> {
        let conn = self.db.lock().await;
        conn.query_row(
            "SELECT value FROM user_fields WHERE uid = ?1 AND field = ?2",
            params![uid as i64, field],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)
    }

    async fn set_user_field(&self, uid: u64, field: &str, value: &str) -> Result<(), AuthError> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO user_fields (uid, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(uid, field) DO UPDATE SET value = excluded.value",
            params![uid as i64, field, value],
        )
        .map_err(db_error)?;
        Ok(())
    }

    async fn set_user_fields(
        &self,
        uid: u64,
        fields: &HashMap<String, String>,
    ) -> Result<(), AuthError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction().map_err(db_error)?;
        for (field, value) in fields {
            tx.execute(
                "INSERT INTO user_fields (uid, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(uid, field) DO UPDATE SET value = excluded.value",
                params![uid as i64, field, value],
            )
            .map_err(db_error)?;
        }
        tx.commit().map_err(db_error)
    }

    async fn delete_user_field(&self, uid: u64, field: &str) -> Result<(), AuthError> {
        let conn = self.db.lock().await;
        conn.execute(
            "DELETE FROM user_fields WHERE uid = ?1 AND field = ?2",
            params![uid as i64, field],
        )
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_uid_by_email(&self, email: &str) -> Result<Option<u64>, AuthError> {
        let conn = self.db.lock().await;
        let uid: Option<i64> = conn
            .query_row(
                "SELECT uid FROM user_fields WHERE field = 'email' AND value = ?1 COLLATE NOCASE
                 ORDER BY uid LIMIT 1",
                params![email],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        Ok(uid.map(|uid| uid as u64))
    }

    async fn confirm_email(&self, uid: u64) -> Result<(), AuthError> {
        self.set_user_field(uid, "email:confirmed", "1").await
    }
}

#[async_trait]
impl ObjectStore for SqliteHost {
    async fn get_object_field(&self, key: &str, field: &str) -> Result<Option<String>, AuthError> {
        let conn = self.db.lock().await;
        conn.query_row(
            "SELECT value FROM objects WHERE key = ?1 AND field = ?2",
            params![key, field],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)
    }

    async fn set_object_field(&self, key: &str, field: &str, value: &str) -> Result<(), AuthError> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO objects (key, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
            params![key, field, value],
        )
        .map_err(db_error)?;
        Ok(())
    }

    async fn delete_object_field(&self, key: &str, field: &str) -> Result<(), AuthError> {
        let conn = self.db.lock().await;
        conn.execute(
            "DELETE FROM objects WHERE key = ?1 AND field = ?2",
            params![key, field],
        )
        .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl GroupDirectory for SqliteHost {
    async fn join(&self, groups: &[String], uid: u64) -> Result<(), AuthError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction().map_err(db_error)?;
        for group in groups {
            tx.execute(
                "INSERT OR IGNORE INTO groups (name, created_at) VALUES (?1, strftime('%s', 'now'))",
                params![group],
            )
            .map_err(db_error)?;
            tx.execute(
                "INSERT OR IGNORE INTO group_members (group_id, uid)
                 SELECT id, ?2 FROM groups WHERE name = ?1",
                params![group, uid as i64],
            )
            .map_err(db_error)?;
        }
        tx.commit().map_err(db_error)
    }

    async fn leave(&self, groups: &[String], uid: u64) -> Result<(), AuthError> {
        let mut conn = self.db.lock().await;
        let tx = conn.transaction().map_err(db_error)?;
        for group in groups {
            tx.execute(
                "DELETE FROM group_members
                 WHERE uid = ?2 AND group_id IN (SELECT id FROM groups WHERE name = ?1)",
                params![group, uid as i64],
            )
            .map_err(db_error)?;
        }
        tx.commit().map_err(db_error)
    }

    async fn list_groups(&self) -> Result<Vec<String>, AuthError> {
        let conn = self.db.lock().await;
        let mut stmt = conn
            .prepare("SELECT name FROM groups ORDER BY created_at, id")
            .map_err(db_error)?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(db_error)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(db_error)?;
        Ok(names)
    }

    async fn members(&self, group: &str) -> Result<Vec<u64>, AuthError> {
        let conn = self.db.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT m.uid FROM group_members m JOIN groups g ON g.id = m.group_id
                 WHERE g.name = ?1 ORDER BY m.uid",
            )
            .map_err(db_error)?;
        let uids = stmt
            .query_map(params![group], |row| row.get::<_, i64>(0))
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        Ok(uids.into_iter().map(|uid| uid as u64).collect())
    }
}
