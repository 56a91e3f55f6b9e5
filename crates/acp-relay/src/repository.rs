//! Key/value persistence for payments and jobs.
//!
//! Records are opaque JSON documents addressed by id, grouped by collection
//! (e.g. `payments`, `jobs`).

use dashmap::DashMap;
use serde_json::Value;

use crate::error::RelayError;

pub trait Repository: Send + Sync {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RelayError>;

    /// Insert or replace the record.
    fn put(&self, collection: &str, id: &str, value: &Value) -> Result<(), RelayError>;
}

/// Repository held in memory. Lost on restart.
#[derive(Default)]
pub struct InMemoryRepository {
    records: DashMap<(String, String), Value>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for InMemoryRepository {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RelayError> {
        Ok(self
            .records
            .get(&(collection.to_string(), id.to_string()))
            .map(|v| v.value().clone()))
    }

    fn put(&self, collection: &str, id: &str, value: &Value) -> Result<(), RelayError> {
        self.records
            .insert((collection.to_string(), id.to_string()), value.clone());
        Ok(())
    }
}

/// Repository backed by SQLite.
#[cfg(feature = "full")]
pub struct SqliteRepository {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

#[cfg(feature = "full")]
impl SqliteRepository {
    /// Open (or create) the database at `path`, restricted to 0600 on Unix.
    pub fn open(path: &str) -> Result<Self, RelayError> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| RelayError::StorageError(format!("open {path}: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            );
            PRAGMA journal_mode=WAL;",
        )
        .map_err(|e| RelayError::StorageError(format!("schema: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "failed to set repository file permissions to 0600"
                );
            }
        }

        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => {
                tracing::error!("repository mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(feature = "full")]
impl Repository for SqliteRepository {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RelayError> {
        use rusqlite::OptionalExtension;

        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM records WHERE collection = ?1 AND id = ?2",
                [collection, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RelayError::StorageError(e.to_string()))?;
        raw.map(|s| serde_json::from_str(&s).map_err(RelayError::from))
            .transpose()
    }

    fn put(&self, collection: &str, id: &str, value: &Value) -> Result<(), RelayError> {
        let json = serde_json::to_string(value)?;
        self.conn()
            .execute(
                "INSERT INTO records (collection, id, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, id)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![collection, id, json, chrono::Utc::now().timestamp()],
            )
            .map_err(|e| RelayError::StorageError(e.to_string()))?;
        Ok(())
    }
}
