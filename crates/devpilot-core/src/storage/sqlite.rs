use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db::Database;

use super::{Collection, StorageError, StoragePort};

/// Durable storage port backed by the SQLite `collections` table.
///
/// Each collection is one row; `save` is a single upsert statement so the
/// previous payload stays visible until the new one is committed.
#[derive(Clone)]
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StoragePort for SqliteStorage {
    async fn load(&self, collection: Collection) -> Result<Option<serde_json::Value>, StorageError> {
        let name = collection.as_str();
        let payload: Option<String> = self
            .db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT payload FROM collections WHERE name = ?1",
                    rusqlite::params![name],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        payload
            .map(|p| {
                serde_json::from_str(&p).map_err(|e| StorageError::Serialization {
                    collection: name.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    async fn save(&self, collection: Collection, value: serde_json::Value) -> Result<(), StorageError> {
        let name = collection.as_str();
        let payload = serde_json::to_string(&value).map_err(|e| StorageError::Serialization {
            collection: name.to_string(),
            message: e.to_string(),
        })?;
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO collections (name, payload, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(name) DO UPDATE SET
                       payload = excluded.payload,
                       updated_at = excluded.updated_at",
                    rusqlite::params![name, payload, now],
                )?;
                Ok(())
            })
            .await
    }
}
