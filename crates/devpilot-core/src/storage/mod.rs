//! Storage port — pluggable persistence for workflow collections.
//!
//! Stores keep their records in memory and write the whole collection through
//! a [`StoragePort`] on every mutation. Implementations must make each
//! `save` atomic: a reader never observes a partially-written collection.
//!
//! - [`MemoryStorage`] — process-local, used by tests and ephemeral sessions
//! - [`SqliteStorage`] — durable, backed by the SQLite [`Database`](crate::db::Database)

mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

pub use sqlite::SqliteStorage;

/// Named collections persisted through the storage port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Workflows,
    ScheduledWorkflows,
    /// Ids of built-in workflows the user deleted
    DeletedBuiltins,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workflows => "workflows",
            Self::ScheduledWorkflows => "scheduled_workflows",
            Self::DeletedBuiltins => "deleted_builtins",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("failed to (de)serialize collection '{collection}': {message}")]
    Serialization { collection: String, message: String },
}

/// Read/write access to whole collections.
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Load a collection. `None` when it has never been saved.
    async fn load(&self, collection: Collection) -> Result<Option<serde_json::Value>, StorageError>;

    /// Replace a collection atomically.
    async fn save(&self, collection: Collection, value: serde_json::Value) -> Result<(), StorageError>;
}

/// In-memory storage port.
#[derive(Default)]
pub struct MemoryStorage {
    collections: RwLock<HashMap<Collection, serde_json::Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoragePort for MemoryStorage {
    async fn load(&self, collection: Collection) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.collections.read().await.get(&collection).cloned())
    }

    async fn save(&self, collection: Collection, value: serde_json::Value) -> Result<(), StorageError> {
        self.collections.write().await.insert(collection, value);
        Ok(())
    }
}

/// Decode a stored collection into records, treating a missing collection as empty.
pub(crate) fn decode_collection<T: serde::de::DeserializeOwned>(
    collection: Collection,
    value: Option<serde_json::Value>,
) -> Result<Vec<T>, StorageError> {
    match value {
        None => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v).map_err(|e| StorageError::Serialization {
            collection: collection.as_str().to_string(),
            message: e.to_string(),
        }),
    }
}

/// Encode records for [`StoragePort::save`].
pub(crate) fn encode_collection<T: serde::Serialize>(
    collection: Collection,
    records: &[T],
) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(records).map_err(|e| StorageError::Serialization {
        collection: collection.as_str().to_string(),
        message: e.to_string(),
    })
}
