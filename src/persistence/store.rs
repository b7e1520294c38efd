//! Record store abstraction
//!
//! A key-value view over two collections of JSON records. The engine only
//! needs get/put/delete/entries/flush; backends decide where bytes go.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {collection}/{key}")]
    NotFound { collection: Collection, key: String },

    #[error("Corrupted collection file {}: {source}", .path.display())]
    Corrupted {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },

    #[error("Store was opened read-only")]
    ReadOnly,
}

/// Record collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Deals,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Users, Collection::Deals];

    /// File stem used by file-backed stores
    pub fn file_stem(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Deals => "deals",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Persistent record store
pub trait Store: Send {
    /// Fetch one record
    fn get(&self, collection: Collection, key: &str) -> StoreResult<Value>;

    /// Insert or replace one record
    fn put(&mut self, collection: Collection, key: &str, value: Value) -> StoreResult<()>;

    /// Remove one record; removing a missing key is not an error
    fn delete(&mut self, collection: Collection, key: &str) -> StoreResult<()>;

    /// All records of a collection, ordered by key
    fn entries(&self, collection: Collection) -> StoreResult<Vec<(String, Value)>>;

    /// Make pending writes durable
    fn flush(&mut self) -> StoreResult<()>;
}

/// In-memory store (tests and `--ephemeral` runs)
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    collections: HashMap<Collection, BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.collections.get(&collection).map_or(0, |c| c.len())
    }
}

impl Store for MemoryStore {
    fn get(&self, collection: Collection, key: &str) -> StoreResult<Value> {
        self.collections
            .get(&collection)
            .and_then(|c| c.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection,
                key: key.to_string(),
            })
    }

    fn put(&mut self, collection: Collection, key: &str, value: Value) -> StoreResult<()> {
        self.collections
            .entry(collection)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, collection: Collection, key: &str) -> StoreResult<()> {
        if let Some(c) = self.collections.get_mut(&collection) {
            c.remove(key);
        }
        Ok(())
    }

    fn entries(&self, collection: Collection) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .collections
            .get(&collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn flush(&mut self) -> StoreResult<()> {
        Ok(())
    }
}
