use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::path::KeyPath;

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("malformed document: {0}")]
    Codec(String),
    #[error("value at `{0}` is not an array")]
    NotAnArray(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }

    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Path-addressable JSON store consumed by the registry.
///
/// `get` treats a stored `null` as absent. `push` must be atomic with respect
/// to other writes on the same store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, path: &KeyPath) -> StorageResult<Option<Value>>;
    async fn set(&self, path: &KeyPath, value: Value) -> StorageResult<()>;
    async fn push(&self, path: &KeyPath, value: Value) -> StorageResult<()>;
}
