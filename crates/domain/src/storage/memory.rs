use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde_json::Value;

use super::path::{append, assign, lookup, KeyPath};
use super::traits::{KvStore, StorageError, StorageResult};

/// Process-local store keeping one JSON document per root segment.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKvStore {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the whole document stored under `root`.
    pub fn snapshot(&self, root: &str) -> Option<Value> {
        let guard = self.entries.read().expect("kv lock poisoned");
        guard.get(root).cloned()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, path: &KeyPath) -> StorageResult<Option<Value>> {
        let guard = self.entries.read().expect("kv lock poisoned");
        Ok(guard
            .get(path.root())
            .and_then(|document| lookup(document, path.rest()))
            .filter(|value| !value.is_null())
            .cloned())
    }

    async fn set(&self, path: &KeyPath, value: Value) -> StorageResult<()> {
        let mut guard = self.entries.write().expect("kv lock poisoned");
        let document = guard.entry(path.root().to_owned()).or_insert(Value::Null);
        assign(document, path.rest(), value);
        Ok(())
    }

    async fn push(&self, path: &KeyPath, value: Value) -> StorageResult<()> {
        let mut guard = self.entries.write().expect("kv lock poisoned");
        let document = guard.entry(path.root().to_owned()).or_insert(Value::Null);
        if append(document, path.rest(), value) {
            Ok(())
        } else {
            Err(StorageError::NotAnArray(path.to_string()))
        }
    }
}
