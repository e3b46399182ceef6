//! SeaORM-backed implementation of the domain `KvStore`. Each top-level key is
//! one row holding a JSON document; nested paths are resolved inside that
//! document. SQLite is the default backend.

mod builder;
mod entity;
mod errors;
mod kv_store;
mod schema;


use std::sync::Arc;

use linkdrop_domain::{storage::StorageResult, StoreConfig};
use sea_orm::DatabaseConnection;
use tokio::sync::Mutex;

pub use builder::StorageBuilder;

/// Shared store handle; clones share one connection pool.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
    /// Every server lives in the same `servers` row, so read-modify-write
    /// cycles are serialized per handle whatever the pool size.
    writes: Arc<Mutex<()>>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the table is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::builder().database_url(database_url).build().await
    }

    pub async fn connect_with(config: &StoreConfig) -> StorageResult<Self> {
        StorageBuilder::from_config(config).build().await
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self {
            db: Arc::new(db),
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}
