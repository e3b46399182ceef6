use linkdrop_domain::{storage::StorageResult, StoreConfig};
use sea_orm::{ConnectOptions, Database};

use crate::{errors::StorageError, schema::ensure_schema, SeaOrmStorage};

#[derive(Default)]
pub struct StorageBuilder {
    database_url: Option<String>,
    max_connections: Option<u32>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self {
            database_url: None,
            max_connections: None,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            database_url: Some(config.database_url().to_string()),
            max_connections: config.max_connections(),
        }
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    pub async fn build(self) -> StorageResult<SeaOrmStorage> {
        let url = self
            .database_url
            .ok_or_else(|| StorageError::Database("missing database url".into()))?;
        let mut options = ConnectOptions::new(url);
        if let Some(max_connections) = self.max_connections {
            options.max_connections(max_connections);
        }
        let db = Database::connect(options)
            .await
            .map_err(StorageError::from_source)?;
        ensure_schema(&db).await?;
        Ok(SeaOrmStorage::from_connection(db))
    }
}
