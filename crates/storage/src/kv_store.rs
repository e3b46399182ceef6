use linkdrop_domain::storage::{
    path::{append, assign, lookup},
    KeyPath, KvStore, StorageResult,
};
use sea_orm::{sea_query::OnConflict, ConnectionTrait, EntityTrait, Set, TransactionTrait};
use serde_json::Value;
use tracing::debug;

use crate::entity::kv_entries;
use crate::errors::StorageError;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl KvStore for SeaOrmStorage {
    async fn get(&self, path: &KeyPath) -> StorageResult<Option<Value>> {
        let Some(document) = load_document(self.connection(), path.root()).await? else {
            return Ok(None);
        };
        Ok(lookup(&document, path.rest())
            .filter(|value| !value.is_null())
            .cloned())
    }

    async fn set(&self, path: &KeyPath, value: Value) -> StorageResult<()> {
        let _write = self.writes.lock().await;
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;
        let mut document = load_document(&txn, path.root()).await?.unwrap_or(Value::Null);
        assign(&mut document, path.rest(), value);
        store_document(&txn, path.root(), &document).await?;
        txn.commit().await.map_err(StorageError::from_source)?;
        debug!(path = %path, "value stored");
        Ok(())
    }

    async fn push(&self, path: &KeyPath, value: Value) -> StorageResult<()> {
        let _write = self.writes.lock().await;
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;
        let mut document = load_document(&txn, path.root()).await?.unwrap_or(Value::Null);
        if !append(&mut document, path.rest(), value) {
            return Err(StorageError::NotAnArray(path.to_string()));
        }
        store_document(&txn, path.root(), &document).await?;
        txn.commit().await.map_err(StorageError::from_source)?;
        debug!(path = %path, "value appended");
        Ok(())
    }
}

async fn load_document<C: ConnectionTrait>(conn: &C, key: &str) -> StorageResult<Option<Value>> {
    let maybe = kv_entries::Entity::find_by_id(key.to_owned())
        .one(conn)
        .await
        .map_err(StorageError::from_source)?;
    maybe
        .map(|model| serde_json::from_str(&model.value).map_err(StorageError::codec))
        .transpose()
}

async fn store_document<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    document: &Value,
) -> StorageResult<()> {
    let active = kv_entries::ActiveModel {
        key: Set(key.to_owned()),
        value: Set(document.to_string()),
    };
    kv_entries::Entity::insert(active)
        .on_conflict(
            OnConflict::column(kv_entries::Column::Key)
                .update_column(kv_entries::Column::Value)
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
