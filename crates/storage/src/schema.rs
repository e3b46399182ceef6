use sea_orm::sea_query::{ColumnDef, Table};
use sea_orm::{ConnectionTrait, DatabaseConnection};

use crate::entity::kv_entries;
use crate::errors::StorageError;
use linkdrop_domain::storage::StorageResult;

/// Creates the key/value table when it is missing.
pub async fn ensure_schema(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let entries_table = Table::create()
        .if_not_exists()
        .table(kv_entries::Entity)
        .col(
            ColumnDef::new(kv_entries::Column::Key)
                .string_len(255)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(kv_entries::Column::Value).text().not_null())
        .to_owned();

    db.execute(backend.build(&entries_table))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
