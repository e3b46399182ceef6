pub(crate) use linkdrop_domain::storage::StorageError;
