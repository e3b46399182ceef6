//! Server registry: typed operations over the `servers` document of a
//! [`KvStore`].
//!
//! Every server lives at `servers.<id>`; its link lists at
//! `servers.<id>.proxies.<type>` and its users at `servers.<id>.users.<user>`.
//! A server whose record is missing or an empty object counts as absent.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use metrics::counter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::model::{
    validate_link, validate_link_type, LinkFormatError, ServerId, ServerRecord, UserId,
    UserRecord, DEFAULT_LIMIT,
};
use crate::storage::{KeyPath, KvStore, StorageError};

/// Root entry holding every server record.
pub const SERVERS_ROOT: &str = "servers";

/// Counter of catalog rejections, labelled by `reason`.
pub const REJECTIONS_METRIC: &str = "registry_rejections_total";
/// Counter of server records created or removed, labelled by `event`.
pub const SERVERS_METRIC: &str = "registry_servers_total";

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Failures returned by registry operations. All variants except `Storage`
/// carry the user-facing message shown to whoever issued the command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid link type.")]
    InvalidLinkType,
    #[error("Invalid link.")]
    InvalidLink,
    #[error("Server not found, please contact support.")]
    ServerNotFound,
    #[error("Link already exists.")]
    LinkAlreadyExists,
    #[error("Link does not exist.")]
    LinkDoesNotExist,
    #[error("No links found.")]
    NoLinksFound,
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl RegistryError {
    /// `true` for catalog failures, `false` for storage errors.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, RegistryError::Storage(_))
    }

    fn reason(&self) -> &'static str {
        match self {
            RegistryError::InvalidLinkType => "invalid_link_type",
            RegistryError::InvalidLink => "invalid_link",
            RegistryError::ServerNotFound => "server_not_found",
            RegistryError::LinkAlreadyExists => "link_already_exists",
            RegistryError::LinkDoesNotExist => "link_does_not_exist",
            RegistryError::NoLinksFound => "no_links_found",
            RegistryError::Storage(_) => "storage",
        }
    }
}

impl From<LinkFormatError> for RegistryError {
    fn from(err: LinkFormatError) -> Self {
        match err {
            LinkFormatError::ReservedType => RegistryError::InvalidLinkType,
            LinkFormatError::NotAUrl => RegistryError::InvalidLink,
        }
    }
}

/// Facade translating server/user/link operations into store paths.
///
/// Mutations on the same server are serialized through a per-server lock, so
/// read-then-write sequences do not lose updates within one process.
pub struct ServerRegistry<S> {
    store: S,
    /// Idle entries are pruned each time a lock is taken.
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl<S: Clone> Clone for ServerRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S: KvStore> ServerRegistry<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates the server record unless a live one exists. Returns whether a
    /// record was written.
    pub async fn add_server(&self, id: &ServerId) -> RegistryResult<bool> {
        let _guard = self.lock(id).await;
        if self.server_exists(id).await? {
            return Ok(false);
        }
        self.store
            .set(&server_path(id), encode(&ServerRecord::default())?)
            .await?;
        counter!(SERVERS_METRIC, "event" => "created").increment(1);
        info!(server = id.as_str(), "server record created");
        Ok(true)
    }

    /// Overwrites a live server record with an empty object. Returns whether
    /// anything was removed.
    pub async fn remove_server(&self, id: &ServerId) -> RegistryResult<bool> {
        let _guard = self.lock(id).await;
        if !self.server_exists(id).await? {
            return Ok(false);
        }
        self.store
            .set(&server_path(id), Value::Object(Default::default()))
            .await?;
        counter!(SERVERS_METRIC, "event" => "removed").increment(1);
        info!(server = id.as_str(), "server record removed");
        Ok(true)
    }

    /// Returns `None` when the server is absent. A user that was never stored
    /// reads as the default record; nothing is written.
    pub async fn get_user(
        &self,
        id: &ServerId,
        user: &UserId,
    ) -> RegistryResult<Option<UserRecord>> {
        if !self.server_exists(id).await? {
            return Ok(None);
        }
        Ok(Some(self.load_user(id, user).await?))
    }

    /// Replaces the user record verbatim.
    pub async fn set_user(
        &self,
        id: &ServerId,
        user: &UserId,
        record: &UserRecord,
    ) -> RegistryResult<()> {
        let _guard = self.lock(id).await;
        self.require_server(id).await?;
        self.store.set(&user_path(id, user), encode(record)?).await?;
        debug!(server = id.as_str(), user = user.as_str(), "user record stored");
        Ok(())
    }

    /// Stored limit, or [`DEFAULT_LIMIT`] for absent servers and records
    /// without one.
    pub async fn get_limit(&self, id: &ServerId) -> RegistryResult<i64> {
        if !self.server_exists(id).await? {
            return Ok(DEFAULT_LIMIT);
        }
        let stored = self.store.get(&server_path(id).child("limit")).await?;
        Ok(stored.map(decode).transpose()?.unwrap_or(DEFAULT_LIMIT))
    }

    pub async fn set_limit(&self, id: &ServerId, limit: i64) -> RegistryResult<()> {
        let _guard = self.lock(id).await;
        self.require_server(id).await?;
        self.store
            .set(&server_path(id).child("limit"), Value::from(limit))
            .await?;
        debug!(server = id.as_str(), limit, "limit stored");
        Ok(())
    }

    /// Zeroes `count` for one user, or for every stored user when `user` is
    /// `None`. Resetting a single user that was never stored persists the
    /// default record.
    pub async fn reset(&self, id: &ServerId, user: Option<&UserId>) -> RegistryResult<()> {
        let _guard = self.lock(id).await;
        self.require_server(id).await?;

        if let Some(user) = user {
            let mut record = self.load_user(id, user).await?;
            record.count = 0;
            self.store.set(&user_path(id, user), encode(&record)?).await?;
            debug!(server = id.as_str(), user = user.as_str(), "user count reset");
            return Ok(());
        }

        let users_path = server_path(id).child("users");
        let mut users = match self.store.get(&users_path).await? {
            Some(Value::Object(users)) => users,
            Some(other) => {
                return Err(StorageError::codec(format!(
                    "expected an object at `{users_path}`, found {other}"
                ))
                .into())
            }
            None => Default::default(),
        };
        for record in users.values_mut() {
            if let Some(fields) = record.as_object_mut() {
                fields.insert("count".to_owned(), Value::from(0));
            }
        }
        let total = users.len();
        self.store.set(&users_path, Value::Object(users)).await?;
        debug!(server = id.as_str(), users = total, "all user counts reset");
        Ok(())
    }

    pub async fn add_link(
        &self,
        id: &ServerId,
        link_type: &str,
        link: &str,
    ) -> RegistryResult<()> {
        validate_link_type(link_type)
            .and_then(|_| validate_link(link))
            .map_err(|err| rejected(err.into()))?;

        let _guard = self.lock(id).await;
        self.require_server(id).await?;
        let path = links_path(id, link_type);
        let links = self.load_links(&path).await?;
        if links.iter().any(|existing| existing == link) {
            return Err(rejected(RegistryError::LinkAlreadyExists));
        }
        self.store.push(&path, Value::from(link)).await?;
        debug!(server = id.as_str(), link_type, "link added");
        Ok(())
    }

    /// Removes every exact match of `link` from the list.
    pub async fn remove_link(
        &self,
        id: &ServerId,
        link_type: &str,
        link: &str,
    ) -> RegistryResult<()> {
        let _guard = self.lock(id).await;
        self.require_server(id).await?;
        let path = links_path(id, link_type);
        let links = self.load_links(&path).await?;
        if !links.iter().any(|existing| existing == link) {
            return Err(rejected(RegistryError::LinkDoesNotExist));
        }
        let remaining: Vec<String> = links.into_iter().filter(|l| l != link).collect();
        self.store.set(&path, encode(&remaining)?).await?;
        debug!(server = id.as_str(), link_type, "link removed");
        Ok(())
    }

    /// Link types holding at least one link, in insertion order.
    pub async fn get_types(&self, id: &ServerId) -> RegistryResult<Vec<String>> {
        self.require_server(id).await?;
        let proxies = self.store.get(&server_path(id).child("proxies")).await?;
        let Some(Value::Object(proxies)) = proxies else {
            return Ok(Vec::new());
        };
        Ok(proxies
            .into_iter()
            .filter(|(_, links)| links.as_array().is_some_and(|links| !links.is_empty()))
            .map(|(link_type, _)| link_type)
            .collect())
    }

    pub async fn get_links(&self, id: &ServerId, link_type: &str) -> RegistryResult<Vec<String>> {
        self.require_server(id).await?;
        let links = self.load_links(&links_path(id, link_type)).await?;
        if links.is_empty() {
            return Err(rejected(RegistryError::NoLinksFound));
        }
        Ok(links)
    }

    async fn server_exists(&self, id: &ServerId) -> RegistryResult<bool> {
        let record = self.store.get(&server_path(id)).await?;
        Ok(matches!(record, Some(Value::Object(fields)) if !fields.is_empty()))
    }

    async fn require_server(&self, id: &ServerId) -> RegistryResult<()> {
        if self.server_exists(id).await? {
            Ok(())
        } else {
            Err(rejected(RegistryError::ServerNotFound))
        }
    }

    async fn load_user(&self, id: &ServerId, user: &UserId) -> RegistryResult<UserRecord> {
        let stored = self.store.get(&user_path(id, user)).await?;
        Ok(stored.map(decode).transpose()?.unwrap_or_default())
    }

    async fn load_links(&self, path: &KeyPath) -> RegistryResult<Vec<String>> {
        let stored = self.store.get(path).await?;
        Ok(stored.map(decode).transpose()?.unwrap_or_default())
    }

    async fn lock(&self, id: &ServerId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("mutex poisoned");
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id.as_str().to_owned()).or_default())
        };
        lock.lock_owned().await
    }
}

fn server_path(id: &ServerId) -> KeyPath {
    KeyPath::new(SERVERS_ROOT).child(id.as_str())
}

fn user_path(id: &ServerId, user: &UserId) -> KeyPath {
    server_path(id).child("users").child(user.as_str())
}

fn links_path(id: &ServerId, link_type: &str) -> KeyPath {
    server_path(id).child("proxies").child(link_type)
}

fn rejected(err: RegistryError) -> RegistryError {
    counter!(REJECTIONS_METRIC, "reason" => err.reason()).increment(1);
    debug!(reason = err.reason(), "registry operation rejected");
    err
}

fn encode<T: Serialize>(value: &T) -> Result<Value, StorageError> {
    serde_json::to_value(value).map_err(StorageError::codec)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, StorageError> {
    serde_json::from_value(value).map_err(StorageError::codec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKvStore;
    use serde_json::json;

    const SERVER_NOT_FOUND: &str = "Server not found, please contact support.";

    fn registry() -> ServerRegistry<InMemoryKvStore> {
        ServerRegistry::new(InMemoryKvStore::new())
    }

    async fn registry_with_server(id: &str) -> ServerRegistry<InMemoryKvStore> {
        let registry = registry();
        assert!(registry.add_server(&ServerId::from(id)).await.unwrap());
        registry
    }

    #[tokio::test]
    async fn new_server_has_defaults() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;

        assert_eq!(registry.get_limit(&id).await.unwrap(), 3);
        assert_eq!(registry.get_types(&id).await.unwrap(), Vec::<String>::new());
        assert_eq!(
            registry.store().snapshot(SERVERS_ROOT),
            Some(json!({"guild-1": {"proxies": {}, "users": {}, "limit": 3}}))
        );
    }

    #[tokio::test]
    async fn add_server_is_idempotent() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;
        registry.set_limit(&id, 7).await.unwrap();
        registry
            .add_link(&id, "discord", "https://discord.gg/abc")
            .await
            .unwrap();

        assert!(!registry.add_server(&id).await.unwrap());
        assert_eq!(registry.get_limit(&id).await.unwrap(), 7);
        assert_eq!(
            registry.get_links(&id, "discord").await.unwrap(),
            vec!["https://discord.gg/abc".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_server_defaults_without_writing() {
        let registry = registry();
        let id = ServerId::from("ghost");

        assert_eq!(registry.get_limit(&id).await.unwrap(), DEFAULT_LIMIT);
        assert_eq!(
            registry.get_user(&id, &UserId::from("u")).await.unwrap(),
            None
        );
        assert!(!registry.remove_server(&id).await.unwrap());
        assert_eq!(registry.store().snapshot(SERVERS_ROOT), None);
    }

    #[tokio::test]
    async fn catalog_operations_reject_missing_server() {
        let registry = registry();
        let id = ServerId::from("ghost");
        let link = "https://discord.gg/abc";

        let results = [
            registry.get_links(&id, "discord").await.map(|_| ()),
            registry.get_types(&id).await.map(|_| ()),
            registry.reset(&id, None).await,
            registry.reset(&id, Some(&UserId::from("u"))).await,
            registry.add_link(&id, "discord", link).await,
            registry.remove_link(&id, "discord", link).await,
            registry
                .set_user(&id, &UserId::from("u"), &UserRecord::default())
                .await,
            registry.set_limit(&id, 5).await,
        ];
        for result in results {
            let err = result.unwrap_err();
            assert_eq!(err, RegistryError::ServerNotFound);
            assert_eq!(err.to_string(), SERVER_NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn add_link_validates_before_lookup() {
        let registry = registry();
        let id = ServerId::from("ghost");

        let err = registry
            .add_link(&id, "__secret", "https://discord.gg/abc")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid link type.");

        let err = registry
            .add_link(&id, "discord", "not-a-url")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid link.");
    }

    #[tokio::test]
    async fn duplicate_link_is_rejected() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;
        let link = "https://discord.gg/abc";

        registry.add_link(&id, "discord", link).await.unwrap();
        let err = registry.add_link(&id, "discord", link).await.unwrap_err();
        assert_eq!(err, RegistryError::LinkAlreadyExists);
        assert_eq!(err.to_string(), "Link already exists.");
        assert_eq!(registry.get_links(&id, "discord").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_link_shrinks_list() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;
        registry
            .add_link(&id, "web", "https://a.example/1")
            .await
            .unwrap();
        registry
            .add_link(&id, "web", "https://b.example/2")
            .await
            .unwrap();

        let err = registry
            .remove_link(&id, "web", "https://c.example/3")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Link does not exist.");

        registry
            .remove_link(&id, "web", "https://a.example/1")
            .await
            .unwrap();
        assert_eq!(
            registry.get_links(&id, "web").await.unwrap(),
            vec!["https://b.example/2".to_string()]
        );
    }

    #[tokio::test]
    async fn remove_link_drops_every_duplicate() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;
        registry
            .store()
            .set(&links_path(&id, "web"), json!(["x", "x", "y"]))
            .await
            .unwrap();

        registry.remove_link(&id, "web", "x").await.unwrap();
        assert_eq!(registry.get_links(&id, "web").await.unwrap(), ["y"]);
    }

    #[tokio::test]
    async fn emptied_type_disappears_from_types() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;
        registry
            .add_link(&id, "web", "https://a.example")
            .await
            .unwrap();
        registry
            .add_link(&id, "discord", "https://discord.gg/x")
            .await
            .unwrap();
        assert_eq!(registry.get_types(&id).await.unwrap(), ["web", "discord"]);

        registry
            .remove_link(&id, "web", "https://a.example")
            .await
            .unwrap();
        assert_eq!(registry.get_types(&id).await.unwrap(), ["discord"]);

        let err = registry.get_links(&id, "web").await.unwrap_err();
        assert_eq!(err, RegistryError::NoLinksFound);
        assert_eq!(err.to_string(), "No links found.");
    }

    #[tokio::test]
    async fn user_round_trip_and_default() {
        let id = ServerId::from("guild-1");
        let user = UserId::from("user-9");
        let registry = registry_with_server("guild-1").await;

        assert_eq!(
            registry.get_user(&id, &user).await.unwrap(),
            Some(UserRecord::default())
        );
        assert_eq!(
            registry.store().snapshot(SERVERS_ROOT).unwrap()["guild-1"]["users"],
            json!({})
        );

        let record = UserRecord {
            count: 2,
            links: vec!["https://a.example".into()],
        };
        registry.set_user(&id, &user, &record).await.unwrap();
        assert_eq!(registry.get_user(&id, &user).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn reset_single_user_keeps_links() {
        let id = ServerId::from("guild-1");
        let user = UserId::from("user-9");
        let registry = registry_with_server("guild-1").await;
        let record = UserRecord {
            count: 3,
            links: vec!["https://a.example".into()],
        };
        registry.set_user(&id, &user, &record).await.unwrap();

        registry.reset(&id, Some(&user)).await.unwrap();
        let stored = registry.get_user(&id, &user).await.unwrap().unwrap();
        assert_eq!(stored.count, 0);
        assert_eq!(stored.links, record.links);
    }

    #[tokio::test]
    async fn reset_unknown_user_persists_default() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;

        registry
            .reset(&id, Some(&UserId::from("fresh")))
            .await
            .unwrap();
        assert_eq!(
            registry.store().snapshot(SERVERS_ROOT).unwrap()["guild-1"]["users"]["fresh"],
            json!({"count": 0, "links": []})
        );
    }

    #[tokio::test]
    async fn reset_all_zeroes_every_user() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;
        for (name, count) in [("a", 1), ("b", 5)] {
            let record = UserRecord {
                count,
                links: vec![format!("https://{name}.example")],
            };
            registry
                .set_user(&id, &UserId::from(name), &record)
                .await
                .unwrap();
        }

        registry.reset(&id, None).await.unwrap();
        for name in ["a", "b"] {
            let stored = registry
                .get_user(&id, &UserId::from(name))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.count, 0);
            assert_eq!(stored.links, vec![format!("https://{name}.example")]);
        }
    }

    #[tokio::test]
    async fn removed_server_reads_as_absent_and_can_return() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;
        registry.set_limit(&id, 9).await.unwrap();

        assert!(registry.remove_server(&id).await.unwrap());
        assert_eq!(
            registry.store().snapshot(SERVERS_ROOT),
            Some(json!({"guild-1": {}}))
        );
        assert_eq!(registry.get_limit(&id).await.unwrap(), DEFAULT_LIMIT);
        assert_eq!(
            registry.get_types(&id).await.unwrap_err(),
            RegistryError::ServerNotFound
        );

        assert!(registry.add_server(&id).await.unwrap());
        assert_eq!(registry.get_limit(&id).await.unwrap(), DEFAULT_LIMIT);
    }

    #[tokio::test]
    async fn concurrent_adds_keep_every_link() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;

        let tasks: Vec<_> = (0..16)
            .map(|n| {
                let registry = registry.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    registry
                        .add_link(&id, "web", &format!("https://{n}.example"))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(registry.get_links(&id, "web").await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn idle_server_locks_are_released() {
        let registry = registry();
        for id in ["guild-1", "guild-2", "guild-3"] {
            registry.add_server(&ServerId::from(id)).await.unwrap();
        }
        assert_eq!(registry.locks.lock().unwrap().len(), 1);

        let id = ServerId::from("guild-1");
        assert!(registry.remove_server(&id).await.unwrap());
        let locks = registry.locks.lock().unwrap();
        assert_eq!(locks.keys().collect::<Vec<_>>(), ["guild-1"]);
    }

    #[tokio::test]
    async fn scalar_in_link_slot_surfaces_storage_error() {
        let id = ServerId::from("guild-1");
        let registry = registry_with_server("guild-1").await;
        registry
            .store()
            .set(&links_path(&id, "web"), json!("oops"))
            .await
            .unwrap();

        let err = registry
            .add_link(&id, "web", "https://a.example")
            .await
            .unwrap_err();
        assert!(!err.is_rejection());
        assert!(matches!(err, RegistryError::Storage(StorageError::Codec(_))));
    }
}
