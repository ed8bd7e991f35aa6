//! Store contract over a flat keyspace.
//!
//! [`RemoteCacheAdapter`] maps each tenant-scoped operation to one keyspace
//! primitive on the encoded storage key:
//!
//! | Operation | Primitive | Refused means |
//! |-----------|-----------|---------------|
//! | create | `set_if_absent` | `KeyAlreadyExists` |
//! | read | `get` | `KeyNotFound` |
//! | update | `set_if_present` | `KeyNotFound` |
//! | delete | `remove` | `KeyNotFound` |
//! | get_all | `scan_prefix` | never refused |
//!
//! A flat keyspace keeps no record of tenants, so this adapter never
//! reports `UserNotFound`: an unknown tenant looks exactly like a tenant
//! with no entries. Keyspace failures surface as `Unavailable` (transport)
//! or `Error` (anything else) instead of being propagated.

use async_trait::async_trait;
use tenantkv_core::{validate_entry, validate_key, validate_tenant, StatusCode};

use super::keyspace::{FlatKeyspace, KeyspaceError};
use super::tenant_key::{TenantPrefix, TenantScopedKey};
use crate::{KeyValueStore, Snapshot};

/// Multi-tenant store backed by a [`FlatKeyspace`].
#[derive(Debug)]
pub struct RemoteCacheAdapter<K> {
    keyspace: K,
}

impl<K: FlatKeyspace> RemoteCacheAdapter<K> {
    /// Wrap a keyspace.
    pub fn new(keyspace: K) -> Self {
        Self { keyspace }
    }

    /// The underlying keyspace.
    pub fn keyspace(&self) -> &K {
        &self.keyspace
    }

    fn failure(&self, op: &'static str, user_id: &str, err: &KeyspaceError) -> StatusCode {
        let status = err.status();
        tracing::warn!(
            backend = self.keyspace.name(),
            op,
            user_id = %user_id,
            error = %err,
            %status,
            "Keyspace operation failed"
        );
        status
    }
}

#[async_trait]
impl<K: FlatKeyspace> KeyValueStore for RemoteCacheAdapter<K> {
    async fn create(
        &self,
        user_id: Option<&str>,
        key: Option<&str>,
        value: Option<&str>,
    ) -> StatusCode {
        let entry = match validate_entry(user_id, key, value) {
            Ok(entry) => entry,
            Err(status) => return status,
        };

        let scoped = TenantScopedKey::new(entry.user_id, entry.key);
        let status = match self.keyspace.set_if_absent(scoped.encode(), entry.value).await {
            Ok(true) => StatusCode::Success,
            Ok(false) => StatusCode::KeyAlreadyExists,
            Err(err) => self.failure("create", entry.user_id, &err),
        };

        tracing::debug!(backend = self.keyspace.name(), storage_key = %scoped, %status, "create");
        status
    }

    async fn read(&self, user_id: Option<&str>, key: Option<&str>) -> (StatusCode, Option<String>) {
        let target = match validate_key(user_id, key) {
            Ok(target) => target,
            Err(status) => return (status, None),
        };

        let scoped = TenantScopedKey::new(target.user_id, target.key);
        let outcome = match self.keyspace.get(scoped.encode()).await {
            Ok(Some(value)) => (StatusCode::Success, Some(value)),
            Ok(None) => (StatusCode::KeyNotFound, None),
            Err(err) => (self.failure("read", target.user_id, &err), None),
        };

        tracing::debug!(backend = self.keyspace.name(), storage_key = %scoped, status = %outcome.0, "read");
        outcome
    }

    async fn update(
        &self,
        user_id: Option<&str>,
        key: Option<&str>,
        value: Option<&str>,
    ) -> StatusCode {
        let entry = match validate_entry(user_id, key, value) {
            Ok(entry) => entry,
            Err(status) => return status,
        };

        // Conditional write: an entry deleted concurrently is not resurrected.
        let scoped = TenantScopedKey::new(entry.user_id, entry.key);
        let status = match self.keyspace.set_if_present(scoped.encode(), entry.value).await {
            Ok(true) => StatusCode::Success,
            Ok(false) => StatusCode::KeyNotFound,
            Err(err) => self.failure("update", entry.user_id, &err),
        };

        tracing::debug!(backend = self.keyspace.name(), storage_key = %scoped, %status, "update");
        status
    }

    async fn delete(&self, user_id: Option<&str>, key: Option<&str>) -> StatusCode {
        let target = match validate_key(user_id, key) {
            Ok(target) => target,
            Err(status) => return status,
        };

        let scoped = TenantScopedKey::new(target.user_id, target.key);
        let status = match self.keyspace.remove(scoped.encode()).await {
            Ok(true) => StatusCode::Success,
            Ok(false) => StatusCode::KeyNotFound,
            Err(err) => self.failure("delete", target.user_id, &err),
        };

        tracing::debug!(backend = self.keyspace.name(), storage_key = %scoped, %status, "delete");
        status
    }

    async fn get_all(&self, user_id: Option<&str>) -> (StatusCode, Snapshot) {
        let user_id = match validate_tenant(user_id) {
            Ok(user_id) => user_id,
            Err(status) => return (status, Snapshot::new()),
        };

        let prefix = TenantPrefix::new(user_id);
        let pairs = match self.keyspace.scan_prefix(prefix.as_str()).await {
            Ok(pairs) => pairs,
            Err(err) => return (self.failure("get_all", user_id, &err), Snapshot::new()),
        };

        let snapshot: Snapshot = pairs
            .into_iter()
            .filter_map(|(storage_key, value)| {
                prefix
                    .strip(&storage_key)
                    .map(|key| (key.to_string(), value))
            })
            .collect();

        tracing::debug!(
            backend = self.keyspace.name(),
            user_id = %user_id,
            entries = snapshot.len(),
            "get_all"
        );
        (StatusCode::Success, snapshot)
    }
}
