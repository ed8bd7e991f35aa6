//! TENANTKV Storage - Store Contract and Backends
//!
//! Defines the multi-tenant key-value contract and its implementations:
//! - [`InMemoryStore`]: process-local, tenant → key → value under one lock
//! - [`RemoteCacheAdapter`]: the same contract over a flat external keyspace
//!   (Redis, LMDB), with tenant identity encoded into each storage key
//!
//! Every operation reports its outcome as a [`StatusCode`]. Parameters are
//! `Option<&str>` so that absent input is rejected by validation rather than
//! by the type system of whichever transport sits in front of the store.

pub mod memory;
pub mod remote;

pub use memory::InMemoryStore;
pub use remote::{
    FlatKeyspace, InMemoryKeyspace, KeyspaceError, KeyspaceResult, RemoteCacheAdapter,
    TenantPrefix, TenantScopedKey,
};

#[cfg(feature = "lmdb")]
pub use remote::LmdbKeyspace;
#[cfg(feature = "redis")]
pub use remote::RedisKeyspace;

pub use tenantkv_core::{StatusCode, StoreConfig, TenantKvError, TenantKvResult};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tenantkv_core::BackendConfig;

/// A copy of every entry in one tenant's namespace.
pub type Snapshot = HashMap<String, String>;

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Multi-tenant key-value store.
///
/// Each tenant (`user_id`) owns an isolated namespace of keys. Every
/// operation validates its parameters first, in the order `user_id`, `key`,
/// `value`, and returns the first failure without touching state.
///
/// Backends differ in one respect callers must know about: the in-memory
/// store remembers tenants (and reports `UserNotFound` for unknown ones),
/// while remote backends cannot tell an unknown tenant from an empty one.
/// See [`RemoteCacheAdapter`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store a new entry. Refuses with `KeyAlreadyExists` if the key is taken.
    async fn create(
        &self,
        user_id: Option<&str>,
        key: Option<&str>,
        value: Option<&str>,
    ) -> StatusCode;

    /// Look up an entry. The value is `Some` only when the status is `Success`.
    async fn read(&self, user_id: Option<&str>, key: Option<&str>) -> (StatusCode, Option<String>);

    /// Replace the value of an existing entry.
    async fn update(
        &self,
        user_id: Option<&str>,
        key: Option<&str>,
        value: Option<&str>,
    ) -> StatusCode;

    /// Remove an existing entry.
    async fn delete(&self, user_id: Option<&str>, key: Option<&str>) -> StatusCode;

    /// Copy every entry of a tenant's namespace.
    ///
    /// The returned map is owned by the caller; it never aliases store state.
    async fn get_all(&self, user_id: Option<&str>) -> (StatusCode, Snapshot);
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn create(
        &self,
        user_id: Option<&str>,
        key: Option<&str>,
        value: Option<&str>,
    ) -> StatusCode {
        (**self).create(user_id, key, value).await
    }

    async fn read(&self, user_id: Option<&str>, key: Option<&str>) -> (StatusCode, Option<String>) {
        (**self).read(user_id, key).await
    }

    async fn update(
        &self,
        user_id: Option<&str>,
        key: Option<&str>,
        value: Option<&str>,
    ) -> StatusCode {
        (**self).update(user_id, key, value).await
    }

    async fn delete(&self, user_id: Option<&str>, key: Option<&str>) -> StatusCode {
        (**self).delete(user_id, key).await
    }

    async fn get_all(&self, user_id: Option<&str>) -> (StatusCode, Snapshot) {
        (**self).get_all(user_id).await
    }
}

// ============================================================================
// BACKEND SELECTION
// ============================================================================

/// Open the store described by `config`.
///
/// The configuration is validated first. Backends compiled out of this build
/// are reported as `ConfigError::BackendNotSupported`.
pub async fn open_store(config: &StoreConfig) -> TenantKvResult<Arc<dyn KeyValueStore>> {
    config.validate()?;

    let store: Arc<dyn KeyValueStore> = match &config.backend {
        BackendConfig::Memory => Arc::new(InMemoryStore::new()),

        #[cfg(feature = "redis")]
        BackendConfig::Redis { url, scan_batch } => {
            let keyspace = RedisKeyspace::connect(url, *scan_batch).await?;
            Arc::new(RemoteCacheAdapter::new(keyspace))
        }

        #[cfg(feature = "lmdb")]
        BackendConfig::Lmdb { path, max_size_mb } => {
            let keyspace = LmdbKeyspace::open(path, *max_size_mb)?;
            Arc::new(RemoteCacheAdapter::new(keyspace))
        }

        #[allow(unreachable_patterns)]
        other => {
            return Err(tenantkv_core::ConfigError::BackendNotSupported {
                backend: other.name().to_string(),
            }
            .into())
        }
    };

    tracing::info!(backend = config.backend.name(), "Opened key-value store");
    Ok(store)
}
