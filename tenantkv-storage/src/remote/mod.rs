//! Remote backends over a flat keyspace.
//!
//! External caches such as Redis offer one flat keyspace with no notion of
//! a tenant. This module simulates per-tenant namespaces on top of one:
//!
//! - [`TenantScopedKey`] composes `escaped(user_id) ':' key`, so distinct
//!   (tenant, key) pairs can never share a storage key
//! - [`FlatKeyspace`] is the primitive set a flat service must offer
//! - [`RemoteCacheAdapter`] implements the store contract over any
//!   [`FlatKeyspace`]
//!
//! # Backends
//!
//! | Keyspace | Feature | Description |
//! |----------|---------|-------------|
//! | [`RedisKeyspace`] | `redis` | Redis or any RESP-compatible cache |
//! | [`LmdbKeyspace`] | `lmdb` | LMDB environment on local disk |
//! | [`InMemoryKeyspace`] | - | Flat in-process map for tests and embedding |

pub mod adapter;
pub mod keyspace;
pub mod tenant_key;

#[cfg(feature = "lmdb")]
pub mod lmdb_backend;
#[cfg(feature = "redis")]
pub mod redis_backend;

pub use adapter::RemoteCacheAdapter;
pub use keyspace::{FlatKeyspace, InMemoryKeyspace, KeyspaceError, KeyspaceResult};
pub use tenant_key::{TenantPrefix, TenantScopedKey};

#[cfg(feature = "lmdb")]
pub use lmdb_backend::LmdbKeyspace;
#[cfg(feature = "redis")]
pub use redis_backend::RedisKeyspace;
