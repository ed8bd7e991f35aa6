//! Redis-backed flat keyspace.
//!
//! Every primitive is a single Redis command, so its atomicity comes from
//! Redis itself:
//!
//! | Primitive | Command |
//! |-----------|---------|
//! | `get` | `GET` |
//! | `set_if_absent` | `SET key value NX` |
//! | `set_if_present` | `SET key value XX` |
//! | `remove` | `DEL` |
//! | `scan_prefix` | `SCAN MATCH` then `MGET` per batch |
//!
//! `scan_prefix` is not a snapshot: keys written or removed while the scan
//! runs may or may not show up, and keys removed between `SCAN` and `MGET`
//! are skipped.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError};
use tenantkv_core::StorageError;

use super::keyspace::{FlatKeyspace, KeyspaceError, KeyspaceResult};
use super::tenant_key::prefix_glob;

const BACKEND: &str = "redis";

/// Flat keyspace on a Redis server (or any RESP-compatible cache).
///
/// The connection manager multiplexes one connection and reconnects on
/// failure; it is cheap to clone, so each call works on its own handle.
#[derive(Clone)]
pub struct RedisKeyspace {
    conn: ConnectionManager,
    scan_batch: usize,
}

impl std::fmt::Debug for RedisKeyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKeyspace")
            .field("scan_batch", &self.scan_batch)
            .finish_non_exhaustive()
    }
}

impl RedisKeyspace {
    /// Connect to the server at `url`.
    ///
    /// `scan_batch` is the `COUNT` hint passed to each `SCAN` round trip.
    ///
    /// # Errors
    ///
    /// - `StorageError::BackendOpen` if the URL is not a valid Redis URL
    /// - `StorageError::Unavailable` if the server cannot be reached
    pub async fn connect(url: &str, scan_batch: usize) -> Result<Self, StorageError> {
        let client = redis::Client::open(url).map_err(|e| StorageError::BackendOpen {
            backend: BACKEND.to_string(),
            reason: e.to_string(),
        })?;

        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StorageError::Unavailable {
                backend: BACKEND.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(scan_batch, "Connected to Redis keyspace");
        Ok(Self {
            conn,
            scan_batch: scan_batch.max(1),
        })
    }

    /// Keys requested per `SCAN` round trip.
    pub fn scan_batch(&self) -> usize {
        self.scan_batch
    }
}

/// Classify a Redis error: transport problems are `Unavailable`, values
/// that fail to convert are `Corrupt`, everything else is `Protocol`.
fn map_redis_error(key: &str, err: RedisError) -> KeyspaceError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        KeyspaceError::Unavailable {
            reason: err.to_string(),
        }
    } else if err.kind() == ErrorKind::TypeError {
        KeyspaceError::Corrupt {
            key: key.to_string(),
            reason: err.to_string(),
        }
    } else {
        KeyspaceError::Protocol {
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl FlatKeyspace for RedisKeyspace {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &str) -> KeyspaceResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(key, e))?;
        Ok(value)
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> KeyspaceResult<bool> {
        let mut conn = self.conn.clone();
        // SET NX replies OK when stored and nil when the key exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(key, e))?;
        Ok(reply.is_some())
    }

    async fn set_if_present(&self, key: &str, value: &str) -> KeyspaceResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("XX")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(key, e))?;
        Ok(reply.is_some())
    }

    async fn remove(&self, key: &str) -> KeyspaceResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(key, e))?;
        Ok(removed > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> KeyspaceResult<Vec<(String, String)>> {
        let mut conn = self.conn.clone();
        let pattern = prefix_glob(prefix);
        let mut pairs = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_batch)
                .query_async(&mut conn)
                .await
                .map_err(|e| map_redis_error(prefix, e))?;

            if !keys.is_empty() {
                let values: Vec<Option<String>> = redis::cmd("MGET")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| map_redis_error(prefix, e))?;

                // A key removed after SCAN returned it comes back as nil.
                pairs.extend(
                    keys.into_iter()
                        .zip(values)
                        .filter_map(|(key, value)| value.map(|value| (key, value))),
                );
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        pairs.dedup_by(|a, b| a.0 == b.0);
        Ok(pairs)
    }
}
