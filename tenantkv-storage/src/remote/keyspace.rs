//! Flat keyspace primitives.
//!
//! A [`FlatKeyspace`] is what an external key-value service must provide
//! for [`RemoteCacheAdapter`](super::RemoteCacheAdapter) to run on it:
//! single-key reads, single-key conditional writes, removal and prefix
//! enumeration. Both conditional writes must be atomic on the service side.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tenantkv_core::StatusCode;
use thiserror::Error;
use tokio::sync::RwLock;

/// Error type for flat keyspace operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyspaceError {
    /// The service could not be reached: connection, I/O or timeout failure.
    #[error("Keyspace unavailable: {reason}")]
    Unavailable { reason: String },

    /// The service answered with something the client could not use.
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    /// A stored key or value could not be decoded.
    #[error("Corrupt data under {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// The storage key is longer than the service accepts.
    #[error("Storage key of {len} bytes exceeds the {max}-byte limit")]
    KeyTooLong { len: usize, max: usize },

    /// The service failed for any other reason.
    #[error("Backend error: {reason}")]
    Backend { reason: String },
}

impl KeyspaceError {
    /// The status reported to store callers for this failure.
    ///
    /// Connectivity failures get their own status so callers can retry them;
    /// everything else is an undifferentiated `Error`.
    pub fn status(&self) -> StatusCode {
        match self {
            KeyspaceError::Unavailable { .. } => StatusCode::Unavailable,
            KeyspaceError::Protocol { .. }
            | KeyspaceError::Corrupt { .. }
            | KeyspaceError::KeyTooLong { .. }
            | KeyspaceError::Backend { .. } => StatusCode::Error,
        }
    }
}

/// Result type alias for keyspace operations.
pub type KeyspaceResult<T> = Result<T, KeyspaceError>;

/// A flat key-value service with no native tenant grouping.
///
/// Implementations must be safe for concurrent use by many callers.
#[async_trait]
pub trait FlatKeyspace: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch the value under `key`.
    async fn get(&self, key: &str) -> KeyspaceResult<Option<String>>;

    /// Store `value` only if `key` is absent. Returns whether it was stored.
    async fn set_if_absent(&self, key: &str, value: &str) -> KeyspaceResult<bool>;

    /// Replace the value only if `key` is present. Returns whether it was stored.
    async fn set_if_present(&self, key: &str, value: &str) -> KeyspaceResult<bool>;

    /// Remove `key`. Returns whether a value was removed.
    async fn remove(&self, key: &str) -> KeyspaceResult<bool>;

    /// Every (storage key, value) pair whose key starts with `prefix`.
    ///
    /// Keys removed while the enumeration runs may be skipped.
    async fn scan_prefix(&self, prefix: &str) -> KeyspaceResult<Vec<(String, String)>>;
}

// ============================================================================
// IN-MEMORY KEYSPACE
// ============================================================================

/// Flat, ordered, process-local keyspace.
///
/// Behaves like a single-node remote cache without the network, which makes
/// it the reference keyspace for adapter tests.
#[derive(Debug, Default)]
pub struct InMemoryKeyspace {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryKeyspace {
    /// Create an empty keyspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of storage keys across all tenants.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if no storage key exists.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Every storage key, in order.
    pub async fn storage_keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl FlatKeyspace for InMemoryKeyspace {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> KeyspaceResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> KeyspaceResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn set_if_present(&self, key: &str, value: &str) -> KeyspaceResult<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(current) => {
                *current = value.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, key: &str) -> KeyspaceResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> KeyspaceResult<Vec<(String, String)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let unavailable = KeyspaceError::Unavailable {
            reason: "connection refused".to_string(),
        };
        assert_eq!(unavailable.status(), StatusCode::Unavailable);

        let corrupt = KeyspaceError::Corrupt {
            key: "u:k".to_string(),
            reason: "invalid utf-8".to_string(),
        };
        assert_eq!(corrupt.status(), StatusCode::Error);
        assert!(corrupt.to_string().contains("u:k"));

        let protocol = KeyspaceError::Protocol {
            reason: "WRONGTYPE".to_string(),
        };
        assert_eq!(protocol.status(), StatusCode::Error);

        let too_long = KeyspaceError::KeyTooLong { len: 600, max: 511 };
        assert_eq!(too_long.status(), StatusCode::Error);
        assert!(too_long.to_string().contains("511"));
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let keyspace = InMemoryKeyspace::new();

        assert!(!keyspace.set_if_present("k", "v0").await.unwrap());
        assert!(keyspace.set_if_absent("k", "v1").await.unwrap());
        assert!(!keyspace.set_if_absent("k", "v2").await.unwrap());
        assert_eq!(keyspace.get("k").await.unwrap().as_deref(), Some("v1"));

        assert!(keyspace.set_if_present("k", "v3").await.unwrap());
        assert_eq!(keyspace.get("k").await.unwrap().as_deref(), Some("v3"));
    }

    #[tokio::test]
    async fn test_remove() {
        let keyspace = InMemoryKeyspace::new();
        keyspace.set_if_absent("k", "v").await.unwrap();

        assert!(keyspace.remove("k").await.unwrap());
        assert!(!keyspace.remove("k").await.unwrap());
        assert!(keyspace.is_empty().await);
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let keyspace = InMemoryKeyspace::new();
        for key in ["a:1", "a:2", "ab:1", "b:1", "a"] {
            keyspace.set_if_absent(key, "v").await.unwrap();
        }

        let found: Vec<String> = keyspace
            .scan_prefix("a:")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(found, vec!["a:1".to_string(), "a:2".to_string()]);
        assert_eq!(keyspace.len().await, 5);
    }
}
