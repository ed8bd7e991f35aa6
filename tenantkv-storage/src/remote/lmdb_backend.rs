//! LMDB-backed flat keyspace.
//!
//! Uses the heed crate (Rust bindings for LMDB) to store every tenant's
//! entries in a single unnamed database, keyed by the encoded storage key.
//!
//! # Atomicity
//!
//! LMDB allows one write transaction at a time per environment. Both
//! conditional writes check and write inside the same write transaction, so
//! no other writer can slip in between. Prefix scans run in a read
//! transaction and see a consistent snapshot.
//!
//! # Key size
//!
//! LMDB caps key length (511 bytes in default builds). Every primitive checks
//! the encoded storage key against [`LmdbKeyspace::max_key_size`] before
//! opening a transaction and fails with [`KeyspaceError::KeyTooLong`], so an
//! oversized key reports the same error on writes and on reads.

use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tenantkv_core::StorageError;

use super::keyspace::{FlatKeyspace, KeyspaceError, KeyspaceResult};

const BACKEND: &str = "lmdb";

/// Flat keyspace stored in an LMDB environment.
///
/// Storage keys longer than [`max_key_size`](Self::max_key_size) bytes are
/// refused with [`KeyspaceError::KeyTooLong`].
pub struct LmdbKeyspace {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Longest storage key the environment accepts, in bytes.
    max_key_size: usize,
}

impl std::fmt::Debug for LmdbKeyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbKeyspace")
            .field("path", &self.env.path())
            .field("max_key_size", &self.max_key_size)
            .finish()
    }
}

impl LmdbKeyspace {
    /// Open (or create) an LMDB keyspace in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BackendOpen` if the directory cannot be
    /// created or the environment or database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, StorageError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| open_error(e.to_string()))?;

        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| open_error(format!("map size of {max_size_mb} MB overflows")))?;

        // SAFETY: the environment is opened once per keyspace and the files
        // are not modified by anything other than LMDB itself.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path)
        }
        .map_err(|e| open_error(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(|e| open_error(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| open_error(e.to_string()))?;
        wtxn.commit().map_err(|e| open_error(e.to_string()))?;

        let max_key_size = env.max_key_size();
        tracing::debug!(path = %path.display(), map_size, max_key_size, "Opened LMDB keyspace");
        Ok(Self {
            env,
            db,
            max_key_size,
        })
    }

    /// Longest storage key, in bytes, this keyspace can hold.
    pub fn max_key_size(&self) -> usize {
        self.max_key_size
    }

    fn check_key(&self, key: &str) -> KeyspaceResult<()> {
        if key.len() > self.max_key_size {
            return Err(KeyspaceError::KeyTooLong {
                len: key.len(),
                max: self.max_key_size,
            });
        }
        Ok(())
    }

    /// Number of storage keys in the database.
    pub fn len(&self) -> KeyspaceResult<u64> {
        let rtxn = self.env.read_txn().map_err(map_heed_error)?;
        self.db.len(&rtxn).map_err(map_heed_error)
    }

    /// True if the database holds no storage key.
    pub fn is_empty(&self) -> KeyspaceResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn open_error(reason: String) -> StorageError {
    StorageError::BackendOpen {
        backend: BACKEND.to_string(),
        reason,
    }
}

fn map_heed_error(err: heed::Error) -> KeyspaceError {
    match err {
        heed::Error::Io(io) => KeyspaceError::Unavailable {
            reason: io.to_string(),
        },
        other => KeyspaceError::Backend {
            reason: other.to_string(),
        },
    }
}

fn decode_utf8(key: &[u8], bytes: &[u8]) -> KeyspaceResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| KeyspaceError::Corrupt {
            key: String::from_utf8_lossy(key).into_owned(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl FlatKeyspace for LmdbKeyspace {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &str) -> KeyspaceResult<Option<String>> {
        self.check_key(key)?;
        let rtxn = self.env.read_txn().map_err(map_heed_error)?;
        match self.db.get(&rtxn, key.as_bytes()).map_err(map_heed_error)? {
            Some(bytes) => decode_utf8(key.as_bytes(), bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> KeyspaceResult<bool> {
        self.check_key(key)?;
        let mut wtxn = self.env.write_txn().map_err(map_heed_error)?;
        if self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(map_heed_error)?
            .is_some()
        {
            // Dropping the transaction aborts it.
            return Ok(false);
        }
        self.db
            .put(&mut wtxn, key.as_bytes(), value.as_bytes())
            .map_err(map_heed_error)?;
        wtxn.commit().map_err(map_heed_error)?;
        Ok(true)
    }

    async fn set_if_present(&self, key: &str, value: &str) -> KeyspaceResult<bool> {
        self.check_key(key)?;
        let mut wtxn = self.env.write_txn().map_err(map_heed_error)?;
        if self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(map_heed_error)?
            .is_none()
        {
            return Ok(false);
        }
        self.db
            .put(&mut wtxn, key.as_bytes(), value.as_bytes())
            .map_err(map_heed_error)?;
        wtxn.commit().map_err(map_heed_error)?;
        Ok(true)
    }

    async fn remove(&self, key: &str) -> KeyspaceResult<bool> {
        self.check_key(key)?;
        let mut wtxn = self.env.write_txn().map_err(map_heed_error)?;
        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(map_heed_error)?;
        wtxn.commit().map_err(map_heed_error)?;
        Ok(deleted)
    }

    async fn scan_prefix(&self, prefix: &str) -> KeyspaceResult<Vec<(String, String)>> {
        // No storable key is longer than the limit, so none can match.
        if prefix.len() > self.max_key_size {
            return Ok(Vec::new());
        }
        let rtxn = self.env.read_txn().map_err(map_heed_error)?;
        let iter = self
            .db
            .prefix_iter(&rtxn, prefix.as_bytes())
            .map_err(map_heed_error)?;

        let mut pairs = Vec::new();
        for result in iter {
            let (key, value) = result.map_err(map_heed_error)?;
            let storage_key = decode_utf8(key, key)?;
            let value = decode_utf8(key, value)?;
            pairs.push((storage_key, value));
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::adapter::RemoteCacheAdapter;
    use crate::KeyValueStore;
    use tempfile::TempDir;
    use tenantkv_core::StatusCode;

    fn create_test_keyspace() -> (LmdbKeyspace, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let keyspace =
            LmdbKeyspace::open(temp_dir.path(), 10).expect("keyspace creation should succeed");
        (keyspace, temp_dir)
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let (keyspace, _temp_dir) = create_test_keyspace();

        assert!(!keyspace.set_if_present("u:k", "v0").await.unwrap());
        assert!(keyspace.set_if_absent("u:k", "v1").await.unwrap());
        assert!(!keyspace.set_if_absent("u:k", "v2").await.unwrap());
        assert_eq!(keyspace.get("u:k").await.unwrap().as_deref(), Some("v1"));

        assert!(keyspace.set_if_present("u:k", "v3").await.unwrap());
        assert_eq!(keyspace.get("u:k").await.unwrap().as_deref(), Some("v3"));
        assert_eq!(keyspace.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let (keyspace, _temp_dir) = create_test_keyspace();
        keyspace.set_if_absent("u:k", "v").await.unwrap();

        assert!(keyspace.remove("u:k").await.unwrap());
        assert!(!keyspace.remove("u:k").await.unwrap());
        assert_eq!(keyspace.get("u:k").await.unwrap(), None);
        assert!(keyspace.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let (keyspace, _temp_dir) = create_test_keyspace();
        for key in ["a:1", "a:2", "ab:1", "b:1"] {
            keyspace.set_if_absent(key, key).await.unwrap();
        }

        let pairs = keyspace.scan_prefix("a:").await.unwrap();
        assert_eq!(
            pairs,
            vec![
                ("a:1".to_string(), "a:1".to_string()),
                ("a:2".to_string(), "a:2".to_string()),
            ]
        );
        assert!(keyspace.scan_prefix("zzz:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_value_is_corrupt() {
        let (keyspace, _temp_dir) = create_test_keyspace();
        {
            let mut wtxn = keyspace.env.write_txn().unwrap();
            keyspace
                .db
                .put(&mut wtxn, b"u:bad", &[0xff, 0xfe])
                .unwrap();
            wtxn.commit().unwrap();
        }

        let err = keyspace.get("u:bad").await.unwrap_err();
        assert!(matches!(err, KeyspaceError::Corrupt { .. }));
        assert_eq!(err.status(), StatusCode::Error);
    }

    #[tokio::test]
    async fn test_adapter_over_lmdb() {
        let (keyspace, _temp_dir) = create_test_keyspace();
        let store = RemoteCacheAdapter::new(keyspace);

        assert_eq!(
            store.create(Some("a:b"), Some("c"), Some("1")).await,
            StatusCode::Success
        );
        assert_eq!(
            store.create(Some("a"), Some("b:c"), Some("2")).await,
            StatusCode::Success
        );
        assert_eq!(
            store.update(Some("a"), Some("b:c"), Some("3")).await,
            StatusCode::Success
        );

        let (status, all) = store.get_all(Some("a")).await;
        assert_eq!(status, StatusCode::Success);
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("b:c").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn test_oversized_key_is_refused_by_every_primitive() {
        let (keyspace, _temp_dir) = create_test_keyspace();
        let max = keyspace.max_key_size();
        let long = "k".repeat(max + 1);
        let too_long = KeyspaceError::KeyTooLong { len: max + 1, max };

        assert_eq!(keyspace.set_if_absent(&long, "v").await, Err(too_long.clone()));
        assert_eq!(keyspace.set_if_present(&long, "v").await, Err(too_long.clone()));
        assert_eq!(keyspace.get(&long).await, Err(too_long.clone()));
        assert_eq!(keyspace.remove(&long).await, Err(too_long));
        assert_eq!(keyspace.scan_prefix(&long).await, Ok(Vec::new()));
        assert!(keyspace.is_empty().unwrap());

        let longest = "k".repeat(max);
        assert!(keyspace.set_if_absent(&longest, "v").await.unwrap());
        assert_eq!(keyspace.get(&longest).await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_adapter_reports_oversized_key_as_error_on_every_operation() {
        let (keyspace, _temp_dir) = create_test_keyspace();
        let max = keyspace.max_key_size();
        let store = RemoteCacheAdapter::new(keyspace);

        // "u:" takes two bytes of the storage key.
        let long = "k".repeat(600.max(max));
        assert_eq!(
            store.create(Some("u"), Some(long.as_str()), Some("v")).await,
            StatusCode::Error
        );
        assert_eq!(
            store.read(Some("u"), Some(long.as_str())).await,
            (StatusCode::Error, None)
        );
        assert_eq!(
            store.update(Some("u"), Some(long.as_str()), Some("v")).await,
            StatusCode::Error
        );
        assert_eq!(store.delete(Some("u"), Some(long.as_str())).await, StatusCode::Error);

        let fits = "k".repeat(max - 2);
        assert_eq!(
            store.create(Some("u"), Some(fits.as_str()), Some("v")).await,
            StatusCode::Success
        );
        let (status, all) = store.get_all(Some("u")).await;
        assert_eq!(status, StatusCode::Success);
        assert_eq!(all.len(), 1);
        assert!(all.contains_key(&fits));
    }

    #[test]
    fn test_open_overflowing_map_size() {
        let temp_dir = TempDir::new().unwrap();
        let err = LmdbKeyspace::open(temp_dir.path(), usize::MAX).unwrap_err();
        assert!(matches!(err, StorageError::BackendOpen { .. }));
    }
}
