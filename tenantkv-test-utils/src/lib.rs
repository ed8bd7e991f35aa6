//! TENANTKV Test Utilities
//!
//! Centralized test infrastructure for the TENANTKV workspace:
//! - Proptest generators for tenants, keys, values and operation sequences
//! - Mock keyspaces for failure injection
//! - Store fixtures for every backend
//! - Contract scenarios every backend must pass
//! - Custom assertions for status-code validation

// Re-export the contract and backends for convenience
pub use tenantkv_core::{StatusCode, StoreConfig, TenantKvError, TenantKvResult};
pub use tenantkv_storage::{
    FlatKeyspace, InMemoryKeyspace, InMemoryStore, KeyValueStore, KeyspaceError, KeyspaceResult,
    LmdbKeyspace, RemoteCacheAdapter, Snapshot,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// TRACING
// ============================================================================

/// Install a fmt subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test: only the first call installs anything.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tenantkv_storage=debug,warn"));

    // A second init fails because a global subscriber is already set.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK KEYSPACES
// ============================================================================

/// Keyspace whose every call fails with the configured error.
///
/// Counts calls so tests can check that validation failures never reach the
/// keyspace.
#[derive(Debug)]
pub struct FailingKeyspace {
    error: KeyspaceError,
    calls: AtomicU64,
}

impl FailingKeyspace {
    pub fn new(error: KeyspaceError) -> Self {
        Self {
            error,
            calls: AtomicU64::new(0),
        }
    }

    /// A keyspace that looks like an unreachable server.
    pub fn unavailable() -> Self {
        Self::new(KeyspaceError::Unavailable {
            reason: "connection refused".to_string(),
        })
    }

    /// A keyspace that answers with an unusable reply.
    pub fn protocol_error() -> Self {
        Self::new(KeyspaceError::Protocol {
            reason: "unexpected reply".to_string(),
        })
    }

    /// Number of keyspace calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> KeyspaceResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

#[async_trait]
impl FlatKeyspace for FailingKeyspace {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> KeyspaceResult<Option<String>> {
        self.fail()
    }

    async fn set_if_absent(&self, _key: &str, _value: &str) -> KeyspaceResult<bool> {
        self.fail()
    }

    async fn set_if_present(&self, _key: &str, _value: &str) -> KeyspaceResult<bool> {
        self.fail()
    }

    async fn remove(&self, _key: &str) -> KeyspaceResult<bool> {
        self.fail()
    }

    async fn scan_prefix(&self, _prefix: &str) -> KeyspaceResult<Vec<(String, String)>> {
        self.fail()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest generators for store inputs.

    use proptest::prelude::*;

    /// Tenant ids, biased towards the characters that stress key encoding.
    pub fn arb_user_id() -> impl Strategy<Value = String> {
        prop_oneof![
            3 => "user[0-3]",
            1 => "[a-b:\\\\*?\\[]{0,4}",
            1 => "\\PC{0,6}",
        ]
    }

    /// Keys drawn from a small pool so sequences revisit the same entries.
    pub fn arb_key() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => "key[0-4]",
            1 => "[a-b:\\\\]{0,3}",
        ]
    }

    pub fn arb_value() -> impl Strategy<Value = String> {
        "\\PC{0,12}"
    }

    /// Optional parameter: `None` about one time in eight.
    pub fn arb_optional<S>(inner: S) -> impl Strategy<Value = Option<String>>
    where
        S: Strategy<Value = String>,
    {
        prop_oneof![
            1 => Just(None),
            7 => inner.prop_map(Some),
        ]
    }

    /// One store operation with fully populated parameters.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StoreOp {
        Create {
            user_id: String,
            key: String,
            value: String,
        },
        Read {
            user_id: String,
            key: String,
        },
        Update {
            user_id: String,
            key: String,
            value: String,
        },
        Delete {
            user_id: String,
            key: String,
        },
        GetAll {
            user_id: String,
        },
    }

    pub fn arb_store_op() -> impl Strategy<Value = StoreOp> {
        prop_oneof![
            3 => (arb_user_id(), arb_key(), arb_value())
                .prop_map(|(user_id, key, value)| StoreOp::Create { user_id, key, value }),
            2 => (arb_user_id(), arb_key())
                .prop_map(|(user_id, key)| StoreOp::Read { user_id, key }),
            2 => (arb_user_id(), arb_key(), arb_value())
                .prop_map(|(user_id, key, value)| StoreOp::Update { user_id, key, value }),
            2 => (arb_user_id(), arb_key())
                .prop_map(|(user_id, key)| StoreOp::Delete { user_id, key }),
            1 => arb_user_id().prop_map(|user_id| StoreOp::GetAll { user_id }),
        ]
    }

    pub fn arb_store_ops(max_len: usize) -> impl Strategy<Value = Vec<StoreOp>> {
        prop::collection::vec(arb_store_op(), 0..max_len)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made stores for every backend.

    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// A fresh in-memory store.
    pub fn memory_store() -> Arc<dyn KeyValueStore> {
        Arc::new(InMemoryStore::new())
    }

    /// The remote adapter over a fresh in-process flat keyspace.
    pub fn memory_adapter() -> Arc<dyn KeyValueStore> {
        Arc::new(RemoteCacheAdapter::new(InMemoryKeyspace::new()))
    }

    /// The remote adapter over a fresh LMDB environment.
    ///
    /// Keep the `TempDir` alive for as long as the store is used.
    pub fn lmdb_adapter() -> (Arc<dyn KeyValueStore>, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let keyspace =
            LmdbKeyspace::open(temp_dir.path(), 10).expect("LMDB keyspace should open");
        (Arc::new(RemoteCacheAdapter::new(keyspace)), temp_dir)
    }

    /// The remote adapter over a keyspace that is always unreachable.
    pub fn unavailable_adapter() -> Arc<RemoteCacheAdapter<FailingKeyspace>> {
        Arc::new(RemoteCacheAdapter::new(FailingKeyspace::unavailable()))
    }

    /// Create every `(key, value)` pair for `user_id`, asserting each succeeds.
    pub async fn seed(store: &dyn KeyValueStore, user_id: &str, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            assert_eq!(
                store.create(Some(user_id), Some(*key), Some(*value)).await,
                StatusCode::Success,
                "seeding {user_id}/{key}"
            );
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over store outcomes.

    use super::*;

    /// Assert that a read found `expected`.
    #[track_caller]
    pub fn assert_read_value(outcome: &(StatusCode, Option<String>), expected: &str) {
        assert_eq!(
            outcome,
            &(StatusCode::Success, Some(expected.to_string())),
            "Expected value {expected:?}"
        );
    }

    /// Assert that a read failed with `status` and carried no value.
    #[track_caller]
    pub fn assert_read_status(outcome: &(StatusCode, Option<String>), status: StatusCode) {
        assert_eq!(outcome.0, status, "Unexpected read status");
        assert!(
            outcome.1.is_none(),
            "Failed read carried a value: {:?}",
            outcome.1
        );
    }

    /// Assert that a snapshot holds exactly `expected`.
    #[track_caller]
    pub fn assert_snapshot(outcome: &(StatusCode, Snapshot), expected: &[(&str, &str)]) {
        assert_eq!(outcome.0, StatusCode::Success, "Unexpected get_all status");
        let expected: Snapshot = expected
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(outcome.1, expected);
    }

    /// Assert that a status is one of the validation failures.
    #[track_caller]
    pub fn assert_validation_failure(status: StatusCode) {
        assert!(
            status.is_validation_failure(),
            "Expected a validation failure, got {status}"
        );
    }
}

// ============================================================================
// CONTRACT SCENARIOS
// ============================================================================

pub mod contract {
    //! Behavior every [`KeyValueStore`] backend must show.
    //!
    //! Scenarios avoid unknown tenants on purpose: the in-memory store
    //! reports `UserNotFound` where remote backends report `KeyNotFound` or
    //! an empty snapshot. Tests of that difference live with each backend.

    use super::assertions::*;
    use super::fixtures::seed;
    use super::*;
    use std::sync::Arc;

    /// Create, duplicate create, read, update, delete, read, get_all.
    pub async fn lifecycle(store: Arc<dyn KeyValueStore>) {
        let u = Some("user1");
        let k = Some("key1");

        assert_eq!(store.create(u, k, Some("value1")).await, StatusCode::Success);
        assert_eq!(
            store.create(u, k, Some("value2")).await,
            StatusCode::KeyAlreadyExists
        );
        assert_read_value(&store.read(u, k).await, "value1");
        assert_eq!(store.update(u, k, Some("value3")).await, StatusCode::Success);
        assert_read_value(&store.read(u, k).await, "value3");
        assert_eq!(store.delete(u, k).await, StatusCode::Success);
        assert_read_status(&store.read(u, k).await, StatusCode::KeyNotFound);
        assert_snapshot(&store.get_all(u).await, &[]);
    }

    /// Every operation checks user id, then key, then value, before state.
    pub async fn validation_precedence(store: Arc<dyn KeyValueStore>) {
        assert_eq!(store.create(None, None, None).await, StatusCode::UserIdIsNull);
        assert_eq!(
            store.create(Some("u"), None, None).await,
            StatusCode::KeyIsNull
        );
        assert_eq!(
            store.create(Some("u"), Some("k"), None).await,
            StatusCode::ValueIsNull
        );
        assert_eq!(store.update(None, Some("k"), None).await, StatusCode::UserIdIsNull);
        assert_eq!(
            store.update(Some("u"), None, Some("v")).await,
            StatusCode::KeyIsNull
        );
        assert_eq!(
            store.update(Some("u"), Some("k"), None).await,
            StatusCode::ValueIsNull
        );
        assert_read_status(&store.read(None, None).await, StatusCode::UserIdIsNull);
        assert_read_status(&store.read(Some("u"), None).await, StatusCode::KeyIsNull);
        assert_eq!(store.delete(None, Some("k")).await, StatusCode::UserIdIsNull);
        assert_eq!(store.delete(Some("u"), None).await, StatusCode::KeyIsNull);

        let (status, snapshot) = store.get_all(None).await;
        assert_eq!(status, StatusCode::UserIdIsNull);
        assert!(snapshot.is_empty());

        // None of the above touched state.
        seed(store.as_ref(), "u", &[("other", "x")]).await;
        assert_snapshot(&store.get_all(Some("u")).await, &[("other", "x")]);
    }

    /// A refused create leaves the original value in place.
    pub async fn duplicate_create_keeps_original(store: Arc<dyn KeyValueStore>) {
        seed(store.as_ref(), "u", &[("k", "first")]).await;

        assert_eq!(
            store.create(Some("u"), Some("k"), Some("second")).await,
            StatusCode::KeyAlreadyExists
        );
        assert_read_value(&store.read(Some("u"), Some("k")).await, "first");
    }

    /// Update and delete of a missing key change nothing.
    pub async fn missing_key_in_known_tenant(store: Arc<dyn KeyValueStore>) {
        seed(store.as_ref(), "u", &[("present", "v")]).await;

        assert_read_status(
            &store.read(Some("u"), Some("absent")).await,
            StatusCode::KeyNotFound,
        );
        assert_eq!(
            store.update(Some("u"), Some("absent"), Some("v")).await,
            StatusCode::KeyNotFound
        );
        assert_eq!(
            store.delete(Some("u"), Some("absent")).await,
            StatusCode::KeyNotFound
        );
        assert_snapshot(&store.get_all(Some("u")).await, &[("present", "v")]);
    }

    /// Update after delete reports `KeyNotFound` and does not recreate the key.
    pub async fn update_after_delete_never_resurrects(store: Arc<dyn KeyValueStore>) {
        seed(store.as_ref(), "u", &[("k", "v1"), ("keep", "x")]).await;

        assert_eq!(store.delete(Some("u"), Some("k")).await, StatusCode::Success);
        assert_eq!(store.delete(Some("u"), Some("k")).await, StatusCode::KeyNotFound);
        assert_eq!(
            store.update(Some("u"), Some("k"), Some("v2")).await,
            StatusCode::KeyNotFound
        );
        assert_read_status(&store.read(Some("u"), Some("k")).await, StatusCode::KeyNotFound);
        assert_snapshot(&store.get_all(Some("u")).await, &[("keep", "x")]);
    }

    /// The same key under different tenants holds independent values.
    pub async fn tenant_isolation(store: Arc<dyn KeyValueStore>) {
        seed(store.as_ref(), "alice", &[("k", "a"), ("only-alice", "1")]).await;
        seed(store.as_ref(), "bob", &[("k", "b")]).await;

        assert_eq!(store.update(Some("alice"), Some("k"), Some("a2")).await, StatusCode::Success);
        assert_eq!(store.delete(Some("bob"), Some("k")).await, StatusCode::Success);

        assert_read_value(&store.read(Some("alice"), Some("k")).await, "a2");
        assert_read_status(&store.read(Some("bob"), Some("k")).await, StatusCode::KeyNotFound);
        assert_read_status(
            &store.read(Some("bob"), Some("only-alice")).await,
            StatusCode::KeyNotFound,
        );
        assert_snapshot(
            &store.get_all(Some("alice")).await,
            &[("k", "a2"), ("only-alice", "1")],
        );
        assert_snapshot(&store.get_all(Some("bob")).await, &[]);
    }

    /// Tenant ids and keys containing separator, escape and glob characters
    /// never bleed into each other.
    pub async fn special_characters(store: Arc<dyn KeyValueStore>) {
        let tenants = ["a:b", "a", "a\\", "a\\:b", "*", "[ab]", "", "ключ"];
        for (i, tenant) in tenants.iter().enumerate() {
            let value = i.to_string();
            seed(store.as_ref(), tenant, &[("b:c", value.as_str()), ("", value.as_str())]).await;
        }

        for (i, tenant) in tenants.iter().enumerate() {
            let value = i.to_string();
            assert_snapshot(
                &store.get_all(Some(*tenant)).await,
                &[("b:c", value.as_str()), ("", value.as_str())],
            );
        }
    }

    /// Empty strings are ordinary, valid values.
    pub async fn empty_strings_are_valid(store: Arc<dyn KeyValueStore>) {
        assert_eq!(store.create(Some(""), Some(""), Some("")).await, StatusCode::Success);
        assert_read_value(&store.read(Some(""), Some("")).await, "");
        assert_eq!(store.update(Some(""), Some(""), Some("x")).await, StatusCode::Success);
        assert_snapshot(&store.get_all(Some("")).await, &[("", "x")]);
    }

    /// A snapshot is owned by the caller and never tracks later writes.
    pub async fn snapshot_is_independent(store: Arc<dyn KeyValueStore>) {
        seed(store.as_ref(), "u", &[("k1", "v1"), ("k2", "v2")]).await;

        let (status, mut snapshot) = store.get_all(Some("u")).await;
        assert_eq!(status, StatusCode::Success);

        snapshot.insert("k3".to_string(), "injected".to_string());
        snapshot.remove("k1");
        assert_eq!(store.update(Some("u"), Some("k2"), Some("changed")).await, StatusCode::Success);

        assert_eq!(snapshot.get("k2").map(String::as_str), Some("v2"));
        assert_snapshot(&store.get_all(Some("u")).await, &[("k1", "v1"), ("k2", "changed")]);
    }

    /// Concurrent creates of one key: exactly one wins and its value sticks.
    pub async fn concurrent_create_single_winner(store: Arc<dyn KeyValueStore>, writers: usize) {
        seed(store.as_ref(), "race", &[("anchor", "x")]).await;

        let mut handles = Vec::with_capacity(writers);
        for i in 0..writers {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let value = format!("writer-{i}");
                let status = store.create(Some("race"), Some("k"), Some(value.as_str())).await;
                (status, value)
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            let (status, value) = handle.await.expect("writer task should not panic");
            match status {
                StatusCode::Success => winners.push(value),
                StatusCode::KeyAlreadyExists => {}
                other => panic!("unexpected create status {other}"),
            }
        }

        assert_eq!(winners.len(), 1, "exactly one create must win: {winners:?}");
        assert_read_value(&store.read(Some("race"), Some("k")).await, &winners[0]);
    }

    /// Concurrent updates racing a delete: once the delete lands, no update
    /// brings the key back.
    pub async fn concurrent_update_and_delete(store: Arc<dyn KeyValueStore>, updaters: usize) {
        seed(store.as_ref(), "race", &[("k", "v0"), ("anchor", "x")]).await;

        let mut handles = Vec::with_capacity(updaters);
        for i in 0..updaters {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let value = format!("update-{i}");
                store.update(Some("race"), Some("k"), Some(value.as_str())).await
            }));
        }
        let deleter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.delete(Some("race"), Some("k")).await })
        };

        for handle in handles {
            let status = handle.await.expect("updater task should not panic");
            assert!(
                matches!(status, StatusCode::Success | StatusCode::KeyNotFound),
                "unexpected update status {status}"
            );
        }
        assert_eq!(
            deleter.await.expect("deleter task should not panic"),
            StatusCode::Success
        );

        assert_read_status(&store.read(Some("race"), Some("k")).await, StatusCode::KeyNotFound);
        assert_snapshot(&store.get_all(Some("race")).await, &[("anchor", "x")]);
    }

    /// Writers on disjoint tenants all succeed and every entry is visible.
    pub async fn concurrent_disjoint_tenants(
        store: Arc<dyn KeyValueStore>,
        tenants: usize,
        keys_per_tenant: usize,
    ) {
        let mut handles = Vec::with_capacity(tenants);
        for t in 0..tenants {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let user_id = format!("tenant-{t}");
                for k in 0..keys_per_tenant {
                    let key = format!("key-{k}");
                    let status = store
                        .create(Some(user_id.as_str()), Some(key.as_str()), Some(user_id.as_str()))
                        .await;
                    assert_eq!(status, StatusCode::Success);
                }
            }));
        }
        for handle in handles {
            handle.await.expect("writer task should not panic");
        }

        for t in 0..tenants {
            let user_id = format!("tenant-{t}");
            let (status, snapshot) = store.get_all(Some(user_id.as_str())).await;
            assert_eq!(status, StatusCode::Success);
            assert_eq!(snapshot.len(), keys_per_tenant);
            assert!(snapshot.values().all(|v| v == &user_id));
        }
    }

    /// Run every single-threaded scenario against fresh stores from `make`.
    pub async fn run_all<F>(make: F)
    where
        F: Fn() -> Arc<dyn KeyValueStore>,
    {
        lifecycle(make()).await;
        validation_precedence(make()).await;
        duplicate_create_keeps_original(make()).await;
        missing_key_in_known_tenant(make()).await;
        update_after_delete_never_resurrects(make()).await;
        tenant_isolation(make()).await;
        special_characters(make()).await;
        empty_strings_are_valid(make()).await;
        snapshot_is_independent(make()).await;
    }
}

// ============================================================================
// TESTS
// ============================================================================
