//! In-memory store implementation.
//!
//! Namespaces live in a two-level map (tenant → key → value) guarded by one
//! shared-exclusive lock. Read and GetAll take the lock shared; Create,
//! Update and Delete take it exclusive. Every path touching a given
//! (tenant, key) pair goes through the same lock, so operations on one pair
//! are linearizable.
//!
//! A tenant's namespace is created by its first Create and is kept even
//! after its last entry is deleted: an empty namespace still answers
//! `KeyNotFound`/`Success` where an unknown tenant answers `UserNotFound`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use tenantkv_core::{validate_entry, validate_key, validate_tenant, StatusCode};
use tokio::sync::RwLock;

use crate::{KeyValueStore, Snapshot};

type Namespace = HashMap<String, String>;

/// Process-local concurrent key-value store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tenants: RwLock<HashMap<String, Namespace>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tenants that have ever created an entry (since the last clear).
    pub async fn tenant_count(&self) -> usize {
        self.tenants.read().await.len()
    }

    /// Number of live entries for a tenant, or `None` for an unknown tenant.
    pub async fn entry_count(&self, user_id: &str) -> Option<usize> {
        self.tenants.read().await.get(user_id).map(HashMap::len)
    }

    /// Drop every tenant and entry.
    pub async fn clear(&self) {
        self.tenants.write().await.clear();
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
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

        let mut tenants = self.tenants.write().await;
        let namespace = tenants.entry(entry.user_id.to_owned()).or_default();
        let status = match namespace.entry(entry.key.to_owned()) {
            Entry::Occupied(_) => StatusCode::KeyAlreadyExists,
            Entry::Vacant(slot) => {
                slot.insert(entry.value.to_owned());
                StatusCode::Success
            }
        };
        drop(tenants);

        tracing::debug!(user_id = %entry.user_id, key = %entry.key, %status, "create");
        status
    }

    async fn read(&self, user_id: Option<&str>, key: Option<&str>) -> (StatusCode, Option<String>) {
        let target = match validate_key(user_id, key) {
            Ok(target) => target,
            Err(status) => return (status, None),
        };

        let tenants = self.tenants.read().await;
        let outcome = match tenants.get(target.user_id) {
            None => (StatusCode::UserNotFound, None),
            Some(namespace) => match namespace.get(target.key) {
                Some(value) => (StatusCode::Success, Some(value.clone())),
                None => (StatusCode::KeyNotFound, None),
            },
        };
        drop(tenants);

        tracing::debug!(user_id = %target.user_id, key = %target.key, status = %outcome.0, "read");
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

        let mut tenants = self.tenants.write().await;
        let status = match tenants.get_mut(entry.user_id) {
            None => StatusCode::UserNotFound,
            Some(namespace) => match namespace.get_mut(entry.key) {
                Some(current) => {
                    *current = entry.value.to_owned();
                    StatusCode::Success
                }
                None => StatusCode::KeyNotFound,
            },
        };
        drop(tenants);

        tracing::debug!(user_id = %entry.user_id, key = %entry.key, %status, "update");
        status
    }

    async fn delete(&self, user_id: Option<&str>, key: Option<&str>) -> StatusCode {
        let target = match validate_key(user_id, key) {
            Ok(target) => target,
            Err(status) => return status,
        };

        let mut tenants = self.tenants.write().await;
        // The namespace stays in place even when this removes its last entry.
        let status = match tenants.get_mut(target.user_id) {
            None => StatusCode::UserNotFound,
            Some(namespace) => match namespace.remove(target.key) {
                Some(_) => StatusCode::Success,
                None => StatusCode::KeyNotFound,
            },
        };
        drop(tenants);

        tracing::debug!(user_id = %target.user_id, key = %target.key, %status, "delete");
        status
    }

    async fn get_all(&self, user_id: Option<&str>) -> (StatusCode, Snapshot) {
        let user_id = match validate_tenant(user_id) {
            Ok(user_id) => user_id,
            Err(status) => return (status, Snapshot::new()),
        };

        let snapshot = self.tenants.read().await.get(user_id).cloned();
        let outcome = match snapshot {
            Some(namespace) => (StatusCode::Success, namespace),
            None => (StatusCode::UserNotFound, Snapshot::new()),
        };

        tracing::debug!(user_id = %user_id, entries = outcome.1.len(), status = %outcome.0, "get_all");
        outcome
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone)]
    enum Op {
        Create(String, String),
        Update(String, String),
        Delete(String),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let key = prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")].prop_map(String::from);
        prop_oneof![
            (key.clone(), "[a-z]{0,6}").prop_map(|(k, v)| Op::Create(k, v)),
            (key.clone(), "[a-z]{0,6}").prop_map(|(k, v)| Op::Update(k, v)),
            key.prop_map(Op::Delete),
        ]
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// GetAll returns exactly the live entries, matching a plain map driven
        /// by the same sequence of operations.
        #[test]
        fn prop_get_all_matches_model(ops in proptest::collection::vec(op_strategy(), 1..40)) {
            let store = InMemoryStore::new();
            let mut model: HashMap<String, String> = HashMap::new();

            block_on(async {
                for op in &ops {
                    match op {
                        Op::Create(k, v) => {
                            let status = store.create(Some("t"), Some(k.as_str()), Some(v.as_str())).await;
                            if model.contains_key(k) {
                                assert_eq!(status, StatusCode::KeyAlreadyExists);
                            } else {
                                assert_eq!(status, StatusCode::Success);
                                model.insert(k.clone(), v.clone());
                            }
                        }
                        Op::Update(k, v) => {
                            let status = store.update(Some("t"), Some(k.as_str()), Some(v.as_str())).await;
                            if let Some(current) = model.get_mut(k) {
                                assert_eq!(status, StatusCode::Success);
                                *current = v.clone();
                            } else {
                                assert_ne!(status, StatusCode::Success);
                            }
                        }
                        Op::Delete(k) => {
                            let status = store.delete(Some("t"), Some(k.as_str())).await;
                            let expected = if model.remove(k).is_some() {
                                StatusCode::Success
                            } else if store.entry_count("t").await.is_some() {
                                StatusCode::KeyNotFound
                            } else {
                                StatusCode::UserNotFound
                            };
                            assert_eq!(status, expected);
                        }
                    }
                }
            });

            let (status, all) = block_on(store.get_all(Some("t")));
            if status == StatusCode::Success {
                prop_assert_eq!(all, model);
            } else {
                prop_assert_eq!(status, StatusCode::UserNotFound);
                prop_assert!(model.is_empty());
            }
        }
    }
}
