//! Tenant-scoped storage keys for flat keyspaces.
//!
//! A storage key is `escaped(user_id) ':' key`. User ids are opaque and may
//! contain the separator, so the tenant component is escaped (`\` → `\\`,
//! `:` → `\:`). The first unescaped `:` always ends the tenant component,
//! which gives two guarantees every remote backend relies on:
//!
//! - distinct (user_id, key) pairs never encode to the same storage key
//! - a tenant's prefix never prefixes a storage key of another tenant
//!
//! Keys are appended verbatim; everything after the first unescaped `:`
//! belongs to the key.

/// Separator between the tenant component and the key.
pub const SEPARATOR: char = ':';

const ESCAPE: char = '\\';

/// The storage-key prefix shared by every entry of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantPrefix {
    encoded: String,
}

impl TenantPrefix {
    /// Build the prefix for a tenant.
    pub fn new(user_id: &str) -> Self {
        let mut encoded = String::with_capacity(user_id.len() + 1);
        for c in user_id.chars() {
            if c == ESCAPE || c == SEPARATOR {
                encoded.push(ESCAPE);
            }
            encoded.push(c);
        }
        encoded.push(SEPARATOR);
        Self { encoded }
    }

    /// The encoded prefix, separator included.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Scope `key` to this tenant.
    pub fn key_for(&self, key: &str) -> TenantScopedKey {
        let mut encoded = String::with_capacity(self.encoded.len() + key.len());
        encoded.push_str(&self.encoded);
        encoded.push_str(key);
        TenantScopedKey {
            inner: TenantKeyInner {
                encoded,
                key_start: self.encoded.len(),
            },
        }
    }

    /// Recover the tenant-local key from a storage key under this prefix.
    ///
    /// Returns `None` for storage keys belonging to any other tenant.
    pub fn strip<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        storage_key.strip_prefix(self.encoded.as_str())
    }

    /// A Redis glob pattern matching every storage key under this prefix.
    ///
    /// Glob metacharacters in the prefix (including the escape backslashes
    /// added for the user id) are themselves escaped.
    pub fn glob_pattern(&self) -> String {
        prefix_glob(&self.encoded)
    }
}

/// A Redis glob pattern matching every key that starts with `prefix`.
pub fn prefix_glob(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() * 2 + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// A storage key scoped to a specific tenant.
///
/// The private inner struct means a `TenantScopedKey` can only be built
/// through [`TenantScopedKey::new`] or [`TenantPrefix::key_for`], both of
/// which escape the tenant component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantScopedKey {
    inner: TenantKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TenantKeyInner {
    encoded: String,
    key_start: usize,
}

impl TenantScopedKey {
    /// Create the storage key for `key` in the namespace of `user_id`.
    pub fn new(user_id: &str, key: &str) -> Self {
        TenantPrefix::new(user_id).key_for(key)
    }

    /// The encoded storage key.
    pub fn encode(&self) -> &str {
        &self.inner.encoded
    }

    /// The tenant-local key.
    pub fn key(&self) -> &str {
        &self.inner.encoded[self.inner.key_start..]
    }
}

impl std::fmt::Display for TenantScopedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_encoding() {
        let key = TenantScopedKey::new("user1", "key1");
        assert_eq!(key.encode(), "user1:key1");
        assert_eq!(key.key(), "key1");
        assert_eq!(key.to_string(), "user1:key1");
    }

    #[test]
    fn test_separator_in_user_id_is_escaped() {
        assert_eq!(TenantScopedKey::new("a:b", "c").encode(), "a\\:b:c");
        assert_eq!(TenantScopedKey::new("a", "b:c").encode(), "a:b:c");
        assert_ne!(
            TenantScopedKey::new("a:b", "c").encode(),
            TenantScopedKey::new("a", "b:c").encode()
        );
    }

    #[test]
    fn test_escape_in_user_id_is_escaped() {
        assert_eq!(TenantScopedKey::new("a\\", "k").encode(), "a\\\\:k");
        assert_ne!(
            TenantScopedKey::new("a\\", ":k").encode(),
            TenantScopedKey::new("a\\:", "k").encode()
        );
    }

    #[test]
    fn test_empty_components() {
        let key = TenantScopedKey::new("", "");
        assert_eq!(key.encode(), ":");
        assert_eq!(key.key(), "");
        assert_eq!(TenantPrefix::new("").strip(key.encode()), Some(""));
    }

    #[test]
    fn test_strip_own_prefix_only() {
        let prefix = TenantPrefix::new("user");
        assert_eq!(prefix.strip("user:key"), Some("key"));
        assert_eq!(prefix.strip("user2:key"), None);
        assert_eq!(prefix.strip("use:key"), None);

        let prefix = TenantPrefix::new("a");
        // Storage key of tenant "a:b".
        assert_eq!(prefix.strip("a\\:b:key"), None);
    }

    #[test]
    fn test_glob_pattern_escapes_metacharacters() {
        assert_eq!(TenantPrefix::new("user1").glob_pattern(), "user1:*");
        assert_eq!(TenantPrefix::new("u*?[x]").glob_pattern(), "u\\*\\?\\[x\\]:*");
        // "a:b" encodes to `a\:b:`; the escape backslash is itself escaped.
        assert_eq!(TenantPrefix::new("a:b").glob_pattern(), "a\\\\:b:*");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    /// Strings biased towards the characters that matter for the encoding.
    fn component_strategy() -> impl Strategy<Value = String> {
        "[a-c:\\\\*]{0,8}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        /// No two distinct (user_id, key) pairs share a storage key.
        #[test]
        fn prop_encoding_is_injective(
            first in (component_strategy(), component_strategy()),
            second in (component_strategy(), component_strategy()),
        ) {
            let a = TenantScopedKey::new(&first.0, &first.1);
            let b = TenantScopedKey::new(&second.0, &second.1);
            prop_assert_eq!(a.key(), first.1.as_str());
            prop_assert_eq!(a.encode() == b.encode(), first == second);
        }

        /// A tenant's prefix matches its own keys and never another tenant's.
        #[test]
        fn prop_prefix_isolates_tenants(
            owner in component_strategy(),
            other in component_strategy(),
            key in component_strategy(),
        ) {
            let storage_key = TenantScopedKey::new(&other, &key);
            let stripped = TenantPrefix::new(&owner).strip(storage_key.encode());
            if owner == other {
                prop_assert_eq!(stripped, Some(key.as_str()));
            } else {
                prop_assert_eq!(stripped, None);
            }
        }
    }
}
