use async_trait::async_trait;

use crate::error::KvError;

/// A value read back from the store together with its opaque CAS token.
///
/// `modify_index` has no meaning beyond equality comparison: callers must
/// never sort, hash across stores, or arithmetic-compare it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub value: String,
    pub modify_index: u64,
}

/// Façade over the external key-value store.
///
/// `Cas` is the only conflict-free mutation primitive in this system; a
/// `false` return means the caller's `modify_index` was stale and it must
/// refetch with `get` before retrying. Everything else — `create`, timers,
/// reconcile loops — is built on top of that guarantee.
#[async_trait]
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, KvError>;

    /// Keys are returned in a store-defined but stable order (typically
    /// lexicographic); callers that care about a specific order must sort.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError>;

    /// Idempotent placeholder creation: if `key` is absent, creates it with
    /// an empty value and returns the fresh `StoredValue`; if present,
    /// returns the existing one unchanged.
    async fn create(&self, key: &str) -> Result<StoredValue, KvError>;

    /// Compare-and-swap: succeeds iff the stored `modify_index` at `key`
    /// equals `expected_index`. Returns `Ok(true)` on success, `Ok(false)`
    /// on a version mismatch (the caller should refetch and retry).
    async fn cas(&self, key: &str, value: String, expected_index: u64) -> Result<bool, KvError>;

    /// Deletes every key under `prefix`. Returns `true` if anything was
    /// deleted, `false` if the prefix was already empty.
    async fn delete_tree(&self, prefix: &str) -> Result<bool, KvError>;
}
