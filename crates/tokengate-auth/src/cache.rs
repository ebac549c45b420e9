//! Identity cache: storage trait, in-memory backend, and the typed
//! cache wrapper used by the coordinator.
//!
//! The store interface is bytes-level and implementation-agnostic; any
//! shared key-value store with expiring writes can back it. A Redis
//! backend lives in the `tokengate-auth-redis` crate.
//!
//! Corrupt or unreadable cache entries never fail an authentication:
//! they degrade to a miss and the subject is re-verified.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::AuthResult;
use crate::types::CachedIdentity;

// =============================================================================
// Cache Store Trait
// =============================================================================

/// Bytes-level key-value store with expiring writes.
///
/// # Implementations
///
/// - [`MemoryCacheStore`] - single-instance, in-process
/// - `RedisCacheStore` (in `tokengate-auth-redis`) - shared across
///   service instances
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads the value stored under `key`, or `None` on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached. Callers on the
    /// authentication path treat errors as misses.
    async fn get(&self, key: &str) -> AuthResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AuthResult<()>;

    /// Deletes the entry under `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn delete(&self, key: &str) -> AuthResult<()>;

    /// Reclaims entries whose TTL has elapsed, returning the number
    /// removed.
    ///
    /// Advisory only: backends with native expiry may leave this as the
    /// default no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn sweep_expired(&self) -> AuthResult<u64> {
        Ok(0)
    }

    /// Number of entries currently held, when the backend can answer
    /// cheaply. Used for gauges only.
    fn entry_count(&self) -> Option<usize> {
        None
    }
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
struct CachedEntry {
    data: Vec<u8>,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Single-instance in-memory cache store.
///
/// Expired entries are filtered on read and reclaimed by
/// [`sweep_expired`](CacheStore::sweep_expired).
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CachedEntry>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, including not-yet-swept expired
    /// ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> AuthResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data.clone()))
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AuthResult<()> {
        self.entries
            .insert(key.to_string(), CachedEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> AuthResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn sweep_expired(&self) -> AuthResult<u64> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        Ok((before - self.entries.len()) as u64)
    }

    fn entry_count(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

// =============================================================================
// Identity Cache
// =============================================================================

/// Typed identity cache over a [`CacheStore`].
///
/// Owns key namespacing, serialization of [`CachedIdentity`] records, and
/// the freshness guard on writes. Reads degrade to a miss on any backend
/// or decode failure.
pub struct IdentityCache {
    store: Arc<dyn CacheStore>,
    key_prefix: String,
    ttl: Duration,
}

impl IdentityCache {
    /// Creates a new identity cache.
    ///
    /// # Arguments
    ///
    /// * `store` - Backing key-value store
    /// * `key_prefix` - Namespace prefix for all keys
    /// * `ttl` - Entry lifetime; must be shorter than the tolerated
    ///   revocation-propagation delay
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    fn key(&self, subject_id: &str) -> String {
        format!("{}:identity:{}", self.key_prefix, subject_id)
    }

    /// Looks up the cached identity for `subject_id`.
    ///
    /// Backend errors and undecodable entries are logged and reported as
    /// a miss; authentication then falls through to the provider.
    pub async fn get(&self, subject_id: &str) -> Option<CachedIdentity> {
        let key = self.key(subject_id);
        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(subject = %subject_id, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<CachedIdentity>(&bytes) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::warn!(subject = %subject_id, error = %e, "corrupt cache entry, treating as miss");
                None
            }
        }
    }

    /// Writes a verified identity, unless the stored record is already as
    /// fresh or fresher.
    ///
    /// The read-compare-write is not atomic across service instances; the
    /// TTL bounds how long a theoretical regression could survive. Write
    /// failures are logged and swallowed: the caller already holds a
    /// verified identity and must not fail on a cache problem.
    pub async fn store(&self, identity: &CachedIdentity) {
        if let Some(existing) = self.get(&identity.subject_id).await
            && !identity.is_fresher_than(&existing)
        {
            tracing::debug!(
                subject = %identity.subject_id,
                "skipping cache write, stored entry is fresher"
            );
            return;
        }

        let key = self.key(&identity.subject_id);
        let bytes = match serde_json::to_vec(identity) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(subject = %identity.subject_id, error = %e, "failed to serialize identity");
                return;
            }
        };

        if let Err(e) = self.store.set_ex(&key, bytes, self.ttl).await {
            tracing::warn!(subject = %identity.subject_id, error = %e, "cache write failed");
        } else {
            tracing::debug!(
                subject = %identity.subject_id,
                ttl_secs = self.ttl.as_secs(),
                "identity cached"
            );
        }
    }

    /// Deletes the cached identity for `subject_id` unconditionally.
    ///
    /// # Errors
    ///
    /// Unlike reads, a failed delete is surfaced: the caller asked for an
    /// eviction and must know it did not happen.
    pub async fn delete(&self, subject_id: &str) -> AuthResult<()> {
        self.store.delete(&self.key(subject_id)).await?;
        tracing::debug!(subject = %subject_id, "identity invalidated");
        Ok(())
    }

    /// Reclaims expired entries from the backing store.
    pub async fn sweep(&self) -> AuthResult<u64> {
        self.store.sweep_expired().await
    }

    /// Entry count of the backing store, when it can answer cheaply.
    #[must_use]
    pub fn entry_count(&self) -> Option<usize> {
        self.store.entry_count()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use time::OffsetDateTime;

    fn identity(subject: &str, verified_unix: i64) -> CachedIdentity {
        CachedIdentity {
            subject_id: subject.to_string(),
            email: Some("a@b.com".to_string()),
            created_at: OffsetDateTime::from_unix_timestamp(verified_unix).unwrap(),
            last_verified_at: OffsetDateTime::from_unix_timestamp(verified_unix).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryCacheStore::new();

        store
            .set_ex("k1", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k1").await.unwrap(), Some(b"value".to_vec()));

        store.delete("k1").await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_expiry() {
        let store = MemoryCacheStore::new();

        store
            .set_ex("k1", b"value".to_vec(), Duration::ZERO)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k1").await.unwrap(), None);

        // Entry still occupies memory until swept
        assert_eq!(store.len(), 1);
        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_identity_cache_roundtrip() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = IdentityCache::new(store, "test", Duration::from_secs(60));

        let id = identity("u123", 1_700_000_000);
        cache.store(&id).await;

        let got = cache.get("u123").await.unwrap();
        assert_eq!(got, id);
        assert_eq!(cache.get("other").await, None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(MemoryCacheStore::new());
        store
            .set_ex(
                "test:identity:u123",
                b"{not json".to_vec(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let cache = IdentityCache::new(store, "test", Duration::from_secs(60));
        assert_eq!(cache.get("u123").await, None);
    }

    #[tokio::test]
    async fn test_stale_write_does_not_clobber() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = IdentityCache::new(store, "test", Duration::from_secs(60));

        let fresh = identity("u123", 1_700_000_100);
        let stale = identity("u123", 1_700_000_000);

        cache.store(&fresh).await;
        cache.store(&stale).await;

        let got = cache.get("u123").await.unwrap();
        assert_eq!(got.last_verified_at, fresh.last_verified_at);
    }

    #[tokio::test]
    async fn test_equal_timestamp_write_is_skipped() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = IdentityCache::new(store, "test", Duration::from_secs(60));

        let first = identity("u123", 1_700_000_000);
        let mut second = identity("u123", 1_700_000_000);
        second.email = Some("changed@b.com".to_string());

        cache.store(&first).await;
        cache.store(&second).await;

        let got = cache.get("u123").await.unwrap();
        assert_eq!(got.email.as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn test_newer_write_replaces() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = IdentityCache::new(store, "test", Duration::from_secs(60));

        cache.store(&identity("u123", 1_700_000_000)).await;
        let newer = identity("u123", 1_700_000_200);
        cache.store(&newer).await;

        let got = cache.get("u123").await.unwrap();
        assert_eq!(got.last_verified_at, newer.last_verified_at);
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = IdentityCache::new(store, "test", Duration::from_secs(60));

        cache.store(&identity("u123", 1_700_000_000)).await;
        cache.delete("u123").await.unwrap();
        assert_eq!(cache.get("u123").await, None);
    }

    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &str) -> AuthResult<Option<Vec<u8>>> {
            Err(AuthError::storage("backend down"))
        }

        async fn set_ex(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> AuthResult<()> {
            Err(AuthError::storage("backend down"))
        }

        async fn delete(&self, _key: &str) -> AuthResult<()> {
            Err(AuthError::storage("backend down"))
        }
    }

    #[tokio::test]
    async fn test_backend_errors_degrade_on_read_and_write() {
        let cache = IdentityCache::new(Arc::new(FailingStore), "test", Duration::from_secs(60));

        // Read error is a miss, write error is swallowed
        assert_eq!(cache.get("u123").await, None);
        cache.store(&identity("u123", 1_700_000_000)).await;

        // Delete error is surfaced
        assert!(cache.delete("u123").await.is_err());
    }
}
