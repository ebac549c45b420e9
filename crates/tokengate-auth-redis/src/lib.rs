//! # tokengate-auth-redis
//!
//! Redis [`CacheStore`] backend for `tokengate-auth`.
//!
//! Backs the identity cache with a shared Redis instance so that all
//! service instances observe the same verified identities. Expiry is
//! native (`SETEX`), so the background sweep is a no-op.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokengate_auth::{AuthCacheConfig, AuthCoordinator};
//! use tokengate_auth_redis::RedisCacheStore;
//!
//! let store = Arc::new(RedisCacheStore::from_url("redis://127.0.0.1:6379")?);
//! let coordinator = AuthCoordinator::new(&config, store, provider)?;
//! ```

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;

use tokengate_auth::{AuthError, AuthResult, CacheStore};

/// Redis-backed cache store.
///
/// All operations surface transport failures as [`AuthError::Storage`];
/// the identity cache degrades read failures to a miss, so a Redis
/// outage slows authentication down to provider speed but never fails it.
#[derive(Debug)]
pub struct RedisCacheStore {
    pool: Pool,
}

impl RedisCacheStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Creates a store from a Redis connection URL.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the URL is invalid or the
    /// pool cannot be created. No connection is attempted here; transport
    /// failures surface per-operation.
    pub fn from_url(url: &str) -> AuthResult<Self> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| AuthError::configuration(format!("invalid Redis config: {}", e)))?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> AuthResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| AuthError::storage(format!("failed to get Redis connection: {}", e)))
    }

    /// Checks connectivity, for health probes.
    pub async fn ping(&self) -> bool {
        match self.connection().await {
            Ok(mut conn) => redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> AuthResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(|e| {
            tracing::warn!(key = %key, error = %e, "Redis GET error");
            AuthError::storage(e.to_string())
        })
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AuthResult<()> {
        let mut conn = self.connection().await?;
        // SETEX rejects a zero expiry; clamp to the minimum resolution
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| {
                tracing::warn!(key = %key, error = %e, "Redis SETEX error");
                AuthError::storage(e.to_string())
            })
    }

    async fn delete(&self, key: &str) -> AuthResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(|e| {
            tracing::warn!(key = %key, error = %e, "Redis DEL error");
            AuthError::storage(e.to_string())
        })
    }

    // Redis expires entries natively; the default no-op sweep applies.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url_rejects_invalid_url() {
        let err = RedisCacheStore::from_url("not a redis url").unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[test]
    fn test_from_url_accepts_redis_scheme() {
        assert!(RedisCacheStore::from_url("redis://127.0.0.1:6379").is_ok());
    }

    #[tokio::test]
    async fn test_operations_fail_cleanly_without_server() {
        // Pool creation is lazy; operations against a dead address must
        // surface Storage errors, which the identity cache degrades.
        let store = RedisCacheStore::from_url("redis://127.0.0.1:1").unwrap();

        assert!(matches!(
            store.get("k").await,
            Err(AuthError::Storage { .. })
        ));
        assert!(matches!(
            store.set_ex("k", b"v".to_vec(), Duration::from_secs(60)).await,
            Err(AuthError::Storage { .. })
        ));
        assert!(matches!(
            store.delete("k").await,
            Err(AuthError::Storage { .. })
        ));
        assert!(!store.ping().await);
    }
}
