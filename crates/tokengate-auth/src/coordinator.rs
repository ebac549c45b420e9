//! Verification coordinator.
//!
//! Orchestrates the three verification tiers: local signature check,
//! identity cache lookup, and the deduplicated identity provider call.
//! The cached result is a performance shortcut only; the provider's
//! verdict always wins, which is why cache TTLs must stay shorter than
//! the tolerated revocation-propagation delay.
//!
//! # Concurrency
//!
//! Safe under arbitrary interleaving. For a given subject, at most one
//! provider call is in flight per process: the first caller to miss the
//! cache becomes the leader and performs the call, concurrent callers for
//! the same subject wait on the leader's result. Deduplication is
//! per-instance; across instances the shared cache store converges after
//! the first write-back (no distributed lock is assumed).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokengate_auth::{AuthCacheConfig, AuthCoordinator, MemoryCacheStore};
//! use tokengate_auth::provider::HttpIdentityProvider;
//!
//! let config = AuthCacheConfig::default();
//! let provider = Arc::new(HttpIdentityProvider::from_config(&config.provider)?);
//! let coordinator = Arc::new(AuthCoordinator::new(
//!     &config,
//!     Arc::new(MemoryCacheStore::new()),
//!     provider,
//! )?);
//!
//! let identity = coordinator.authenticate(token, client_ip).await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::{CacheStore, IdentityCache};
use crate::config::{AuthCacheConfig, RetryPolicy};
use crate::error::AuthError;
use crate::metrics;
use crate::provider::{IdentityProvider, ProviderError};
use crate::rate_limit::RateLimiter;
use crate::token::{TokenVerifier, VerifyError};
use crate::types::{AuthOutcome, CachedIdentity};
use crate::AuthResult;

/// Result of one provider round trip, shared between the leader and its
/// waiters.
#[derive(Debug, Clone)]
enum ProviderOutcome {
    Verified(CachedIdentity),
    Rejected,
    Unavailable(String),
}

/// Role assigned to a caller that missed the cache.
enum Role {
    /// Performs the provider call and publishes the outcome.
    Leader(watch::Sender<Option<ProviderOutcome>>),
    /// Waits for the leader's outcome.
    Waiter(watch::Receiver<Option<ProviderOutcome>>),
}

/// Coordinates tiered token verification.
///
/// Construct once at service startup from configuration and explicit
/// store/provider handles; share via `Arc`. Tear down by dropping (and
/// aborting the sweeper handle, if one was spawned).
pub struct AuthCoordinator {
    verifier: TokenVerifier,
    cache: IdentityCache,
    provider: Arc<dyn IdentityProvider>,
    limiter: RateLimiter,
    in_flight: DashMap<String, watch::Receiver<Option<ProviderOutcome>>>,
    provider_timeout: Duration,
    retry: RetryPolicy,
    sweep_interval: Duration,
}

impl AuthCoordinator {
    /// Creates a coordinator.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated against [`AuthCacheConfig::validate`]
    /// * `store` - Shared cache store backend
    /// * `provider` - Identity provider client
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the configuration is
    /// invalid.
    pub fn new(
        config: &AuthCacheConfig,
        store: Arc<dyn CacheStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let verifier = TokenVerifier::from_config(&config.signing)
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        Ok(Self {
            verifier,
            cache: IdentityCache::new(store, config.cache.key_prefix.clone(), config.cache.ttl),
            provider,
            limiter: RateLimiter::new(&config.rate_limit),
            in_flight: DashMap::new(),
            provider_timeout: config.provider.timeout,
            retry: config.provider.retry.clone(),
            sweep_interval: config.cache.sweep_interval,
        })
    }

    /// Authenticates a bearer token.
    ///
    /// `client_key` identifies the caller for rate limiting (for example
    /// the network origin); it is independent of the token's subject.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TooManyRequests`] before any token parsing when the
    ///   client exceeded its window
    /// - [`AuthError::Unauthorized`] for malformed, forged, expired, or
    ///   provider-rejected tokens
    /// - [`AuthError::ServiceUnavailable`] when the provider could not be
    ///   consulted; callers may retry
    pub async fn authenticate(&self, token: &str, client_key: &str) -> AuthResult<CachedIdentity> {
        let started = Instant::now();

        if !self.limiter.allow(client_key) {
            metrics::record_outcome(AuthOutcome::RateLimited, started.elapsed());
            return Err(AuthError::TooManyRequests);
        }

        let claims = match self.verifier.verify(token) {
            Ok(claims) => claims,
            Err(e) => {
                let outcome = match e {
                    VerifyError::Expired => AuthOutcome::Expired,
                    _ => AuthOutcome::Invalid,
                };
                tracing::debug!(error = %e, "local verification failed");
                metrics::record_outcome(outcome, started.elapsed());
                return Err(AuthError::unauthorized(e.to_string()));
            }
        };

        if let Some(identity) = self.cache.get(&claims.sub).await {
            tracing::debug!(subject = %claims.sub, "cache hit");
            metrics::record_outcome(AuthOutcome::CacheHit, started.elapsed());
            return Ok(identity);
        }

        match self.verify_with_provider(&claims.sub, token).await {
            ProviderOutcome::Verified(identity) => {
                metrics::record_outcome(AuthOutcome::ProviderVerified, started.elapsed());
                Ok(identity)
            }
            ProviderOutcome::Rejected => {
                tracing::debug!(subject = %claims.sub, "provider rejected token");
                metrics::record_outcome(AuthOutcome::Invalid, started.elapsed());
                Err(AuthError::unauthorized("token rejected by identity provider"))
            }
            ProviderOutcome::Unavailable(message) => {
                metrics::record_outcome(AuthOutcome::ProviderError, started.elapsed());
                Err(AuthError::service_unavailable(message))
            }
        }
    }

    /// Evicts the cached identity for `subject_id` unconditionally.
    ///
    /// Call when an upstream event indicates the subject's credentials
    /// changed; the next authentication triggers a fresh provider call.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the eviction could not be
    /// performed.
    pub async fn invalidate(&self, subject_id: &str) -> AuthResult<()> {
        self.cache.delete(subject_id).await
    }

    /// Resolves a cache miss through the provider, deduplicating
    /// concurrent misses for the same subject.
    async fn verify_with_provider(&self, subject: &str, token: &str) -> ProviderOutcome {
        match self.join_in_flight(subject) {
            Role::Waiter(mut rx) => {
                tracing::debug!(subject = %subject, "waiting on in-flight verification");
                loop {
                    if let Some(outcome) = rx.borrow_and_update().clone() {
                        return outcome;
                    }
                    if rx.changed().await.is_err() {
                        // Leader died without publishing. Clear the stale
                        // marker so the subject is not poisoned.
                        self.in_flight
                            .remove_if(subject, |_, rx| rx.has_changed().is_err());
                        return ProviderOutcome::Unavailable(
                            "in-flight verification failed".to_string(),
                        );
                    }
                }
            }
            Role::Leader(tx) => {
                let outcome = self.lead_verification(token).await;
                // Remove the marker before publishing so late arrivals
                // start a fresh verification instead of joining a
                // completed one.
                self.in_flight.remove(subject);
                let _ = tx.send(Some(outcome.clone()));
                outcome
            }
        }
    }

    /// Registers this caller in the in-flight map, returning its role.
    fn join_in_flight(&self, subject: &str) -> Role {
        match self.in_flight.entry(subject.to_string()) {
            Entry::Occupied(entry) => Role::Waiter(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx);
                Role::Leader(tx)
            }
        }
    }

    /// Performs the provider round trip as the leader, applying the
    /// timeout bound and retry policy, and writes back on success.
    async fn lead_verification(&self, token: &str) -> ProviderOutcome {
        let mut attempt = 1u32;
        loop {
            let call_started = Instant::now();
            let result =
                tokio::time::timeout(self.provider_timeout, self.provider.verify_remote(token))
                    .await;
            metrics::record_provider_call(call_started.elapsed());

            let (outcome, retryable) = match result {
                Ok(Ok(canonical)) => {
                    let identity =
                        CachedIdentity::from_canonical(canonical, OffsetDateTime::now_utc());
                    self.cache.store(&identity).await;
                    (ProviderOutcome::Verified(identity), false)
                }
                Ok(Err(ProviderError::Rejected)) => (ProviderOutcome::Rejected, false),
                Ok(Err(ProviderError::RateLimited)) => (
                    ProviderOutcome::Unavailable(
                        "identity provider rate limited the request".to_string(),
                    ),
                    false,
                ),
                Ok(Err(ProviderError::Unreachable { message })) => {
                    (ProviderOutcome::Unavailable(message), true)
                }
                Err(_) => (
                    ProviderOutcome::Unavailable("provider call timed out".to_string()),
                    true,
                ),
            };

            if retryable && attempt < self.retry.max_attempts {
                tracing::debug!(attempt, "retrying provider call after transient failure");
                tokio::time::sleep(self.retry.backoff).await;
                attempt += 1;
                continue;
            }

            return outcome;
        }
    }

    /// Spawns the background sweeper.
    ///
    /// Periodically reclaims expired cache entries (a no-op for
    /// TTL-native backends) and prunes stale rate-limit windows. Abort
    /// the returned handle at shutdown.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let coordinator = self;
        let interval = coordinator.sweep_interval;
        tracing::info!(interval_secs = interval.as_secs(), "starting cache sweeper");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match coordinator.cache.sweep().await {
                    Ok(removed) if removed > 0 => {
                        tracing::debug!(removed, "swept expired cache entries");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "cache sweep failed"),
                }
                if let Some(count) = coordinator.cache.entry_count() {
                    metrics::set_cache_entries(count);
                }

                let pruned = coordinator.limiter.prune_stale();
                if pruned > 0 {
                    tracing::debug!(pruned, "pruned stale rate-limit windows");
                }
                metrics::set_rate_limit_tracked_keys(coordinator.limiter.tracked_keys());
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
