//! # tokengate-auth
//!
//! Tiered authentication-verification cache.
//!
//! This crate sits between inbound requests carrying a signed bearer
//! token and an external, slow, rate-limited identity provider. It
//! authenticates a request with the lowest possible latency and the
//! fewest possible provider calls, while never serving an invalid,
//! expired, or revoked token, and while deduplicating concurrent
//! provider calls for the same subject.
//!
//! ## Verification tiers
//!
//! 1. **Local** - stateless signature/expiry validation against the
//!    shared HMAC secret; forged or expired tokens fail here and never
//!    touch the cache or the provider.
//! 2. **Cache** - a shared key-value store of recently verified
//!    identities; the dominant sub-millisecond path.
//! 3. **Provider** - one deduplicated remote round trip to the authority
//!    of record, written back to the cache with a bounded TTL.
//!
//! ## Modules
//!
//! - [`config`] - Configuration types and validation
//! - [`token`] - Local token verification
//! - [`types`] - Identity records and outcome labels
//! - [`cache`] - Cache store trait, in-memory backend, identity cache
//! - [`provider`] - Identity provider capability trait and HTTP client
//! - [`rate_limit`] - Fixed-window rate limiting
//! - [`coordinator`] - The tiered verification state machine
//! - [`metrics`] - Outcome counters and duration histograms
//! - [`error`] - Error taxonomy

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod rate_limit;
pub mod token;
pub mod types;

pub use cache::{CacheStore, IdentityCache, MemoryCacheStore};
pub use config::{
    AuthCacheConfig, CacheConfig, ConfigError, ProviderConfig, RateLimitConfig, RetryPolicy,
    SigningConfig,
};
pub use coordinator::AuthCoordinator;
pub use error::{AuthError, ErrorCategory};
pub use provider::{HttpIdentityProvider, IdentityProvider, ProviderError};
pub use rate_limit::RateLimiter;
pub use token::{AccessClaims, TokenVerifier, VerifyError};
pub use types::{AuthOutcome, CachedIdentity, CanonicalIdentity};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Extracts the bearer token from an `Authorization` header value.
///
/// The HTTP layer is a collaborator of this crate; this helper only does
/// the string-level work of peeling off the `Bearer ` scheme.
///
/// Returns `None` for missing schemes or empty tokens.
#[must_use]
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tokengate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::bearer_token;
    pub use crate::cache::{CacheStore, IdentityCache, MemoryCacheStore};
    pub use crate::config::{AuthCacheConfig, ConfigError};
    pub use crate::coordinator::AuthCoordinator;
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::provider::{HttpIdentityProvider, IdentityProvider, ProviderError};
    pub use crate::types::{AuthOutcome, CachedIdentity, CanonicalIdentity};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("Bearer   spaced  "), Some("spaced"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("abc.def.ghi"), None);
        assert_eq!(bearer_token(""), None);
    }
}
