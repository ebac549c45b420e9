//! Authentication cache configuration.
//!
//! All tunables for the verification pipeline live here: token signing
//! parameters, cache TTL, rate limiting, and identity provider settings.
//! These are plain values; loading them from files or the environment is
//! the host application's concern.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! [auth.signing]
//! secret = "shared-hmac-secret"
//! algorithm = "HS256"
//!
//! [auth.cache]
//! ttl = "5m"
//!
//! [auth.rate_limit]
//! window = "1m"
//! max_requests = 60
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the authentication cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthCacheConfig {
    /// Token signing/verification configuration.
    pub signing: SigningConfig,

    /// Identity cache configuration.
    pub cache: CacheConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Identity provider configuration.
    pub provider: ProviderConfig,
}

impl Default for AuthCacheConfig {
    fn default() -> Self {
        Self {
            signing: SigningConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

/// Token verification configuration.
///
/// Tokens are minted by an upstream authority that shares an HMAC secret
/// with this service; only symmetric algorithms are supported.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Shared HMAC secret used to verify token signatures.
    pub secret: String,

    /// Verification algorithm.
    /// Supported: "HS256", "HS384", "HS512"
    pub algorithm: String,

    /// Clock-skew leeway applied to expiry checks.
    /// Zero unless explicitly configured.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: "HS256".to_string(),
            leeway: Duration::ZERO,
        }
    }
}

/// Identity cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a verified identity stays cached before re-verification.
    /// Must be strictly shorter than the revocation-propagation delay the
    /// deployment is willing to tolerate.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Prefix applied to all cache keys, namespacing this service's
    /// entries in a shared store.
    pub key_prefix: String,

    /// Interval between background sweeps of expired entries.
    /// The sweep is advisory; TTL-native backends may treat it as a no-op.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),            // 5 minutes
            key_prefix: "tokengate".to_string(),
            sweep_interval: Duration::from_secs(600), // 10 minutes
        }
    }
}

/// Rate limiting configuration.
///
/// Limits authentication attempts per client key per fixed window,
/// independent of the token's subject.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Length of the counting window.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Maximum authentication attempts per client key per window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60), // 1 minute
            max_requests: 60,
        }
    }
}

/// Identity provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Verification endpoint of the identity provider.
    pub endpoint: String,

    /// Upper bound on a single provider round trip. On timeout the call
    /// resolves as unreachable rather than hanging.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Retry policy applied by the coordinator to transient provider
    /// failures.
    pub retry: RetryPolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Retry policy for transient identity provider failures.
///
/// Rejections are never retried; only unreachable/timeout outcomes are.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first. 1 disables retries.
    pub max_attempts: u32,

    /// Delay between attempts.
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthCacheConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The signing secret is empty
    /// - The algorithm is not an HMAC algorithm
    /// - The cache TTL, rate-limit threshold, or provider timeout is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing.secret.is_empty() {
            return Err(ConfigError::Missing("signing.secret".to_string()));
        }

        match self.signing.algorithm.as_str() {
            "HS256" | "HS384" | "HS512" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be HS256, HS384, or HS512",
                    other
                )));
            }
        }

        if self.cache.ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "cache.ttl must be > 0".to_string(),
            ));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.max_requests must be > 0".to_string(),
            ));
        }

        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidValue(
                "rate_limit.window must be > 0".to_string(),
            ));
        }

        if self.provider.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "provider.timeout must be > 0".to_string(),
            ));
        }

        if self.provider.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "provider.retry.max_attempts must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
