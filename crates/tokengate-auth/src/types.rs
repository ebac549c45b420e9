//! Core identity and outcome types.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A verified identity as stored in the cache.
///
/// Written only after a successful verification; `last_verified_at` is
/// monotonic per subject (a refresh race never replaces a fresher record
/// with an older one).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedIdentity {
    /// Subject id the identity belongs to.
    pub subject_id: String,

    /// Email address on record with the identity provider.
    pub email: Option<String>,

    /// When this record was first created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the identity provider last confirmed this identity.
    #[serde(with = "time::serde::rfc3339")]
    pub last_verified_at: OffsetDateTime,
}

impl CachedIdentity {
    /// Builds a freshly verified record from the provider's canonical
    /// identity, stamped at `verified_at`.
    #[must_use]
    pub fn from_canonical(identity: CanonicalIdentity, verified_at: OffsetDateTime) -> Self {
        Self {
            subject_id: identity.id,
            email: identity.email,
            created_at: verified_at,
            last_verified_at: verified_at,
        }
    }

    /// Returns `true` if this record is strictly fresher than `other`.
    #[must_use]
    pub fn is_fresher_than(&self, other: &Self) -> bool {
        self.last_verified_at > other.last_verified_at
    }
}

/// Canonical subject attributes as returned by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalIdentity {
    /// Subject id per the authority of record.
    pub id: String,

    /// Email address, if the provider exposes one.
    #[serde(default)]
    pub email: Option<String>,
}

/// Terminal outcome of one authentication attempt.
///
/// Used to label outcome counters; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthOutcome {
    /// Served from the identity cache.
    CacheHit,
    /// Verified by a fresh identity provider call.
    ProviderVerified,
    /// Token expired.
    Expired,
    /// Token malformed, signature mismatch, or rejected by the provider.
    Invalid,
    /// Provider unreachable or itself rate-limited.
    ProviderError,
    /// Caller exceeded the local rate limit.
    RateLimited,
}

impl AuthOutcome {
    /// Returns the outcome label used in metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheHit => "cache_hit",
            Self::ProviderVerified => "provider_verified",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
            Self::ProviderError => "provider_error",
            Self::RateLimited => "rate_limited",
        }
    }
}

impl std::fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_from_canonical() {
        let now = OffsetDateTime::now_utc();
        let identity = CachedIdentity::from_canonical(
            CanonicalIdentity {
                id: "u123".to_string(),
                email: Some("a@b.com".to_string()),
            },
            now,
        );

        assert_eq!(identity.subject_id, "u123");
        assert_eq!(identity.email.as_deref(), Some("a@b.com"));
        assert_eq!(identity.created_at, now);
        assert_eq!(identity.last_verified_at, now);
    }

    #[test]
    fn test_freshness_comparison() {
        let now = OffsetDateTime::now_utc();
        let older = CachedIdentity {
            subject_id: "u123".to_string(),
            email: None,
            created_at: now,
            last_verified_at: now,
        };
        let newer = CachedIdentity {
            last_verified_at: now + Duration::seconds(1),
            ..older.clone()
        };

        assert!(newer.is_fresher_than(&older));
        assert!(!older.is_fresher_than(&newer));
        assert!(!older.is_fresher_than(&older));
    }

    #[test]
    fn test_cached_identity_roundtrip() {
        let identity = CachedIdentity {
            subject_id: "u123".to_string(),
            email: Some("a@b.com".to_string()),
            created_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            last_verified_at: OffsetDateTime::from_unix_timestamp(1_700_000_100).unwrap(),
        };

        let json = serde_json::to_string(&identity).unwrap();
        let parsed: CachedIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(identity, parsed);
    }

    #[test]
    fn test_canonical_identity_email_optional() {
        let parsed: CanonicalIdentity = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(parsed.id, "u1");
        assert!(parsed.email.is_none());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(AuthOutcome::CacheHit.as_str(), "cache_hit");
        assert_eq!(AuthOutcome::ProviderVerified.as_str(), "provider_verified");
        assert_eq!(AuthOutcome::RateLimited.to_string(), "rate_limited");
    }
}
