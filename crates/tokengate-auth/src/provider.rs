//! Identity provider client.
//!
//! Third tier of the verification pipeline: one remote round trip that
//! re-validates a token against the authority of record. The client is a
//! capability interface with a single method and a closed set of error
//! variants; retry policy lives in the coordinator, never here.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::{ConfigError, ProviderConfig};
use crate::types::CanonicalIdentity;

/// Errors that can occur on a provider round trip.
///
/// The three variants are deliberately distinguishable: a rejection means
/// the token is bad, the other two mean the check could not be performed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The authority of record rejected the token (invalid or revoked).
    #[error("Token rejected by identity provider")]
    Rejected,

    /// The provider itself rate-limited the call.
    #[error("Identity provider rate limited the request")]
    RateLimited,

    /// The provider could not be reached or did not answer in time.
    #[error("Identity provider unreachable: {message}")]
    Unreachable {
        /// Description of the transport failure.
        message: String,
    },
}

impl ProviderError {
    /// Creates a new `Unreachable` error.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Unreachable { .. })
    }
}

/// Capability interface to the identity provider.
///
/// One remote call: re-validate a token and return canonical subject
/// attributes. Implementations must not retry internally.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies `token` against the authority of record.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Rejected`] when the authority denies the
    /// token, [`ProviderError::RateLimited`] or
    /// [`ProviderError::Unreachable`] when the check could not be
    /// performed.
    async fn verify_remote(&self, token: &str) -> Result<CanonicalIdentity, ProviderError>;
}

/// HTTP identity provider client.
///
/// Issues a single `GET` to the configured verification endpoint with the
/// token as a bearer credential.
pub struct HttpIdentityProvider {
    http_client: reqwest::Client,
    endpoint: Url,
}

impl HttpIdentityProvider {
    /// Creates a client from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ConfigError::InvalidValue(format!("Invalid provider endpoint: {}", e))
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            http_client,
            endpoint,
        })
    }

    /// Creates a client for an endpoint with an explicit request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(endpoint: Url, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            endpoint,
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_remote(&self, token: &str) -> Result<CanonicalIdentity, ProviderError> {
        let response = self
            .http_client
            .get(self.endpoint.as_str())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "provider request failed");
                if e.is_timeout() {
                    ProviderError::unreachable("request timed out")
                } else {
                    ProviderError::unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => response.json::<CanonicalIdentity>().await.map_err(|e| {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "provider returned unparseable body");
                ProviderError::unreachable(format!("invalid response body: {}", e))
            }),
            401 | 403 => {
                tracing::debug!(status = status.as_u16(), "provider rejected token");
                Err(ProviderError::Rejected)
            }
            429 => {
                tracing::warn!(endpoint = %self.endpoint, "provider rate limited");
                Err(ProviderError::RateLimited)
            }
            _ => {
                tracing::warn!(endpoint = %self.endpoint, status = status.as_u16(), "unexpected provider status");
                Err(ProviderError::unreachable(format!(
                    "unexpected status {}",
                    status.as_u16()
                )))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
