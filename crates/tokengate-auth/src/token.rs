//! Local token verification.
//!
//! First tier of the verification pipeline: stateless structural and
//! cryptographic validation of a bearer token against the shared HMAC
//! secret. No network or cache access happens here; a token that fails
//! locally never reaches the cache or the identity provider.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SigningConfig};

/// Errors that can occur during local token verification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VerifyError {
    /// The token cannot be structurally parsed.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the parse failure.
        message: String,
    },

    /// The cryptographic signature does not match.
    #[error("Invalid signature")]
    SignatureInvalid,

    /// The token's expiry is in the past.
    #[error("Token expired")]
    Expired,
}

impl VerifyError {
    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            _ => Self::malformed(err.to_string()),
        }
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessClaims {
    /// Subject (user or service account id).
    pub sub: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Email address asserted by the token, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Verifies bearer tokens against the shared HMAC secret.
///
/// Thread-safe (`Send + Sync`); construct once at startup and share.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Creates a verifier from signing configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not an HMAC algorithm.
    pub fn from_config(config: &SigningConfig) -> Result<Self, ConfigError> {
        let algorithm = match config.algorithm.as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be HS256, HS384, or HS512",
                    other
                )));
            }
        };

        let mut validation = Validation::new(algorithm);
        // jsonwebtoken defaults to 60 seconds of leeway; expiry is exact
        // unless leeway is configured explicitly.
        validation.leeway = config.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_aud = false; // Audience is the upstream authority's concern

        Ok(Self {
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        })
    }

    /// Decodes and validates a token, returning its claims.
    ///
    /// Succeeds only when structure, signature, and expiry all pass.
    ///
    /// # Errors
    ///
    /// Returns `Malformed`, `SignatureInvalid`, or `Expired`.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, VerifyError> {
        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::Duration;
    use time::OffsetDateTime;

    fn signing_config(secret: &str) -> SigningConfig {
        SigningConfig {
            secret: secret.to_string(),
            algorithm: "HS256".to_string(),
            leeway: Duration::ZERO,
        }
    }

    fn make_token(secret: &str, sub: &str, expires_in: i64) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AccessClaims {
            sub: sub.to_string(),
            exp: now + expires_in,
            iat: now,
            email: Some("a@b.com".to_string()),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_verifies() {
        let verifier = TokenVerifier::from_config(&signing_config("secret")).unwrap();
        let token = make_token("secret", "u123", 3600);

        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.sub, "u123");
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = TokenVerifier::from_config(&signing_config("secret")).unwrap();
        let token = make_token("secret", "u123", -3600);

        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, VerifyError::Expired));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = TokenVerifier::from_config(&signing_config("secret")).unwrap();
        let token = make_token("other-secret", "u123", 3600);

        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, VerifyError::SignatureInvalid));
    }

    #[test]
    fn test_garbage_token_malformed() {
        let verifier = TokenVerifier::from_config(&signing_config("secret")).unwrap();

        let err = verifier.verify("not-a-jwt").unwrap_err();
        assert!(matches!(err, VerifyError::Malformed { .. }));

        let err = verifier.verify("a.b.c").unwrap_err();
        assert!(matches!(err, VerifyError::Malformed { .. }));
    }

    #[test]
    fn test_leeway_allows_recent_expiry() {
        let mut config = signing_config("secret");
        config.leeway = Duration::from_secs(120);
        let verifier = TokenVerifier::from_config(&config).unwrap();

        // Expired 60 seconds ago, within the 120 second leeway
        let token = make_token("secret", "u123", -60);
        assert!(verifier.verify(&token).is_ok());
    }

    #[test]
    fn test_zero_leeway_is_exact() {
        let verifier = TokenVerifier::from_config(&signing_config("secret")).unwrap();

        // Expired 5 seconds ago; without leeway override the jsonwebtoken
        // default of 60 seconds would have accepted this.
        let token = make_token("secret", "u123", -5);
        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, VerifyError::Expired));
    }

    #[test]
    fn test_non_hmac_algorithm_rejected() {
        let mut config = signing_config("secret");
        config.algorithm = "ES384".to_string();
        assert!(TokenVerifier::from_config(&config).is_err());
    }

    #[test]
    fn test_missing_subject_malformed() {
        #[derive(Serialize)]
        struct NoSub {
            exp: i64,
            iat: i64,
        }
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &NoSub {
                exp: now + 3600,
                iat: now,
            },
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let verifier = TokenVerifier::from_config(&signing_config("secret")).unwrap();
        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, VerifyError::Malformed { .. }));
    }
}
