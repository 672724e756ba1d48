//! JWT bearer tokens.
//!
//! [`TokenVerifier`] is the contract the request authenticator depends
//! on.  [`JwtTokenProvider`] implements it with HS256 tokens carrying the
//! caller's email as `sub` and a single `role` claim, and can also mint
//! such tokens.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::AuthConfig;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal identifier (email).
    pub sub: String,
    /// Role label, without the `ROLE_` prefix.
    pub role: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Token verification collaborator.
pub trait TokenVerifier: Send + Sync + 'static {
    /// Whether `token` is well-formed, correctly signed and unexpired.
    fn validate(&self, token: &str) -> bool;

    /// Principal identifier carried by `token`.
    fn principal(&self, token: &str) -> anyhow::Result<String>;

    /// Role carried by `token`.
    fn role(&self, token: &str) -> anyhow::Result<String>;
}

/// HS256 JWT issuer and verifier sharing one secret.
pub struct JwtTokenProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    ttl: Duration,
}

impl JwtTokenProvider {
    /// Create a provider.  When `issuer` is set it is stamped into issued
    /// tokens and required on verified ones.
    pub fn new(secret: &[u8], issuer: Option<String>, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = &issuer {
            validation.set_issuer(&[iss]);
            validation.set_required_spec_claims(&["exp", "iss"]);
        }
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer,
            ttl,
        }
    }

    /// Provider for the `auth` config section.
    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(
            auth.jwt_secret.as_bytes(),
            auth.issuer.clone(),
            Duration::from_secs(auth.token_ttl_secs),
        )
    }

    /// Mint a token for `principal` with `role`.
    pub fn issue(&self, principal: &str, role: &str) -> anyhow::Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: principal.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to sign token: {}", e))
    }

    /// Decode and verify `token`.
    pub fn claims(&self, token: &str) -> anyhow::Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| anyhow::anyhow!("Invalid token: {}", e))
    }
}

impl TokenVerifier for JwtTokenProvider {
    fn validate(&self, token: &str) -> bool {
        match self.claims(token) {
            Ok(_) => true,
            Err(e) => {
                debug!("Token rejected: {:#}", e);
                false
            }
        }
    }

    fn principal(&self, token: &str) -> anyhow::Result<String> {
        Ok(self.claims(token)?.sub)
    }

    fn role(&self, token: &str) -> anyhow::Result<String> {
        Ok(self.claims(token)?.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> JwtTokenProvider {
        JwtTokenProvider::new(b"test-secret", None, Duration::from_secs(3600))
    }

    #[test]
    fn test_issue_and_read_back() {
        let p = provider();
        let token = p.issue("a@b.com", "ADMIN").unwrap();
        assert!(p.validate(&token));
        assert_eq!(p.principal(&token).unwrap(), "a@b.com");
        assert_eq!(p.role(&token).unwrap(), "ADMIN");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = provider().issue("a@b.com", "USER").unwrap();
        let other = JwtTokenProvider::new(b"other-secret", None, Duration::from_secs(3600));
        assert!(!other.validate(&token));
        assert!(other.principal(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let p = provider();
        assert!(!p.validate("not-a-jwt"));
        assert!(!p.validate(""));
    }

    #[test]
    fn test_expired_rejected() {
        let p = provider();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "a@b.com".into(),
            role: "USER".into(),
            iat: now - 7200,
            exp: now - 3600,
            iss: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(!p.validate(&token));
    }

    #[test]
    fn test_issuer_enforced() {
        let with_issuer = JwtTokenProvider::new(
            b"test-secret",
            Some("users-service".into()),
            Duration::from_secs(3600),
        );
        let token = with_issuer.issue("a@b.com", "USER").unwrap();
        assert!(with_issuer.validate(&token));
        assert_eq!(with_issuer.claims(&token).unwrap().iss.as_deref(), Some("users-service"));

        // A token without the issuer claim fails issuer validation.
        let anonymous = provider().issue("a@b.com", "USER").unwrap();
        assert!(!with_issuer.validate(&anonymous));
        assert!(with_issuer.principal(&anonymous).is_err());
    }

    #[test]
    fn test_issuer_mismatch_rejected() {
        let ours = JwtTokenProvider::new(
            b"test-secret",
            Some("users-service".into()),
            Duration::from_secs(3600),
        );
        let theirs = JwtTokenProvider::new(
            b"test-secret",
            Some("billing-service".into()),
            Duration::from_secs(3600),
        );
        let token = theirs.issue("a@b.com", "ADMIN").unwrap();
        assert!(!ours.validate(&token));
    }

    #[test]
    fn test_from_config_uses_ttl_and_issuer() {
        let auth = AuthConfig {
            jwt_secret: "test-secret".into(),
            issuer: Some("users-service".into()),
            token_ttl_secs: 900,
        };
        let p = JwtTokenProvider::from_config(&auth);
        let claims = p.claims(&p.issue("a@b.com", "USER").unwrap()).unwrap();
        assert_eq!(claims.exp - claims.iat, 900);
        assert_eq!(claims.iss.as_deref(), Some("users-service"));
    }
}
