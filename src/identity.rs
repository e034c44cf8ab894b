//! Identity verification: bearer token in, identity key out.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::models::account::ProfileHints;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid identity token: {0}")]
    InvalidToken(String),
    #[error("identity verification is not configured")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl VerifiedIdentity {
    pub fn hints(&self) -> ProfileHints {
        ProfileHints {
            display_name: self.name.clone(),
            avatar: self.picture.clone(),
        }
    }
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;
}

/// Claims read from an identity token. `sub` is the identity key.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Verifies HS256-signed identity tokens.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;
        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(IdentityError::InvalidToken("empty subject".into()));
        }
        Ok(VerifiedIdentity {
            uid: claims.sub,
            name: claims.name,
            picture: claims.picture,
        })
    }
}

/// Rejects every token. Used when no verification secret is configured.
pub struct DisabledVerifier;

#[async_trait]
impl IdentityVerifier for DisabledVerifier {
    async fn verify(&self, _token: &str) -> Result<VerifiedIdentity, IdentityError> {
        Err(IdentityError::Unavailable)
    }
}

pub fn verifier_from_config(config: &Config) -> Box<dyn IdentityVerifier> {
    match &config.identity_jwt_secret {
        Some(secret) => Box::new(JwtVerifier::new(
            secret,
            config.identity_issuer.as_deref(),
            config.identity_audience.as_deref(),
        )),
        None => {
            tracing::warn!(
                "IDENTITY_JWT_SECRET not set; token verification disabled, all authenticated routes will return 401"
            );
            Box::new(DisabledVerifier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "identity-test-secret";

    fn far_future() -> usize {
        (crate::util::now_millis() / 1000) as usize + 3600
    }

    fn token(claims: &serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_yields_identity() {
        let verifier = JwtVerifier::new(SECRET, None, None);
        let t = token(
            &serde_json::json!({ "sub": "uid-1", "exp": far_future(), "name": "Ada" }),
            SECRET,
        );
        let identity = verifier.verify(&t).await.unwrap();
        assert_eq!(identity.uid, "uid-1");
        assert_eq!(identity.name.as_deref(), Some("Ada"));
        assert_eq!(identity.picture, None);
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let verifier = JwtVerifier::new(SECRET, None, None);
        let t = token(&serde_json::json!({ "sub": "uid-1", "exp": far_future() }), "other");
        assert!(matches!(
            verifier.verify(&t).await,
            Err(IdentityError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let verifier = JwtVerifier::new(SECRET, None, None);
        let t = token(&serde_json::json!({ "sub": "uid-1", "exp": 1_000 }), SECRET);
        assert!(verifier.verify(&t).await.is_err());
    }

    #[tokio::test]
    async fn test_audience_and_issuer_enforced() {
        let verifier = JwtVerifier::new(SECRET, Some("https://issuer.test"), Some("tech-image"));
        let good = token(
            &serde_json::json!({
                "sub": "uid-1", "exp": far_future(),
                "aud": "tech-image", "iss": "https://issuer.test"
            }),
            SECRET,
        );
        assert!(verifier.verify(&good).await.is_ok());

        let wrong_aud = token(
            &serde_json::json!({
                "sub": "uid-1", "exp": far_future(),
                "aud": "someone-else", "iss": "https://issuer.test"
            }),
            SECRET,
        );
        assert!(verifier.verify(&wrong_aud).await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_verifier_fails_closed() {
        assert_eq!(
            DisabledVerifier.verify("anything").await,
            Err(IdentityError::Unavailable)
        );
    }
}
