use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::domain::Email;

/// Verifies a bearer credential and yields the verified subject.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Email, IdentityError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

const BEARER_PREFIX: &str = "Bearer ";

/// Pulls the bearer credential out of the `Authorization` header.
pub fn bearer_credential(headers: &HeaderMap) -> Result<String, IdentityError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| IdentityError::Unauthorized("authorization token is missing".to_string()))?
        .to_str()
        .map_err(|_| IdentityError::Unauthorized("invalid token format".to_string()))?;

    match raw.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(IdentityError::Unauthorized(
            "invalid token format".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
}

/// HS256 token verifier. Tokens must carry an `email` claim and must not flag it unverified.
pub struct JwtIdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(secret: &str, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, credential: &str) -> Result<Email, IdentityError> {
        let token = decode::<IdentityClaims>(credential, &self.key, &self.validation)
            .map_err(|err| IdentityError::Unauthorized(format!("authentication failed: {err}")))?;

        let claims = token.claims;
        if claims.email_verified == Some(false) {
            return Err(IdentityError::Unauthorized(
                "email address is not verified".to_string(),
            ));
        }

        let email = claims
            .email
            .ok_or_else(|| IdentityError::Unauthorized("no email in token".to_string()))?;
        Email::parse(&email).map_err(|err| IdentityError::Unauthorized(err.to_string()))
    }
}

/// Fixed token table for development seeding.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Email>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, email: Email) -> Self {
        self.insert(token, email);
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, email: Email) {
        self.tokens.insert(token.into(), email);
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<Email, IdentityError> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or_else(|| IdentityError::Unauthorized("unknown token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        email: &'a str,
        exp: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        email_verified: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        aud: Option<&'a str>,
    }

    fn far_future() -> u64 {
        4_102_444_800
    }

    fn token(secret: &str, claims: &TestClaims<'_>) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("token encodes")
    }

    #[test]
    fn bearer_credential_requires_header_and_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            bearer_credential(&headers),
            Err(IdentityError::Unauthorized(
                "authorization token is missing".to_string()
            ))
        );

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(
            bearer_credential(&headers),
            Err(IdentityError::Unauthorized("invalid token format".to_string()))
        );

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_credential(&headers), Ok("abc".to_string()));
    }

    #[tokio::test]
    async fn jwt_verifier_accepts_signed_tokens() {
        let verifier = JwtIdentityVerifier::new("secret", None);
        let credential = token(
            "secret",
            &TestClaims {
                email: "A@X.com",
                exp: far_future(),
                email_verified: Some(true),
                aud: None,
            },
        );

        let email = verifier.verify(&credential).await.expect("verifies");
        assert_eq!(email.as_str(), "a@x.com");
    }

    #[tokio::test]
    async fn jwt_verifier_rejects_bad_signatures_and_unverified_email() {
        let verifier = JwtIdentityVerifier::new("secret", None);
        let forged = token(
            "other",
            &TestClaims {
                email: "a@x.com",
                exp: far_future(),
                email_verified: None,
                aud: None,
            },
        );
        assert!(verifier.verify(&forged).await.is_err());

        let unverified = token(
            "secret",
            &TestClaims {
                email: "a@x.com",
                exp: far_future(),
                email_verified: Some(false),
                aud: None,
            },
        );
        assert_eq!(
            verifier.verify(&unverified).await,
            Err(IdentityError::Unauthorized(
                "email address is not verified".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn jwt_verifier_checks_audience_when_configured() {
        let verifier = JwtIdentityVerifier::new("secret", Some("enrollments"));
        let wrong = token(
            "secret",
            &TestClaims {
                email: "a@x.com",
                exp: far_future(),
                email_verified: None,
                aud: Some("someone-else"),
            },
        );
        let right = token(
            "secret",
            &TestClaims {
                email: "a@x.com",
                exp: far_future(),
                email_verified: None,
                aud: Some("enrollments"),
            },
        );

        assert!(verifier.verify(&wrong).await.is_err());
        assert!(verifier.verify(&right).await.is_ok());
    }

    #[tokio::test]
    async fn static_verifier_rejects_unknown_tokens() {
        let verifier = StaticTokenVerifier::new()
            .with_token("alice", Email::parse("alice@x.com").expect("valid"));

        assert_eq!(
            verifier.verify("alice").await.expect("known").as_str(),
            "alice@x.com"
        );
        assert!(verifier.verify("mallory").await.is_err());
    }
}
