//! Bearer credential verification.
//!
//! Tokens are JWTs signed with a single shared HMAC secret. The payload carries
//! a subject and a list of permission strings such as `tickets.PUT`.
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub const AUTHORIZATION_SCHEME: &str = "bearer";

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authorization header is not provided")]
    MissingHeader,
    #[error("invalid authorization header format")]
    MalformedHeader,
    #[error("unsupported authorization type {0}")]
    UnsupportedScheme(String),
    #[error("token is invalid: unexpected signing method")]
    InvalidSignatureMethod,
    #[error("token has expired")]
    Expired,
    #[error("token is invalid: {0}")]
    InvalidToken(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: i64,
}

/// A verified caller. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: Option<String>,
    pub permissions: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn has_permission(&self, action: &str) -> bool {
        self.permissions.contains(action)
    }
}

pub struct CredentialVerifier {
    key: DecodingKey,
}

impl CredentialVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
        }
    }

    /// Verify a raw `Authorization` header value of the form `<scheme> <token>`.
    pub fn verify(&self, header_value: &str) -> Result<Identity, AuthError> {
        if header_value.is_empty() {
            return Err(AuthError::MissingHeader);
        }
        let fields: Vec<&str> = header_value.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(AuthError::MalformedHeader);
        }

        let scheme = fields[0].to_lowercase();
        if scheme != AUTHORIZATION_SCHEME {
            return Err(AuthError::UnsupportedScheme(scheme));
        }

        self.verify_token(fields[1])
    }

    pub fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if !HMAC_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::InvalidSignatureMethod);
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &self.key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidAlgorithm => AuthError::InvalidSignatureMethod,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;

        let claims = data.claims;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AuthError::InvalidToken("exp out of range".to_string()))?;

        Ok(Identity {
            subject: claims.sub,
            permissions: claims.permissions.into_iter().collect(),
            expires_at,
        })
    }
}

/// Mints tokens the verifier accepts. Used for local development and tests.
pub struct CredentialIssuer {
    key: EncodingKey,
}

impl CredentialIssuer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
        }
    }

    pub fn issue(
        &self,
        subject: Option<&str>,
        permissions: &[String],
        lifetime: Duration,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: subject.map(str::to_string),
            permissions: permissions.to_vec(),
            exp: (Utc::now() + lifetime).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}
