use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::schema::{is_email, ErrorTree, Validate};

/// Identity claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub email: String,
    pub firestore_id: String,
    pub sql_id: String,
}

impl Validate for TokenPayload {
    fn validate(&self) -> Result<(), ErrorTree> {
        let mut errors = ErrorTree::new();
        if !is_email(&self.email) {
            errors.push(&["email"], "Invalid email address");
        }
        if self.firestore_id.is_empty() {
            errors.push(&["firestoreId"], "firestoreId must not be empty");
        }
        if self.sql_id.is_empty() {
            errors.push(&["sqlId"], "sqlId must not be empty");
        }
        errors.into_result()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    payload: TokenPayload,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("Invalid JWT token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
}

/// Verifies a bearer token and yields its payload.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<TokenPayload, AuthError>;
}

/// HS256 token issuing and verification with a shared secret.
#[derive(Clone)]
pub struct JwtTokenService {
    secret: String,
    expiry: Duration,
}

impl std::fmt::Debug for JwtTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenService")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl JwtTokenService {
    pub fn new(secret: impl Into<String>, expiry: Duration) -> Self {
        Self {
            secret: secret.into(),
            expiry,
        }
    }

    pub fn from_config() -> Self {
        let security = &config::config().security;
        Self::new(security.jwt_secret.clone(), Duration::hours(security.jwt_expiry_hours as i64))
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn issue(&self, payload: &TokenPayload) -> Result<String, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }

        let now = Utc::now();
        let claims = Claims {
            payload: payload.clone(),
            exp: (now + self.expiry).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }
}

impl TokenVerifier for JwtTokenService {
    fn verify(&self, token: &str) -> Result<TokenPayload, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }

        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims.payload)
    }
}

/// Strip a leading `Bearer ` from an `Authorization` header value.
pub fn strip_bearer(header: &str) -> &str {
    header.strip_prefix("Bearer ").unwrap_or(header)
}
