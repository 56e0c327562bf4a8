use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config;

const ISSUER_PREFIX: &str = "https://firebaseappcheck.googleapis.com/";

/// Minimum age of a cached key set before an unknown key id forces a refetch.
const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(60);

/// Verified attestation token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCheckToken {
    pub app_id: String,
    pub token: AppCheckClaims,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppCheckClaims {
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum AppCheckError {
    #[error("App Check project number not configured")]
    NotConfigured,

    #[error("Malformed App Check token: {0}")]
    Malformed(String),

    #[error("Unknown App Check signing key: {0}")]
    UnknownKey(String),

    #[error("Invalid App Check token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to fetch App Check keys: {0}")]
    KeyFetch(#[from] reqwest::Error),
}

/// Verifies attestation tokens presented by client applications.
#[async_trait]
pub trait AppCheckVerifier: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<AppCheckToken, AppCheckError>;
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Key set plus whether it came straight from the network.
struct KeyLookup {
    keys: JwkSet,
    fetched: bool,
}

/// Verifies RS256 attestation tokens against the published key set.
pub struct JwksAppCheckVerifier {
    project_number: Option<String>,
    jwks_url: String,
    cache_ttl: Duration,
    refresh_cooldown: Duration,
    client: reqwest::Client,
    keys: RwLock<Option<CachedKeys>>,
}

impl JwksAppCheckVerifier {
    pub fn new(project_number: Option<String>, jwks_url: impl Into<String>, cache_ttl: Duration) -> Self {
        Self {
            project_number,
            jwks_url: jwks_url.into(),
            cache_ttl,
            refresh_cooldown: DEFAULT_REFRESH_COOLDOWN,
            client: reqwest::Client::new(),
            keys: RwLock::new(None),
        }
    }

    pub fn from_config() -> Self {
        let app_check = &config::config().app_check;
        Self::new(
            app_check.project_number.clone(),
            app_check.jwks_url.clone(),
            Duration::from_secs(app_check.jwks_cache_secs),
        )
    }

    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    async fn key_set(&self) -> Result<KeyLookup, AppCheckError> {
        {
            let cached = self.keys.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(KeyLookup {
                        keys: cached.keys.clone(),
                        fetched: false,
                    });
                }
            }
        }

        Ok(KeyLookup {
            keys: self.fetch_keys().await?,
            fetched: true,
        })
    }

    /// Cached copy old enough that a rotation may have happened since.
    async fn may_refresh(&self) -> bool {
        let cached = self.keys.read().await;
        cached
            .as_ref()
            .map_or(true, |cached| cached.fetched_at.elapsed() >= self.refresh_cooldown)
    }

    async fn fetch_keys(&self) -> Result<JwkSet, AppCheckError> {
        let keys: JwkSet = self
            .client
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!("Fetched {} App Check signing keys", keys.keys.len());

        let mut cached = self.keys.write().await;
        *cached = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }
}

#[async_trait]
impl AppCheckVerifier for JwksAppCheckVerifier {
    async fn verify_token(&self, token: &str) -> Result<AppCheckToken, AppCheckError> {
        let project_number = self.project_number.as_deref().ok_or(AppCheckError::NotConfigured)?;

        let header = decode_header(token).map_err(|e| AppCheckError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(AppCheckError::Malformed(format!("unexpected algorithm {:?}", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| AppCheckError::Malformed("missing key id".to_string()))?;

        let lookup = self.key_set().await?;
        let mut keys = lookup.keys;
        if keys.find(&kid).is_none() && !lookup.fetched && self.may_refresh().await {
            tracing::debug!("Unknown App Check key id {}, refreshing key set", kid);
            keys = self.fetch_keys().await?;
        }
        let jwk = keys.find(&kid).ok_or_else(|| AppCheckError::UnknownKey(kid.clone()))?;
        let key = DecodingKey::from_jwk(jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[format!("projects/{}", project_number)]);
        validation.set_issuer(&[format!("{}{}", ISSUER_PREFIX, project_number)]);

        let claims = decode::<AppCheckClaims>(token, &key, &validation)?.claims;
        Ok(AppCheckToken {
            app_id: claims.sub.clone(),
            token: claims,
        })
    }
}
