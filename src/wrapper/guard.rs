// Request guards for the attestation and bearer-token stages

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::app_check::{AppCheckToken, AppCheckVerifier};
use crate::auth::{strip_bearer, TokenPayload, TokenVerifier};
use crate::logger::RequestLogger;

pub const APP_CHECK_HEADER: &str = "x-firebase-appcheck";

/// Claims handed to business functions on endpoints without bearer auth.
pub type AnonymousClaims = HashMap<String, String>;

/// A guard turned the request away; always answered with an opaque 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unauthorized;

/// One optional verification stage of the pipeline.
#[async_trait]
pub trait Guard: Send + Sync + 'static {
    /// What a passing request contributes to the context.
    type Output: Send + 'static;

    const ENABLED: bool;

    async fn check(&self, headers: &HeaderMap, logger: &RequestLogger) -> Result<Self::Output, Unauthorized>;
}

/// Attestation disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAppCheck;

#[async_trait]
impl Guard for NoAppCheck {
    type Output = ();
    const ENABLED: bool = false;

    async fn check(&self, _headers: &HeaderMap, _logger: &RequestLogger) -> Result<(), Unauthorized> {
        Ok(())
    }
}

/// Attestation required.
#[derive(Clone)]
pub struct AppCheck {
    verifier: Arc<dyn AppCheckVerifier>,
}

impl AppCheck {
    pub fn new(verifier: Arc<dyn AppCheckVerifier>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl Guard for AppCheck {
    type Output = AppCheckToken;
    const ENABLED: bool = true;

    async fn check(&self, headers: &HeaderMap, logger: &RequestLogger) -> Result<AppCheckToken, Unauthorized> {
        let token = match header_str(headers, APP_CHECK_HEADER) {
            Some(token) if !token.is_empty() => token,
            _ => {
                logger.warn("Request without App Check token", ());
                return Err(Unauthorized);
            }
        };

        logger.debug("Verifying App Check token", ());
        match self.verifier.verify_token(token).await {
            Ok(response) => {
                logger.debug("App Check token verified", json!({ "appId": response.app_id }));
                Ok(response)
            }
            Err(err) => {
                logger.warn("Error verifying token", json!({ "err": err.to_string() }));
                Err(Unauthorized)
            }
        }
    }
}

/// Bearer auth disabled; the context gets an empty claim map.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl Guard for Anonymous {
    type Output = AnonymousClaims;
    const ENABLED: bool = false;

    async fn check(&self, _headers: &HeaderMap, _logger: &RequestLogger) -> Result<AnonymousClaims, Unauthorized> {
        Ok(AnonymousClaims::new())
    }
}

/// Bearer auth required.
#[derive(Clone)]
pub struct BearerAuth {
    verifier: Arc<dyn TokenVerifier>,
}

impl BearerAuth {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl Guard for BearerAuth {
    type Output = TokenPayload;
    const ENABLED: bool = true;

    async fn check(&self, headers: &HeaderMap, logger: &RequestLogger) -> Result<TokenPayload, Unauthorized> {
        let Some(header) = header_str(headers, "authorization") else {
            logger.warn("JWT token is required but missing in request", ());
            return Err(Unauthorized);
        };

        self.verifier.verify(strip_bearer(header)).map_err(|err| {
            logger.warn("Error verifying JWT token", json!({ "err": err.to_string() }));
            Unauthorized
        })
    }
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
