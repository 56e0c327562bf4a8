//! Business functions and the router that exposes them.
//!
//! Every HTTP function is mounted at `/<functionName>`; background functions are
//! reachable at `/events/<functionName>` so they can be driven locally.

pub mod auth;
pub mod status;
pub mod user;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app_check::{AppCheckVerifier, JwksAppCheckVerifier};
use crate::auth::JwtTokenService;
use crate::config;
use crate::error::map_error;
use crate::is_development;
use crate::wrapper::trigger::{EventFunction, TriggerError};
use crate::wrapper::{CorsPolicy, Endpoint};

pub use auth::{issue_token, whoami};
pub use status::status_page;
pub use user::{invite_user, on_user_create, USERS_COLLECTION};

/// Collaborators the business functions are built with.
#[derive(Clone)]
pub struct Services {
    pub app_check: Arc<dyn AppCheckVerifier>,
    pub tokens: Arc<JwtTokenService>,
}

impl Services {
    pub fn new(app_check: Arc<dyn AppCheckVerifier>, tokens: Arc<JwtTokenService>) -> Self {
        Self { app_check, tokens }
    }

    pub fn from_config() -> Self {
        Self::new(
            Arc::new(JwksAppCheckVerifier::from_config()),
            Arc::new(JwtTokenService::from_config()),
        )
    }
}

/// Browser-facing functions accept any origin in development and the configured
/// origins elsewhere.
pub fn cors_policy() -> CorsPolicy {
    if is_development!() {
        CorsPolicy::Permissive
    } else {
        CorsPolicy::Origins(config::config().security.cors_origins.clone())
    }
}

pub fn endpoints(services: &Services) -> Vec<Endpoint> {
    vec![
        invite_user(services),
        issue_token(services),
        whoami(services),
        status_page(),
    ]
}

pub fn triggers() -> Vec<EventFunction> {
    vec![on_user_create()]
}

pub fn router(services: &Services) -> Router {
    let mut router = Router::new();

    for endpoint in endpoints(services) {
        let path = format!("/{}", endpoint.name());
        tracing::debug!("Mounting {} at {}", endpoint.name(), path);
        router = router.merge(endpoint.into_router(&path));
    }

    for function in triggers() {
        let path = format!("/events/{}", function.name());
        tracing::debug!("Mounting trigger {} at {}", function.name(), path);
        router = router.route(&path, post(deliver_event).with_state(function));
    }

    router
}

/// POST /events/:name - deliver one event; 204 once handled
async fn deliver_event(State(function): State<EventFunction>, Json(payload): Json<Value>) -> Response {
    match function.dispatch(payload).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(TriggerError::InvalidPayload(err)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.detail(), "message": "Invalid event payload" })),
        )
            .into_response(),
        Err(TriggerError::Handler(err)) => map_error(&err).into_response(),
    }
}
