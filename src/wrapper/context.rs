use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;
use uuid::Uuid;

use super::guard::AnonymousClaims;
use crate::logger::RequestLogger;

/// Everything a business function gets for one invocation.
///
/// Field types follow the endpoint's [`HandlerConfig`](super::HandlerConfig):
/// `body`/`query` are the schema outputs (raw JSON when no schema is set),
/// `app_check` is an [`AppCheckToken`](crate::app_check::AppCheckToken) only
/// when attestation is required and `()` otherwise, and `token` is a
/// [`TokenPayload`](crate::auth::TokenPayload) only when bearer auth is
/// required and an empty [`AnonymousClaims`] map otherwise.
#[derive(Debug)]
pub struct RequestContext<B = Value, Q = Value, A = (), T = AnonymousClaims> {
    pub correlation_id: String,
    pub request_id: Uuid,
    pub execution_id: Uuid,
    pub body: B,
    pub query: Q,
    pub headers: HeaderMap,
    pub app_check: A,
    pub token: T,
    pub logger: RequestLogger,
}

/// What a business function hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub response: Option<T>,
    pub status: Option<StatusCode>,
}

impl<T> Reply<T> {
    /// Payload with the default 200.
    pub fn ok(response: T) -> Self {
        Self {
            response: Some(response),
            status: None,
        }
    }

    pub fn with_status(response: T, status: StatusCode) -> Self {
        Self {
            response: Some(response),
            status: Some(status),
        }
    }

    /// Status only, `null` body.
    pub fn status(status: StatusCode) -> Self {
        Self {
            response: None,
            status: Some(status),
        }
    }

    /// 200 with a `null` body.
    pub fn empty() -> Self {
        Self {
            response: None,
            status: None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }
}

impl<T> Default for Reply<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<()> for Reply<T> {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl<T> From<Option<Reply<T>>> for Reply<T> {
    fn from(reply: Option<Reply<T>>) -> Self {
        reply.unwrap_or_default()
    }
}
