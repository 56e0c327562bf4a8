use axum::http::{HeaderValue, Method};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::guard::{Anonymous, AppCheck, BearerAuth, NoAppCheck};
use crate::app_check::AppCheckVerifier;
use crate::auth::TokenVerifier;
use crate::schema::{Typed, Unchecked};

/// Declarative per-endpoint configuration.
///
/// The type parameters record which schemas and guards are active, and through
/// them the field types of the [`RequestContext`](super::RequestContext) the
/// business function receives:
///
/// * `B`, `Q`, `R` – body, query and response schemas ([`Unchecked`] when unset)
/// * `A` – attestation guard ([`NoAppCheck`] or [`AppCheck`])
/// * `T` – bearer guard ([`Anonymous`] or [`BearerAuth`])
pub struct HandlerConfig<B = Unchecked, Q = Unchecked, R = Unchecked, A = NoAppCheck, T = Anonymous> {
    pub(crate) body_schema: B,
    pub(crate) query_schema: Q,
    pub(crate) response_schema: R,
    pub(crate) app_check: A,
    pub(crate) auth: T,
    pub(crate) function_name: Option<String>,
    pub(crate) raw_html_response: bool,
    pub(crate) cors: CorsPolicy,
    pub(crate) options: InvocationOptions,
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self {
            body_schema: Unchecked,
            query_schema: Unchecked,
            response_schema: Unchecked,
            app_check: NoAppCheck,
            auth: Anonymous,
            function_name: None,
            raw_html_response: false,
            cors: CorsPolicy::default(),
            options: InvocationOptions::default(),
        }
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl<B, Q, R, A, T> HandlerConfig<B, Q, R, A, T> {
    pub fn body<S>(self, schema: S) -> HandlerConfig<S, Q, R, A, T> {
        HandlerConfig {
            body_schema: schema,
            query_schema: self.query_schema,
            response_schema: self.response_schema,
            app_check: self.app_check,
            auth: self.auth,
            function_name: self.function_name,
            raw_html_response: self.raw_html_response,
            cors: self.cors,
            options: self.options,
        }
    }

    pub fn query<S>(self, schema: S) -> HandlerConfig<B, S, R, A, T> {
        HandlerConfig {
            body_schema: self.body_schema,
            query_schema: schema,
            response_schema: self.response_schema,
            app_check: self.app_check,
            auth: self.auth,
            function_name: self.function_name,
            raw_html_response: self.raw_html_response,
            cors: self.cors,
            options: self.options,
        }
    }

    pub fn response<S>(self, schema: S) -> HandlerConfig<B, Q, S, A, T> {
        HandlerConfig {
            body_schema: self.body_schema,
            query_schema: self.query_schema,
            response_schema: schema,
            app_check: self.app_check,
            auth: self.auth,
            function_name: self.function_name,
            raw_html_response: self.raw_html_response,
            cors: self.cors,
            options: self.options,
        }
    }

    /// Shorthand for `body(Typed::<U>::new())`.
    pub fn body_type<U>(self) -> HandlerConfig<Typed<U>, Q, R, A, T> {
        self.body(Typed::new())
    }

    /// Shorthand for `query(Typed::<U>::new())`.
    pub fn query_type<U>(self) -> HandlerConfig<B, Typed<U>, R, A, T> {
        self.query(Typed::new())
    }

    /// Shorthand for `response(Typed::<U>::new())`.
    pub fn response_type<U>(self) -> HandlerConfig<B, Q, Typed<U>, A, T> {
        self.response(Typed::new())
    }

    /// Require a verified `x-firebase-appcheck` token.
    pub fn app_check(self, verifier: Arc<dyn AppCheckVerifier>) -> HandlerConfig<B, Q, R, AppCheck, T> {
        HandlerConfig {
            body_schema: self.body_schema,
            query_schema: self.query_schema,
            response_schema: self.response_schema,
            app_check: AppCheck::new(verifier),
            auth: self.auth,
            function_name: self.function_name,
            raw_html_response: self.raw_html_response,
            cors: self.cors,
            options: self.options,
        }
    }

    /// Require a verified bearer token in `Authorization`.
    pub fn require_auth_token(self, verifier: Arc<dyn TokenVerifier>) -> HandlerConfig<B, Q, R, A, BearerAuth> {
        HandlerConfig {
            body_schema: self.body_schema,
            query_schema: self.query_schema,
            response_schema: self.response_schema,
            app_check: self.app_check,
            auth: BearerAuth::new(verifier),
            function_name: self.function_name,
            raw_html_response: self.raw_html_response,
            cors: self.cors,
            options: self.options,
        }
    }

    pub fn function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    /// Emit the response as a literal `text/html` body.
    pub fn raw_html_response(mut self) -> Self {
        self.raw_html_response = true;
        self
    }

    pub fn cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = cors;
        self
    }

    pub fn options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Cross-origin policy applied where the endpoint is mounted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorsPolicy {
    /// Any origin, method and header.
    #[default]
    Permissive,
    Disabled,
    Origins(Vec<String>),
}

impl CorsPolicy {
    pub fn layer(&self) -> Option<CorsLayer> {
        match self {
            CorsPolicy::Permissive => Some(CorsLayer::permissive()),
            CorsPolicy::Disabled => None,
            CorsPolicy::Origins(origins) => {
                let allow_origin = if origins.iter().any(|origin| origin.trim() == "*") {
                    AllowOrigin::any()
                } else {
                    AllowOrigin::list(
                        origins
                            .iter()
                            .filter_map(|origin| HeaderValue::from_str(origin).ok()),
                    )
                };
                Some(
                    CorsLayer::new()
                        .allow_origin(allow_origin)
                        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
                        .allow_headers(Any),
                )
            }
        }
    }
}

/// Platform-level options; carried unmodified to whoever hosts the endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationOptions {
    pub timeout: Option<Duration>,
    pub memory: Option<String>,
    pub region: Option<String>,
}
