//! Typed HTTP handler wrapper.
//!
//! [`http_handler`] turns a business function plus a [`HandlerConfig`] into an
//! [`Endpoint`]. Each invocation runs the same fixed pipeline:
//!
//! 1. request, execution and correlation ids
//! 2. request-scoped logger
//! 3. backend initialization
//! 4. attestation (`x-firebase-appcheck`), if configured
//! 5. body schema
//! 6. query schema
//! 7. bearer token (`Authorization`), if configured
//! 8. the business function, with the logger bound task-locally
//! 9. response schema and emission
//!
//! Every failing stage answers the request itself; nothing propagates out of the
//! endpoint.

pub mod config;
pub mod context;
pub mod guard;
pub mod request;
pub mod trigger;

use axum::{
    extract::Request,
    http::{request::Parts, StatusCode},
    response::Response,
    Router,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tower_http::timeout::TimeoutLayer;
use uuid::Uuid;

pub use config::{CorsPolicy, HandlerConfig, InvocationOptions};
pub use context::{Reply, RequestContext};
pub use guard::{AnonymousClaims, Anonymous, AppCheck, BearerAuth, Guard, NoAppCheck, Unauthorized, APP_CHECK_HEADER};

use crate::backend::Backend;
use crate::config as app_config;
use crate::error::{map_error, panic_error};
use crate::logger::{self, create_logger, LoggerConfig, RequestLogger, FUNCTION_INSTANCE_ID};
use crate::object::{flatten_object, label_value};
use crate::schema::{Schema, SchemaError};
use guard::header_str;
use request::{describe_request, html_response, json_response, parse_query, read_body, unauthorized};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Context type a business function receives under a given configuration.
pub type ContextFor<B, Q, A, T> =
    RequestContext<<B as Schema>::Output, <Q as Schema>::Output, <A as Guard>::Output, <T as Guard>::Output>;

/// Wrap `func` into an endpoint that runs the full request pipeline.
pub fn http_handler<F, Fut, O, E, B, Q, R, A, T>(func: F, config: HandlerConfig<B, Q, R, A, T>) -> Endpoint
where
    F: Fn(ContextFor<B, Q, A, T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Into<Reply<R::Output>>,
    E: Into<anyhow::Error>,
    B: Schema,
    Q: Schema,
    R: Schema,
    R::Output: Serialize,
    A: Guard,
    T: Guard,
{
    let name = config
        .function_name
        .clone()
        .or_else(function_name_of::<F>)
        .unwrap_or_else(|| "unknownFunction".to_string());
    let cors = config.cors.clone();
    let options = config.options.clone();

    let pipeline = Arc::new(Pipeline {
        func,
        log_name: format!("httpHandler.{}", name),
        config,
    });

    let invoke: Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync> = Arc::new(move |request| {
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.run(request).await }.boxed()
    });

    Endpoint {
        name,
        cors,
        options,
        invoke,
    }
}

/// Last path segment of a function item's type name; closures have none.
fn function_name_of<F>() -> Option<String> {
    let segment = std::any::type_name::<F>().rsplit("::").next()?;
    if segment.is_empty() || segment.contains(|c: char| matches!(c, '{' | '<' | '>')) {
        None
    } else {
        Some(segment.to_string())
    }
}

/// A platform-invocable endpoint. Cheap to clone; every clone shares the same
/// pipeline.
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    cors: CorsPolicy,
    options: InvocationOptions,
    invoke: Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("cors", &self.cors)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cors(&self) -> &CorsPolicy {
        &self.cors
    }

    pub fn options(&self) -> &InvocationOptions {
        &self.options
    }

    /// Handle a single request.
    pub async fn invoke(&self, request: Request) -> Response {
        (self.invoke)(request).await
    }

    /// Router serving this endpoint at `path`, with its CORS policy and timeout.
    pub fn into_router(self, path: &str) -> Router {
        let cors = self.cors.layer();
        let timeout = self.options.timeout;

        let mut router = Router::new().route_service(path, self);
        if let Some(timeout) = timeout {
            router = router.layer(TimeoutLayer::new(timeout));
        }
        if let Some(cors) = cors {
            router = router.layer(cors);
        }
        router
    }
}

impl tower::Service<Request> for Endpoint {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let invoke = Arc::clone(&self.invoke);
        async move { Ok(invoke(request).await) }.boxed()
    }
}

struct Pipeline<F, B, Q, R, A, T> {
    func: F,
    log_name: String,
    config: HandlerConfig<B, Q, R, A, T>,
}

impl<F, Fut, O, E, B, Q, R, A, T> Pipeline<F, B, Q, R, A, T>
where
    F: Fn(ContextFor<B, Q, A, T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: Into<Reply<R::Output>>,
    E: Into<anyhow::Error>,
    B: Schema,
    Q: Schema,
    R: Schema,
    R::Output: Serialize,
    A: Guard,
    T: Guard,
{
    async fn run(&self, request: Request) -> Response {
        let request_id = Uuid::new_v4();
        let execution_id = Uuid::new_v4();
        let (parts, body) = request.into_parts();
        let correlation_id = header_str(&parts.headers, CORRELATION_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let limit = app_config::config().api.max_request_size_bytes;
        let raw_body = read_body(&parts.headers, body, limit).await;

        let payload = raw_body.as_ref().ok().cloned().unwrap_or(Value::Null);
        let logger = self.request_logger(request_id, execution_id, &correlation_id, &payload);

        logger::scope(
            logger.clone(),
            self.stages(parts, raw_body, logger, correlation_id, request_id, execution_id),
        )
        .await
    }

    fn request_logger(&self, request_id: Uuid, execution_id: Uuid, correlation_id: &str, payload: &Value) -> RequestLogger {
        let mut labels = BTreeMap::new();
        labels.insert("requestId".to_string(), request_id.to_string());
        labels.insert("functionInstanceId".to_string(), FUNCTION_INSTANCE_ID.clone());
        labels.insert("functionExecutionId".to_string(), execution_id.to_string());
        for (key, value) in flatten_object(&json!({ "payload": payload })) {
            labels.insert(key, label_value(&value));
        }
        labels.insert("correlationId".to_string(), correlation_id.to_string());

        create_logger(LoggerConfig {
            log_name: self.log_name.clone(),
            labels,
        })
    }

    async fn stages(
        &self,
        parts: Parts,
        raw_body: Result<Value, SchemaError>,
        logger: RequestLogger,
        correlation_id: String,
        request_id: Uuid,
        execution_id: Uuid,
    ) -> Response {
        let query = parse_query(parts.uri.query());
        logger.info("Request received", json!({ "httpRequest": describe_request(&parts, &query) }));

        logger.info("Initializing admin app", ());
        Backend::init();

        if !A::ENABLED {
            logger.debug("App Check not required, skipping attestation", ());
        }
        let app_check = match self.config.app_check.check(&parts.headers, &logger).await {
            Ok(verified) => verified,
            Err(Unauthorized) => return unauthorized(),
        };

        let raw_body = match raw_body {
            Ok(body) => body,
            Err(err) => return self.invalid_input(&logger, "Invalid request body", &err, json!({ "body": null })),
        };

        let body = match self.config.body_schema.parse(raw_body.clone()) {
            Ok(body) => {
                if B::DECLARED {
                    logger.debug("Validated request body", ());
                } else {
                    logger.debug("No body schema provided, skipping body validation", ());
                }
                body
            }
            Err(err) => {
                return self.invalid_input(&logger, "Invalid request body", &err, json!({ "body": raw_body }))
            }
        };

        let query = match self.config.query_schema.parse(query.clone()) {
            Ok(parsed) => {
                if Q::DECLARED {
                    logger.debug("Validated request query", ());
                } else {
                    logger.debug("No query schema provided, skipping query validation", ());
                }
                parsed
            }
            Err(err) => return self.invalid_input(&logger, "Invalid request query", &err, json!({ "query": query })),
        };

        if !T::ENABLED {
            logger.debug("No auth token required, skipping token verification", ());
        }
        let token = match self.config.auth.check(&parts.headers, &logger).await {
            Ok(token) => token,
            Err(Unauthorized) => return unauthorized(),
        };

        let context = RequestContext {
            correlation_id,
            request_id,
            execution_id,
            body,
            query,
            headers: parts.headers,
            app_check,
            token,
            logger: logger.clone(),
        };

        logger.debug("Running handler", ());
        let outcome = AssertUnwindSafe(async { (self.func)(context).await }).catch_unwind().await;

        let reply: Reply<R::Output> = match outcome {
            Ok(Ok(output)) => output.into(),
            Ok(Err(err)) => return self.handler_failed(&logger, err.into(), &raw_body),
            Err(panic) => return self.handler_failed(&logger, panic_error(panic), &raw_body),
        };

        let status = reply.status_code();
        let has_response = reply.response.is_some();
        let response = match reply.response.map(serde_json::to_value).transpose() {
            Ok(response) => response.unwrap_or(Value::Null),
            Err(err) => return self.handler_failed(&logger, err.into(), &raw_body),
        };

        logger.debug(
            "Handler completed",
            json!({ "result": { "statusCode": status.as_u16(), "response": &response } }),
        );

        self.emit(&logger, status, response, has_response)
    }

    fn invalid_input(&self, logger: &RequestLogger, message: &str, err: &SchemaError, input: Value) -> Response {
        let detail = err.detail();
        logger.warn(message, json!({ "error": &detail, "input": input }));
        json_response(StatusCode::BAD_REQUEST, json!({ "error": detail, "message": message }))
    }

    fn handler_failed(&self, logger: &RequestLogger, err: anyhow::Error, raw_body: &Value) -> Response {
        logger.error(
            "Error in handler",
            json!({ "err": format!("{:#}", err), "body": raw_body }),
        );
        let mapped = map_error(&err);
        json_response(mapped.status_code, mapped.response)
    }

    fn emit(&self, logger: &RequestLogger, status: StatusCode, response: Value, has_response: bool) -> Response {
        if self.config.raw_html_response {
            logger.debug("Sending raw HTML response", ());
            return html_response(status, &response);
        }

        if !R::DECLARED {
            logger.debug("No response schema provided, sending response as is", ());
            return json_response(status, response);
        }

        if !has_response {
            logger.debug("No response payload, skipping response validation", ());
            return json_response(status, response);
        }

        let validated = self
            .config
            .response_schema
            .parse(response.clone())
            .and_then(|parsed| serde_json::to_value(parsed).map_err(|e| SchemaError::Malformed(e.to_string())));

        match validated {
            Ok(validated) => json_response(status, validated),
            Err(err) => {
                // Outbound shape problems are reported, never turned into a failure.
                logger.warn(
                    "Invalid response body",
                    json!({ "err": err.detail(), "body": &response }),
                );
                json_response(status, response)
            }
        }
    }
}
