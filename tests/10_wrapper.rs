mod common;

use axum::http::{header, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use serverless_handlers::app_check::AppCheckToken;
use serverless_handlers::auth::TokenPayload;
use serverless_handlers::error::ApiError;
use serverless_handlers::logger::get_logger;
use serverless_handlers::schema::{is_email, ErrorTree, Validate};
use serverless_handlers::wrapper::{http_handler, HandlerConfig, Reply, RequestContext, APP_CHECK_HEADER};

use common::{capture_logs, get_request, json_request, read_json, read_text, VALID_APP_CHECK};

#[derive(Debug, Deserialize)]
struct Signup {
    email: String,
}

impl Validate for Signup {
    fn validate(&self) -> Result<(), ErrorTree> {
        let mut errors = ErrorTree::new();
        if !is_email(&self.email) {
            errors.push(&["email"], "Invalid email address");
        }
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    page: String,
}

impl Validate for Page {
    fn validate(&self) -> Result<(), ErrorTree> {
        match self.page.parse::<u32>() {
            Ok(_) => Ok(()),
            Err(_) => Err(ErrorTree::new().field("page", "page must be a number")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Counted {
    count: u32,
}

impl Validate for Counted {
    fn validate(&self) -> Result<(), ErrorTree> {
        if self.count > 10 {
            return Err(ErrorTree::new().field("count", "count must be at most 10"));
        }
        Ok(())
    }
}

async fn echo(ctx: RequestContext) -> anyhow::Result<Reply<Value>> {
    Ok(Reply::ok(ctx.body))
}

#[tokio::test]
async fn passthrough_echoes_the_body_with_200() {
    let endpoint = http_handler(echo, HandlerConfig::new());

    let response = endpoint
        .oneshot(json_request(Method::POST, "/echo", &json!({"a": 1, "b": [true]}), &[]))
        .await
        .unwrap();

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"a": 1, "b": [true]}));
}

#[tokio::test]
async fn missing_app_check_is_rejected_before_the_business_function() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let endpoint = http_handler(
        move |ctx: RequestContext<Value, Value, AppCheckToken>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(Reply::ok(json!(ctx.app_check.app_id)))
            }
        },
        HandlerConfig::new().app_check(common::app_check()),
    );

    let response = endpoint
        .clone()
        .oneshot(json_request(Method::POST, "/attested", &json!({}), &[]))
        .await
        .unwrap();
    let (status, text) = read_text(response).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(text, "Unauthorized");

    let response = endpoint
        .clone()
        .oneshot(json_request(Method::POST, "/attested", &json!({}), &[(APP_CHECK_HEADER, "forged")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let response = endpoint
        .oneshot(json_request(Method::POST, "/attested", &json!({}), &[(APP_CHECK_HEADER, VALID_APP_CHECK)]))
        .await
        .unwrap();
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(common::APP_ID));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_email_is_a_400_with_the_field_path() {
    let endpoint = http_handler(
        |ctx: RequestContext<Signup>| async move { Ok::<_, anyhow::Error>(Reply::ok(json!(ctx.body.email))) },
        HandlerConfig::new().body_type::<Signup>(),
    );

    let response = endpoint
        .oneshot(json_request(Method::POST, "/signup", &json!({"email": "not-an-email"}), &[]))
        .await
        .unwrap();

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request body");
    assert_eq!(body["error"]["properties"]["email"]["errors"][0], "Invalid email address");
}

#[tokio::test]
async fn wrong_field_types_are_a_400_under_that_field() {
    let endpoint = http_handler(
        |_ctx: RequestContext<Signup>| async { Ok::<_, anyhow::Error>(Reply::<Value>::empty()) },
        HandlerConfig::new().body_type::<Signup>(),
    );

    let response = endpoint
        .oneshot(json_request(Method::POST, "/signup", &json!({"email": 5}), &[]))
        .await
        .unwrap();

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["errors"], json!([]));
    assert!(body["error"]["properties"]["email"]["errors"][0]
        .as_str()
        .unwrap()
        .contains("invalid type"));
}

#[tokio::test]
async fn undecodable_and_malformed_bodies_are_400() {
    let endpoint = http_handler(
        |_ctx: RequestContext<Signup>| async { Ok::<_, anyhow::Error>(Reply::<Value>::empty()) },
        HandlerConfig::new().body_type::<Signup>(),
    );

    let response = endpoint
        .clone()
        .oneshot(json_request(Method::POST, "/signup", &json!({"name": "ada"}), &[]))
        .await
        .unwrap();
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["properties"]["email"]["errors"][0]
        .as_str()
        .unwrap()
        .contains("missing field"));

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, body) = read_json(endpoint.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request body");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn query_schema_failures_are_reported_as_query_errors() {
    let endpoint = http_handler(
        |ctx: RequestContext<Value, Page>| async move { Ok::<_, anyhow::Error>(Reply::ok(json!(ctx.query.page))) },
        HandlerConfig::new().query_type::<Page>(),
    );

    let (status, body) = read_json(endpoint.clone().oneshot(get_request("/list?page=two", &[])).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request query");
    assert_eq!(body["error"]["properties"]["page"]["errors"][0], "page must be a number");

    let (status, body) = read_json(endpoint.oneshot(get_request("/list?page=2", &[])).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("2"));
}

#[tokio::test]
async fn bad_bearer_tokens_are_401() {
    let endpoint = http_handler(
        |ctx: RequestContext<Value, Value, (), TokenPayload>| async move {
            Ok::<_, anyhow::Error>(Reply::ok(json!(ctx.token.sql_id)))
        },
        HandlerConfig::new().require_auth_token(common::tokens()),
    );

    let response = endpoint
        .clone()
        .oneshot(get_request("/me", &[("authorization", "Bearer badtoken")]))
        .await
        .unwrap();
    let (status, text) = read_text(response).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(text, "Unauthorized");

    let response = endpoint.clone().oneshot(get_request("/me", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bearer = common::bearer(&common::payload());
    let response = endpoint
        .oneshot(get_request("/me", &[("authorization", bearer.as_str())]))
        .await
        .unwrap();
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("42"));
}

#[tokio::test]
async fn custom_errors_are_emitted_verbatim_and_logged_with_the_body() {
    let logs = capture_logs();
    let endpoint = http_handler(
        |_ctx: RequestContext| async {
            Err::<Reply<Value>, _>(ApiError::custom(StatusCode::CONFLICT, json!({"message": "conflict"})))
        },
        HandlerConfig::new().function_name("createThing"),
    );

    let response = endpoint
        .oneshot(json_request(Method::POST, "/createThing", &json!({"id": "dup-7"}), &[]))
        .await
        .unwrap();

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({"message": "conflict"}));

    let lines = logs.lines_containing("Error in handler");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("httpHandler.createThing"));
    assert!(lines[0].contains("dup-7"));
}

#[tokio::test]
async fn unrecognized_errors_and_panics_are_opaque_500s() {
    let endpoint = http_handler(
        |_ctx: RequestContext| async { Err::<Reply<Value>, _>(anyhow::anyhow!("db password is hunter2")) },
        HandlerConfig::new(),
    );
    let (status, body) = read_json(endpoint.oneshot(get_request("/x", &[])).await.unwrap()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "An error occurred while processing your request");
    assert!(!body.to_string().contains("hunter2"));

    async fn explode(_ctx: RequestContext) -> anyhow::Result<Reply<Value>> {
        panic!("kaboom")
    }
    let endpoint = http_handler(explode, HandlerConfig::new());
    let (status, body) = read_json(endpoint.oneshot(get_request("/x", &[])).await.unwrap()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.to_string().contains("kaboom"));
}

#[tokio::test]
async fn invalid_responses_are_sent_anyway_with_a_warning() {
    let logs = capture_logs();
    let endpoint = http_handler(
        |_ctx: RequestContext| async { Ok::<_, anyhow::Error>(Reply::with_status(Counted { count: 99 }, StatusCode::CREATED)) },
        HandlerConfig::new().response_type::<Counted>(),
    );

    let (status, body) = read_json(endpoint.oneshot(get_request("/count", &[])).await.unwrap()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"count": 99}));
    assert_eq!(logs.lines_containing("Invalid response body").len(), 1);
}

#[tokio::test]
async fn valid_responses_pass_the_response_schema() {
    let logs = capture_logs();
    let endpoint = http_handler(
        |_ctx: RequestContext| async { Ok::<_, anyhow::Error>(Reply::ok(Counted { count: 3 })) },
        HandlerConfig::new().response_type::<Counted>(),
    );

    let (status, body) = read_json(endpoint.oneshot(get_request("/count", &[])).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"count": 3}));
    assert!(logs.lines_containing("Invalid response body").is_empty());
}

#[tokio::test]
async fn status_only_replies_send_null() {
    let logs = capture_logs();
    let endpoint = http_handler(
        |_ctx: RequestContext| async { Ok::<_, anyhow::Error>(Reply::<Counted>::status(StatusCode::ACCEPTED)) },
        HandlerConfig::new().response_type::<Counted>(),
    );

    let (status, body) = read_json(endpoint.oneshot(get_request("/later", &[])).await.unwrap()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, Value::Null);
    assert_eq!(logs.lines_containing("No response payload, skipping response validation").len(), 1);
    assert!(logs.lines_containing("Invalid response body").is_empty());
}

#[tokio::test]
async fn disabled_guards_are_logged_as_skipped() {
    let logs = capture_logs();
    let endpoint = http_handler(echo, HandlerConfig::new());
    let (status, _) = read_json(endpoint.oneshot(get_request("/open", &[])).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs.lines_containing("App Check not required").len(), 1);
    assert_eq!(logs.lines_containing("No auth token required").len(), 1);

    let logs = capture_logs();
    let endpoint = http_handler(
        |_ctx: RequestContext<Value, Value, AppCheckToken, TokenPayload>| async {
            Ok::<_, anyhow::Error>(Reply::<Value>::empty())
        },
        HandlerConfig::new()
            .app_check(common::app_check())
            .require_auth_token(common::tokens()),
    );
    let bearer = common::bearer(&common::payload());
    let request = get_request(
        "/guarded",
        &[(APP_CHECK_HEADER, VALID_APP_CHECK), ("authorization", bearer.as_str())],
    );
    let (status, _) = read_text(endpoint.oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(logs.lines_containing("App Check not required").is_empty());
    assert!(logs.lines_containing("No auth token required").is_empty());
}

#[tokio::test]
async fn raw_html_is_sent_literally() {
    let endpoint = http_handler(
        |_ctx: RequestContext| async { Ok::<_, anyhow::Error>(Reply::ok(json!("<h1>hi</h1>"))) },
        HandlerConfig::new().raw_html_response(),
    );

    let response = endpoint.oneshot(get_request("/page", &[])).await.unwrap();
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    let (status, text) = read_text(response).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/html"));
    assert_eq!(text, "<h1>hi</h1>");
}

#[tokio::test]
async fn the_request_logger_is_reachable_and_labelled() {
    let logs = capture_logs();
    let endpoint = http_handler(
        |_ctx: RequestContext| async { Ok::<_, anyhow::Error>(Reply::ok(json!(get_logger().log_name()))) },
        HandlerConfig::new().function_name("labelled"),
    );

    let response = endpoint
        .oneshot(json_request(
            Method::POST,
            "/labelled",
            &json!({"user": {"id": "u9"}, "tags": ["a", "b"]}),
            &[("x-correlation-id", "corr-123")],
        ))
        .await
        .unwrap();

    let (_, body) = read_json(response).await;
    assert_eq!(body, json!("httpHandler.labelled"));

    let received = logs.lines_containing("Request received");
    assert_eq!(received.len(), 1);
    assert!(received[0].contains(r#""payload.user.id":"u9""#));
    assert!(received[0].contains(r#""payload.tags":"[\"a\",\"b\"]""#));
    assert!(received[0].contains(r#""correlationId":"corr-123""#));

    // Outside an invocation the fallback logger is back.
    assert_eq!(get_logger().log_name(), "default");
}

#[tokio::test]
async fn mounted_endpoints_only_answer_their_path() {
    let router = http_handler(echo, HandlerConfig::new().function_name("echo")).into_router("/echo");

    let response = router
        .clone()
        .oneshot(json_request(Method::POST, "/echo", &json!({"ok": true}), &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router.oneshot(get_request("/other", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
