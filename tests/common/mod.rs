#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
};
use serde_json::Value;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

use serverless_handlers::app_check::{AppCheckClaims, AppCheckError, AppCheckToken, AppCheckVerifier};
use serverless_handlers::auth::{JwtTokenService, TokenPayload};
use serverless_handlers::handlers::Services;

pub const VALID_APP_CHECK: &str = "valid-app-check-token";
pub const APP_ID: &str = "1:123456:web:abcdef";
pub const TEST_SECRET: &str = "integration-test-secret";

/// Accepts exactly [`VALID_APP_CHECK`].
pub struct StaticAppCheck;

#[async_trait]
impl AppCheckVerifier for StaticAppCheck {
    async fn verify_token(&self, token: &str) -> Result<AppCheckToken, AppCheckError> {
        if token != VALID_APP_CHECK {
            return Err(AppCheckError::Malformed("unexpected test token".into()));
        }
        Ok(AppCheckToken {
            app_id: APP_ID.to_string(),
            token: AppCheckClaims {
                iss: "https://firebaseappcheck.googleapis.com/123456".into(),
                sub: APP_ID.into(),
                aud: vec!["projects/123456".into()],
                exp: chrono::Utc::now().timestamp() + 3600,
                iat: chrono::Utc::now().timestamp(),
            },
        })
    }
}

pub fn app_check() -> Arc<dyn AppCheckVerifier> {
    Arc::new(StaticAppCheck)
}

pub fn tokens() -> Arc<JwtTokenService> {
    Arc::new(JwtTokenService::new(TEST_SECRET, chrono::Duration::hours(1)))
}

pub fn services() -> Services {
    Services::new(app_check(), tokens())
}

pub fn payload() -> TokenPayload {
    TokenPayload {
        email: "ada@example.com".into(),
        firestore_id: "user-ada".into(),
        sql_id: "42".into(),
    }
}

pub fn bearer(payload: &TokenPayload) -> String {
    format!("Bearer {}", tokens().issue(payload).unwrap())
}

/// JSON request with optional extra headers.
pub fn json_request(method: Method, uri: &str, body: &Value, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn read_text(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let (status, text) = read_text(response).await;
    (status, serde_json::from_str(&text).unwrap())
}

#[derive(Clone)]
struct CaptureWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut lock = self
            .buf
            .lock()
            .map_err(|_| std::io::Error::other("log mutex poisoned"))?;
        lock.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Log lines written on this thread while the guard is alive.
pub struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
    _guard: DefaultGuard,
}

impl CapturedLogs {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.text()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

/// Capture debug-and-above events for the current (single-threaded) test.
pub fn capture_logs() -> CapturedLogs {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let make_writer = {
        let buf = buf.clone();
        move || CaptureWriter { buf: buf.clone() }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();

    CapturedLogs {
        buf,
        _guard: tracing::subscriber::set_default(subscriber),
    }
}
