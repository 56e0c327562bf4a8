// Decoding inbound requests and encoding outbound responses

use axum::{
    body::Body,
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::map::Entry;
use serde_json::{json, Map, Value};

use crate::schema::SchemaError;

const REDACTED: &str = "[redacted]";
const SENSITIVE_HEADERS: [&str; 3] = ["authorization", "x-firebase-appcheck", "cookie"];

/// Read the body as JSON when it is (or claims to be) JSON, as text otherwise,
/// and as `null` when empty.
pub async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Value, SchemaError> {
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| SchemaError::Malformed(e.to_string()))?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    match content_type {
        Some(ct) if ct.contains("json") => {
            serde_json::from_slice(&bytes).map_err(|e| SchemaError::Malformed(e.to_string()))
        }
        Some(_) => Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        None => Ok(serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))),
    }
}

/// Query string as a JSON object; repeated keys collect into arrays.
pub fn parse_query(query: Option<&str>) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        let value = Value::String(value.into_owned());
        match map.entry(key.into_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(values) => values.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }
    Value::Object(map)
}

/// Request summary for the "Request received" log line. Credentials are
/// replaced before logging.
pub fn describe_request(parts: &Parts, query: &Value) -> Value {
    let headers: Map<String, Value> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            let rendered = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                REDACTED.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), Value::String(rendered))
        })
        .collect();

    json!({
        "method": parts.method.as_str(),
        "url": parts.uri.to_string(),
        "query": query,
        "headers": headers,
    })
}

pub fn json_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// Literal body with an HTML content type. Strings are sent as-is, `null` as an
/// empty body, anything else as its JSON text.
pub fn html_response(status: StatusCode, body: &Value) -> Response {
    let text = match body {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
        text,
    )
        .into_response()
}

pub fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}
