use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Identifies this process for the lifetime of the binary.
pub static FUNCTION_INSTANCE_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

tokio::task_local! {
    static CURRENT_LOGGER: RequestLogger;
}

static FALLBACK_LOGGER: Lazy<RequestLogger> = Lazy::new(|| {
    let mut labels = BTreeMap::new();
    labels.insert("functionInstanceId".to_string(), FUNCTION_INSTANCE_ID.clone());
    create_logger(LoggerConfig {
        log_name: "default".to_string(),
        labels,
    })
});

#[derive(Debug, Clone, Default)]
pub struct LoggerConfig {
    pub log_name: String,
    pub labels: BTreeMap<String, String>,
}

/// A structured logger that stamps every event with its log name and labels.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    inner: Arc<LoggerInner>,
}

#[derive(Debug)]
struct LoggerInner {
    log_name: String,
    labels: BTreeMap<String, String>,
    rendered_labels: String,
}

pub fn create_logger(config: LoggerConfig) -> RequestLogger {
    let rendered_labels = serde_json::to_string(&config.labels).unwrap_or_default();
    RequestLogger {
        inner: Arc::new(LoggerInner {
            log_name: config.log_name,
            labels: config.labels,
            rendered_labels,
        }),
    }
}

impl RequestLogger {
    pub fn log_name(&self) -> &str {
        &self.inner.log_name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.inner.labels
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.inner.labels.get(key).map(String::as_str)
    }

    pub fn debug<M: Serialize>(&self, message: &str, metadata: M) {
        let metadata = render(metadata);
        tracing::debug!(
            log_name = %self.inner.log_name,
            labels = %self.inner.rendered_labels,
            metadata = %metadata,
            "{}",
            message
        );
    }

    pub fn info<M: Serialize>(&self, message: &str, metadata: M) {
        let metadata = render(metadata);
        tracing::info!(
            log_name = %self.inner.log_name,
            labels = %self.inner.rendered_labels,
            metadata = %metadata,
            "{}",
            message
        );
    }

    pub fn warn<M: Serialize>(&self, message: &str, metadata: M) {
        let metadata = render(metadata);
        tracing::warn!(
            log_name = %self.inner.log_name,
            labels = %self.inner.rendered_labels,
            metadata = %metadata,
            "{}",
            message
        );
    }

    pub fn error<M: Serialize>(&self, message: &str, metadata: M) {
        let metadata = render(metadata);
        tracing::error!(
            log_name = %self.inner.log_name,
            labels = %self.inner.rendered_labels,
            metadata = %metadata,
            "{}",
            message
        );
    }
}

fn render<M: Serialize>(metadata: M) -> Value {
    serde_json::to_value(metadata).unwrap_or(Value::Null)
}

/// Run `fut` with `logger` reachable through [`get_logger`] for its whole call tree.
///
/// The binding is dropped when the future completes, errors or unwinds.
pub async fn scope<F: Future>(logger: RequestLogger, fut: F) -> F::Output {
    CURRENT_LOGGER.scope(logger, fut).await
}

/// Logger bound to the current invocation, or the process-wide default logger
/// when called outside of one.
pub fn get_logger() -> RequestLogger {
    CURRENT_LOGGER
        .try_with(RequestLogger::clone)
        .unwrap_or_else(|_| FALLBACK_LOGGER.clone())
}
