// Wrapper for background triggers (auth events, queue messages)

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::panic_error;
use crate::logger::{self, create_logger, LoggerConfig, RequestLogger, FUNCTION_INSTANCE_ID};
use crate::schema::{Schema, SchemaError, Typed, Unchecked};

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Invalid event payload: {0}")]
    InvalidPayload(#[from] SchemaError),

    #[error("Event handler failed: {0:#}")]
    Handler(anyhow::Error),
}

pub struct EventConfig<B = Unchecked> {
    payload_schema: B,
    function_name: Option<String>,
    /// `(label, field)` pairs copied from the raw payload onto the logger.
    payload_labels: Vec<(String, String)>,
}

impl EventConfig {
    pub fn new() -> Self {
        Self {
            payload_schema: Unchecked,
            function_name: None,
            payload_labels: Vec::new(),
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> EventConfig<B> {
    pub fn payload<S>(self, schema: S) -> EventConfig<S> {
        EventConfig {
            payload_schema: schema,
            function_name: self.function_name,
            payload_labels: self.payload_labels,
        }
    }

    pub fn payload_type<U>(self) -> EventConfig<Typed<U>> {
        self.payload(Typed::new())
    }

    pub fn function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    /// Label each event's logger with the top-level payload field `field`.
    /// Events without a scalar value there simply lack the label.
    pub fn payload_label(mut self, label: impl Into<String>, field: impl Into<String>) -> Self {
        self.payload_labels.push((label.into(), field.into()));
        self
    }
}

fn label_value(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug)]
pub struct EventContext<P> {
    pub execution_id: Uuid,
    pub payload: P,
    pub logger: RequestLogger,
}

/// A wrapped background function.
#[derive(Clone)]
pub struct EventFunction {
    name: String,
    invoke: Arc<dyn Fn(Value) -> BoxFuture<'static, Result<(), TriggerError>> + Send + Sync>,
}

impl EventFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver one event. Failures are logged before being returned so the
    /// platform can decide whether to retry.
    pub async fn dispatch(&self, payload: Value) -> Result<(), TriggerError> {
        (self.invoke)(payload).await
    }
}

pub fn event_handler<F, Fut, E, B>(func: F, config: EventConfig<B>) -> EventFunction
where
    F: Fn(EventContext<B::Output>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<anyhow::Error>,
    B: Schema,
{
    let name = config
        .function_name
        .clone()
        .unwrap_or_else(|| "unknownFunction".to_string());
    let log_name = format!("eventHandler.{}", name);
    let schema = Arc::new(config.payload_schema);
    let payload_labels = Arc::new(config.payload_labels);
    let func = Arc::new(func);

    let invoke = Arc::new(move |payload: Value| {
        let schema = Arc::clone(&schema);
        let payload_labels = Arc::clone(&payload_labels);
        let func = Arc::clone(&func);
        let log_name = log_name.clone();
        async move {
            let execution_id = Uuid::new_v4();
            let mut labels = BTreeMap::new();
            for (label, field) in payload_labels.iter() {
                if let Some(value) = label_value(&payload, field) {
                    labels.insert(label.clone(), value);
                }
            }
            labels.insert("executionId".to_string(), execution_id.to_string());
            labels.insert("functionInstanceId".to_string(), FUNCTION_INSTANCE_ID.clone());
            let logger = create_logger(LoggerConfig { log_name, labels });

            logger::scope(logger.clone(), async move {
                logger.info("Event received", json!({ "payload": &payload }));

                let parsed = match schema.parse(payload.clone()) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        logger.warn("Invalid event payload", json!({ "error": err.detail(), "payload": &payload }));
                        return Err(TriggerError::InvalidPayload(err));
                    }
                };

                Backend::init();

                let context = EventContext {
                    execution_id,
                    payload: parsed,
                    logger: logger.clone(),
                };
                let outcome = AssertUnwindSafe(async { (*func)(context).await }).catch_unwind().await;
                let err = match outcome {
                    Ok(Ok(())) => {
                        logger.debug("Event handled", ());
                        return Ok(());
                    }
                    Ok(Err(err)) => err.into(),
                    Err(panic) => panic_error(panic),
                };

                logger.error("Error in handler", json!({ "err": format!("{:#}", err), "payload": &payload }));
                Err(TriggerError::Handler(err))
            })
            .await
        }
        .boxed()
    });

    EventFunction { name, invoke }
}
