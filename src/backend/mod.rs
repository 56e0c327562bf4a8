use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::config;

/// Errors from the document store
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Store error: {0}")]
    Store(String),
}

/// Document storage collaborator used by business handlers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn set(&self, collection: &str, id: &str, document: Value) -> Result<(), BackendError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, BackendError>;
}

/// In-process document store keyed by collection and document id.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn set(&self, collection: &str, id: &str, document: Value) -> Result<(), BackendError> {
        validate_path(collection, id)?;
        let mut documents = self.documents.write().await;
        documents.insert((collection.to_string(), id.to_string()), document);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, BackendError> {
        validate_path(collection, id)?;
        let documents = self.documents.read().await;
        Ok(documents.get(&(collection.to_string(), id.to_string())).cloned())
    }
}

/// Segments may not be empty or contain `/`.
fn validate_path(collection: &str, id: &str) -> Result<(), BackendError> {
    for segment in [collection, id] {
        if segment.is_empty() || segment.contains('/') {
            return Err(BackendError::InvalidPath(format!("{}/{}", collection, id)));
        }
    }
    Ok(())
}

static CONSTRUCTIONS: AtomicUsize = AtomicUsize::new(0);

/// Process-wide handle to the backing services.
pub struct Backend {
    project_id: String,
    documents: Arc<dyn DocumentStore>,
}

impl Backend {
    /// Shared instance, built on first use. Concurrent first callers block on the
    /// same initialization and all observe one instance.
    pub fn instance() -> &'static Backend {
        static INSTANCE: OnceLock<Backend> = OnceLock::new();
        INSTANCE.get_or_init(|| {
            CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
            let project_id = config::config().backend.project_id.clone();
            info!("Initializing backend for project '{}'", project_id);
            Backend::new(project_id, Arc::new(MemoryStore::new()))
        })
    }

    /// Ensure the shared instance exists.
    pub fn init() {
        Self::instance();
    }

    /// How many times the shared instance has been built in this process.
    pub fn constructions() -> usize {
        CONSTRUCTIONS.load(Ordering::SeqCst)
    }

    /// Standalone instance (for tests and embedding), not the shared one.
    pub fn new(project_id: impl Into<String>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            project_id: project_id.into(),
            documents,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn documents(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.documents)
    }
}
