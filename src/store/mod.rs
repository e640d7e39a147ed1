use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::config::AppConfig;

pub mod cosmos;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Document has no string `id` field")]
    MissingId,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Store rejected document with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    AlreadyExists,
}

/// A document container addressed by database and container name.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document. The document must carry a string `id`; an
    /// existing document with the same id is reported, not overwritten.
    async fn create_item(&self, item: &JsonValue) -> Result<InsertOutcome, StoreError>;

    /// Cheap local readiness check, no network round trip.
    fn check(&self) -> Result<(), StoreError>;

    fn backend(&self) -> &'static str;
}

pub(crate) fn document_id(item: &JsonValue) -> Result<&str, StoreError> {
    item.get("id")
        .and_then(JsonValue::as_str)
        .ok_or(StoreError::MissingId)
}

pub fn is_postgres_url(endpoint: &str) -> bool {
    endpoint.starts_with("postgres://") || endpoint.starts_with("postgresql://")
}

/// Build the store handle once at startup. Fails closed: any construction
/// error is logged and the app runs without persistence.
pub async fn connect(config: &AppConfig) -> Option<Arc<dyn DocumentStore>> {
    let Some(endpoint) = config.cosmos_endpoint.as_deref() else {
        tracing::warn!("COSMOS_ENDPOINT not set, visitor records will not be persisted");
        return None;
    };

    let result: Result<Arc<dyn DocumentStore>, StoreError> = if is_postgres_url(endpoint) {
        match postgres::PgDocumentStore::connect_lazy(
            endpoint,
            &config.database_name,
            &config.container_name,
        ) {
            Ok(store) => match store.run_migrations().await {
                Ok(()) => Ok(Arc::new(store)),
                Err(e) => {
                    tracing::error!("Failed to run migrations: {e}");
                    Err(e.into())
                }
            },
            Err(e) => Err(e),
        }
    } else {
        cosmos::CosmosStore::new(
            endpoint,
            config.cosmos_key.as_deref(),
            &config.database_name,
            &config.container_name,
        )
        .map(|store| Arc::new(store) as Arc<dyn DocumentStore>)
    };

    match result {
        Ok(store) => {
            tracing::info!(
                "Document store ready ({}): {}/{}",
                store.backend(),
                config.database_name,
                config.container_name
            );
            Some(store)
        }
        Err(e) => {
            tracing::error!("Failed to initialize document store client: {e}");
            None
        }
    }
}
