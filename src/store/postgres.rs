use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{document_id, DocumentStore, InsertOutcome, StoreError};

/// Documents kept as JSONB rows keyed by (database, container, id).
pub struct PgDocumentStore {
    pool: PgPool,
    database: String,
    container: String,
}

impl PgDocumentStore {
    /// Parses the URL and builds the pool without opening a connection.
    pub fn connect_lazy(
        database_url: &str,
        database: &str,
        container: &str,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(database_url)?;

        Ok(Self {
            pool,
            database: database.to_string(),
            container: container.to_string(),
        })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        let migration_001 = include_str!("../../migrations/001_visitor_documents.sql");
        sqlx::raw_sql(migration_001).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create_item(&self, item: &JsonValue) -> Result<InsertOutcome, StoreError> {
        let id = document_id(item)?;

        let result = sqlx::query(
            "INSERT INTO visitor_documents (database_name, container_name, id, body) VALUES ($1, $2, $3, $4)",
        )
        .bind(&self.database)
        .bind(&self.container)
        .bind(id)
        .bind(item)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Ok(InsertOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
