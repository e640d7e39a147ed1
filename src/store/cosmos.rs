use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use sha2::Sha256;

use super::{document_id, DocumentStore, InsertOutcome, StoreError};

type HmacSha256 = Hmac<Sha256>;

pub const COSMOS_API_VERSION: &str = "2018-12-31";

/// Azure Cosmos DB (SQL API) container reached over REST with a master key.
pub struct CosmosStore {
    endpoint: String,
    key: Vec<u8>,
    database: String,
    container: String,
    client: reqwest::Client,
}

impl CosmosStore {
    pub fn new(
        endpoint: &str,
        key: Option<&str>,
        database: &str,
        container: &str,
    ) -> Result<Self, StoreError> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| StoreError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(StoreError::InvalidEndpoint(endpoint.to_string()));
        }

        let key = key.ok_or(StoreError::MissingCredential("COSMOS_KEY"))?;
        let key = STANDARD
            .decode(key.trim())
            .map_err(|e| StoreError::InvalidCredential(e.to_string()))?;
        if key.is_empty() {
            return Err(StoreError::InvalidCredential("COSMOS_KEY is empty".to_string()));
        }

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key,
            database: database.to_string(),
            container: container.to_string(),
            client: reqwest::Client::new(),
        })
    }

    fn collection_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.database, self.container)
    }

    /// Master-key authorization header value for one request.
    pub fn authorization(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> String {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.to_lowercase(),
            resource_type.to_lowercase(),
            resource_link,
            date.to_lowercase()
        );
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        urlencoding::encode(&format!("type=master&ver=1.0&sig={signature}")).into_owned()
    }
}

/// RFC 1123 date as `x-ms-date` expects it.
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[async_trait]
impl DocumentStore for CosmosStore {
    async fn create_item(&self, item: &JsonValue) -> Result<InsertOutcome, StoreError> {
        let id = document_id(item)?;
        let link = self.collection_link();
        let date = http_date(Utc::now());
        let url = format!("{}/{link}/docs", self.endpoint);

        let resp = self
            .client
            .post(&url)
            .header("authorization", self.authorization("POST", "docs", &link, &date))
            .header("x-ms-date", &date)
            .header("x-ms-version", COSMOS_API_VERSION)
            .header(
                "x-ms-documentdb-partitionkey",
                serde_json::json!([id]).to_string(),
            )
            .json(item)
            .send()
            .await?;

        match resp.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(InsertOutcome::Created),
            StatusCode::CONFLICT => Ok(InsertOutcome::AlreadyExists),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(StoreError::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// The key is validated at construction; nothing can go stale locally.
    fn check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "cosmos"
    }
}
