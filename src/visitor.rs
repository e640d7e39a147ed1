use std::fmt;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::geo::GeoLocation;
use crate::store::{DocumentStore, InsertOutcome};

/// One logged request: network, browser and location metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VisitorRecord {
    pub ip_address: String,
    pub user_agent: String,
    pub country: String,
    pub country_code: String,
    pub city: String,
    pub region: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: String,
    pub referer: String,
    pub accept_language: String,
}

impl VisitorRecord {
    pub fn new(ip_address: String, headers: &HeaderMap, location: &GeoLocation) -> Self {
        Self {
            ip_address,
            user_agent: header_or(headers, &header::USER_AGENT, "Unknown"),
            country: location.country.clone(),
            country_code: location.country_code.clone(),
            city: location.city.clone(),
            region: location.region.clone(),
            latitude: location.latitude,
            longitude: location.longitude,
            timezone: location.timezone.clone(),
            referer: header_or(headers, &header::REFERER, "Direct"),
            accept_language: header_or(headers, &header::ACCEPT_LANGUAGE, "Unknown"),
        }
    }
}

pub(crate) fn header_or(headers: &HeaderMap, name: &header::HeaderName, default: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(default)
        .to_string()
}

/// The stored shape: the record plus a synthetic id and a timestamp.
#[derive(Debug, Serialize)]
pub struct VisitorDocument<'a> {
    pub id: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub record: &'a VisitorRecord,
}

impl<'a> VisitorDocument<'a> {
    pub fn new(record: &'a VisitorRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{}_{}", record.ip_address, now.timestamp()),
            timestamp: now.to_rfc3339(),
            record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Saved { id: String },
    /// Same id written earlier; counts as success.
    AlreadyExists { id: String },
    Failed { reason: String },
}

impl PersistOutcome {
    pub fn is_saved(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for PersistOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved { id } => write!(f, "saved {id}"),
            Self::AlreadyExists { id } => write!(f, "already exists {id}"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Best-effort write of one visitor record. Never returns an error; failures
/// are logged and reported through the outcome.
pub async fn persist_visitor(
    store: Option<&dyn DocumentStore>,
    record: &VisitorRecord,
) -> PersistOutcome {
    let Some(store) = store else {
        tracing::error!("Document store client not available");
        return PersistOutcome::Failed {
            reason: "store not configured".to_string(),
        };
    };

    let document = VisitorDocument::new(record, Utc::now());
    let body = match serde_json::to_value(&document) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Failed to serialize visitor document: {e}");
            return PersistOutcome::Failed {
                reason: e.to_string(),
            };
        }
    };

    match store.create_item(&body).await {
        Ok(InsertOutcome::Created) => {
            tracing::info!("Saved visitor data: {}", document.id);
            PersistOutcome::Saved { id: document.id }
        }
        Ok(InsertOutcome::AlreadyExists) => {
            tracing::warn!("Document already exists: {}", document.id);
            PersistOutcome::AlreadyExists { id: document.id }
        }
        Err(e) => {
            tracing::error!("Error saving visitor data: {e}");
            PersistOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}
