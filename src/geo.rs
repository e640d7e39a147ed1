use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Field set requested from ip-api.com.
pub const IP_API_FIELDS: &str = "status,message,country,countryCode,region,city,lat,lon,timezone";

const UNKNOWN: &str = "Unknown";
const UNKNOWN_CODE: &str = "XX";

/// Normalized location for an IP address. Every string field carries a
/// sentinel instead of being absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    #[serde(rename = "countryCode")]
    pub country_code: String,
    pub city: String,
    pub region: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: String,
}

impl GeoLocation {
    pub fn local() -> Self {
        Self {
            country: "Local/Private".to_string(),
            country_code: "LOCAL".to_string(),
            city: "Local".to_string(),
            region: "Local".to_string(),
            latitude: None,
            longitude: None,
            timezone: UNKNOWN.to_string(),
        }
    }

    pub fn invalid() -> Self {
        Self::failure("Invalid IP".to_string(), UNKNOWN)
    }

    /// Error-valued record. `place` fills both city and region.
    pub fn failure(country: String, place: &str) -> Self {
        Self {
            country,
            country_code: UNKNOWN_CODE.to_string(),
            city: place.to_string(),
            region: place.to_string(),
            latitude: None,
            longitude: None,
            timezone: UNKNOWN.to_string(),
        }
    }
}

/// Loopback and private ranges are never sent upstream.
pub fn is_local_address(ip: &str) -> bool {
    matches!(ip, "127.0.0.1" | "localhost")
        || ip.starts_with("192.168.")
        || ip.starts_with("10.")
        || ip.starts_with("172.")
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Never fails: upstream problems come back as error-valued records.
    async fn locate(&self, ip: &str) -> GeoLocation;
}

pub struct IpApiLocator {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl IpApiLocator {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, ip: &str) -> Result<GeoLocation, reqwest::Error> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(ip)
        );
        tracing::info!("Making request to: {url}?fields={IP_API_FIELDS}");

        let resp = self
            .client
            .get(&url)
            .query(&[("fields", IP_API_FIELDS)])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        tracing::info!("Response status: {}", status.as_u16());

        if status != StatusCode::OK {
            tracing::error!("HTTP error: {}", status.as_u16());
            return Ok(GeoLocation::failure(
                format!("HTTP Error: {}", status.as_u16()),
                UNKNOWN,
            ));
        }

        let body = resp.json::<IpApiResponse>().await?;
        tracing::debug!("API response: {body:?}");
        Ok(body.into_location())
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn locate(&self, ip: &str) -> GeoLocation {
        tracing::info!("Getting geolocation for IP: {ip}");

        if is_local_address(ip) {
            tracing::info!("Local/Private IP detected: {ip}");
            return GeoLocation::local();
        }

        if ip.is_empty() {
            tracing::warn!("Empty IP address provided");
            return GeoLocation::invalid();
        }

        match self.fetch(ip).await {
            Ok(location) => location,
            Err(e) if e.is_timeout() => {
                tracing::error!("Timeout getting country from IP {ip}");
                GeoLocation::failure("Timeout Error".to_string(), UNKNOWN)
            }
            Err(e) => {
                tracing::error!("Error getting country from IP {ip}: {e}");
                GeoLocation::failure(format!("Error: {e}"), "Error")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    #[serde(default)]
    status: String,
    message: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
}

impl IpApiResponse {
    fn into_location(self) -> GeoLocation {
        if self.status != "success" {
            let message = self.message.unwrap_or_else(|| UNKNOWN.to_string());
            tracing::error!("API returned error: {message}");
            return GeoLocation::failure(format!("API Error: {message}"), UNKNOWN);
        }

        let location = GeoLocation {
            country: self.country.unwrap_or_else(|| UNKNOWN.to_string()),
            country_code: self.country_code.unwrap_or_else(|| UNKNOWN_CODE.to_string()),
            city: self.city.unwrap_or_else(|| UNKNOWN.to_string()),
            region: self.region.unwrap_or_else(|| UNKNOWN.to_string()),
            latitude: self.lat,
            longitude: self.lon,
            timezone: self.timezone.unwrap_or_else(|| UNKNOWN.to_string()),
        };
        tracing::info!("Successfully retrieved geolocation: {location:?}");
        location
    }
}
