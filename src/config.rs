use std::env;
use std::time::Duration;

pub const DEFAULT_GEOIP_API_URL: &str = "http://ip-api.com/json";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub cosmos_endpoint: Option<String>,
    pub cosmos_key: Option<String>,
    pub database_name: String,
    pub container_name: String,
    pub host: String,
    pub port: u16,
    pub geoip_api_url: String,
    pub geoip_timeout_secs: u64,
    pub templates_dir: String,
    pub debug: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {0}")]
    MissingVars(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cosmos_endpoint: None,
            cosmos_key: None,
            database_name: "webapp-db".to_string(),
            container_name: "visitor-logs".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            geoip_api_url: DEFAULT_GEOIP_API_URL.to_string(),
            geoip_timeout_secs: 10,
            templates_dir: "src/templates".to_string(),
            debug: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cosmos_endpoint: env::var("COSMOS_ENDPOINT").ok().filter(|s| !s.is_empty()),
            cosmos_key: env::var("COSMOS_KEY").ok().filter(|s| !s.is_empty()),
            database_name: env::var("COSMOS_DATABASE_NAME").unwrap_or(defaults.database_name),
            container_name: env::var("COSMOS_CONTAINER_NAME").unwrap_or(defaults.container_name),
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            geoip_api_url: env::var("GEOIP_API_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.geoip_api_url),
            geoip_timeout_secs: env::var("GEOIP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.geoip_timeout_secs),
            templates_dir: env::var("TEMPLATES_DIR").unwrap_or(defaults.templates_dir),
            debug: env::var("DEBUG").is_ok_and(|s| s.eq_ignore_ascii_case("true")),
        }
    }

    /// Persistence needs an endpoint; everything else has a default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.cosmos_endpoint.is_none() {
            missing.push("COSMOS_ENDPOINT");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingVars(missing.join(", ")))
        }
    }

    pub fn geoip_timeout(&self) -> Duration {
        Duration::from_secs(self.geoip_timeout_secs)
    }

    pub fn templates_glob(&self) -> String {
        format!("{}/**/*.html", self.templates_dir.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database_name, "webapp-db");
        assert_eq!(config.container_name, "visitor-logs");
        assert_eq!(config.port, 8000);
        assert_eq!(config.geoip_timeout(), Duration::from_secs(10));
        assert!(config.cosmos_endpoint.is_none());
    }

    #[test]
    fn test_validate_requires_endpoint() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required environment variables: COSMOS_ENDPOINT"
        );

        let config = AppConfig {
            cosmos_endpoint: Some("https://example.documents.azure.com:443/".to_string()),
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_templates_glob() {
        let config = AppConfig {
            templates_dir: "templates/".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.templates_glob(), "templates/**/*.html");
    }
}
