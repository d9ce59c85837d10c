//! Application configuration: TOML defaults overlaid with environment
//! variables, loaded once at process startup via the `config` crate and
//! checked with `validator`.

use std::time::Duration;

use serde::Deserialize;
use validator::Validate;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub database_url: String,

    /// pgmq connects over the same Postgres unless this is set.
    pub broker_database_url: Option<String>,

    #[validate(length(min = 16))]
    pub credential_encryption_key: String,

    #[validate(length(min = 16))]
    pub jwt_secret: String,

    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,

    #[serde(default = "default_jwt_lifetime_seconds")]
    pub jwt_lifetime_seconds: u64,

    #[validate(length(min = 16))]
    pub app_secret_key: String,

    pub commerce_api_key: String,
    pub commerce_api_secret: String,

    #[serde(default)]
    pub commerce_allowed_scopes: CommaSeparated,

    pub llm_endpoint: String,
    pub llm_api_key: String,
    pub llm_model_planner: String,
    pub llm_model_aggregator: String,
    pub llm_model_tool: String,
    pub llm_model_creative: String,

    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    pub otel_exporter_otlp_endpoint: Option<String>,
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

fn default_jwt_lifetime_seconds() -> u64 {
    3600
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

/// Deserializes a comma-separated env var into a `Vec<String>`.
#[derive(Debug, Clone, Default)]
pub struct CommaSeparated(pub Vec<String>);

impl<'de> Deserialize<'de> for CommaSeparated {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(CommaSeparated(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        ))
    }
}

impl AppConfig {
    /// Loads defaults from `config/default.toml` (if present), overlays
    /// `.env`-sourced process environment variables, and validates.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()
            .map_err(|e| CoreError::Configuration(e.to_string()))?;

        let cfg: AppConfig = settings
            .try_deserialize()
            .map_err(|e| CoreError::Configuration(e.to_string()))?;

        cfg.validate()
            .map_err(|e| CoreError::Configuration(e.to_string()))?;

        Ok(cfg)
    }

    pub fn broker_url(&self) -> &str {
        self.broker_database_url
            .as_deref()
            .unwrap_or(&self.database_url)
    }

    pub fn jwt_lifetime(&self) -> Duration {
        Duration::from_secs(self.jwt_lifetime_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_separated_trims_and_drops_empties() {
        let json = serde_json::Value::String("read_orders, write_fulfillments ,, read_customers".into());
        let parsed: CommaSeparated = serde_json::from_value(json).unwrap();
        assert_eq!(
            parsed.0,
            vec!["read_orders", "write_fulfillments", "read_customers"]
        );
    }
}
