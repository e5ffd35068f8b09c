//! Configuration management for the CRPT client.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{CrptError, Result};
use crate::gate::{AdmissionGate, TimeUnit};

/// Main configuration for the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrptConfig {
    /// Remote API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Document creation endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_endpoint() -> String {
    "https://ismp.crpt.ru/api/v3/lk/documents/create".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ApiConfig {
    /// Get the per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Throttling policy: at most `request_limit` requests per one `time_unit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Length of each window
    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,

    /// Requests admitted per window
    #[serde(default = "default_request_limit")]
    pub request_limit: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            time_unit: default_time_unit(),
            request_limit: default_request_limit(),
        }
    }
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Second
}

fn default_request_limit() -> u32 {
    5
}

impl RateLimitSettings {
    /// Build the admission gate for this policy.
    pub fn build_gate(&self) -> Result<AdmissionGate> {
        Ok(AdmissionGate::per_unit(self.time_unit, self.request_limit)?)
    }
}

impl CrptConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading client configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CrptConfig = serde_yaml::from_str(yaml)
            .map_err(|e| CrptError::Config(format!("Failed to parse client config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a working client.
    pub fn validate(&self) -> Result<()> {
        if self.api.endpoint.is_empty() {
            return Err(CrptError::Config("api.endpoint must not be empty".to_string()));
        }
        if self.api.timeout_ms == 0 {
            return Err(CrptError::Config("api.timeout_ms must be positive".to_string()));
        }
        if self.rate_limit.request_limit == 0 {
            return Err(CrptError::Config(
                "rate_limit.request_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrptConfig::default();
        assert_eq!(
            config.api.endpoint,
            "https://ismp.crpt.ru/api/v3/lk/documents/create"
        );
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert_eq!(config.rate_limit.time_unit, TimeUnit::Second);
        assert_eq!(config.rate_limit.request_limit, 5);
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
rate_limit:
  time_unit: minute
  request_limit: 100
"#;
        let config = CrptConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limit.time_unit, TimeUnit::Minute);
        assert_eq!(config.rate_limit.request_limit, 100);
        assert_eq!(config.api.timeout_ms, 30_000);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
api:
  endpoint: http://localhost:8080/create
  timeout_ms: 500
rate_limit:
  time_unit: millisecond
  request_limit: 2
"#;
        let config = CrptConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.api.endpoint, "http://localhost:8080/create");

        let gate = config.rate_limit.build_gate().unwrap();
        assert_eq!(gate.window(), Duration::from_millis(1));
        assert_eq!(gate.capacity(), 2);
    }

    #[test]
    fn test_zero_request_limit_rejected() {
        let yaml = r#"
rate_limit:
  request_limit: 0
"#;
        assert!(matches!(
            CrptConfig::from_yaml(yaml),
            Err(CrptError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_time_unit_rejected() {
        let yaml = r#"
rate_limit:
  time_unit: fortnight
"#;
        assert!(CrptConfig::from_yaml(yaml).is_err());
    }
}
