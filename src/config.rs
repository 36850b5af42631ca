//! Configuration management for crpt-gate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};
use crate::ratelimit::{TimeUnit, WindowConfig};

/// Main configuration for the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    /// Outbound rate limit
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Document API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Outbound rate limit: `requests_per_unit` requests per one `unit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Number of requests allowed per unit of time
    #[serde(default = "default_requests_per_unit")]
    pub requests_per_unit: u32,

    /// The time unit
    #[serde(default = "default_unit")]
    pub unit: TimeUnit,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_unit: default_requests_per_unit(),
            unit: default_unit(),
        }
    }
}

impl RateLimitSettings {
    /// Validate these settings into a window configuration.
    pub fn window(&self) -> Result<WindowConfig> {
        WindowConfig::per(self.unit, self.requests_per_unit)
    }
}

fn default_requests_per_unit() -> u32 {
    3
}

fn default_unit() -> TimeUnit {
    TimeUnit::Second
}

/// Document API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Create-document endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "https://ismp.crpt.ru/api/v3/lk/documents/create".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl GateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))?;
        config.rate_limit.window()?;
        Ok(config)
    }
}
