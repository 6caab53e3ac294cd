//! Configuration management for Slidegate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SlidegateError};

/// Prefix for environment variable overrides, e.g. `SLIDEGATE__SERVER__HTTP_ADDR`.
const ENV_PREFIX: &str = "SLIDEGATE";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for the Slidegate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlidegateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Whether the first `X-Forwarded-For` entry identifies the client
    #[serde(default = "default_trust_forwarded_header")]
    pub trust_forwarded_header: bool,

    /// What to do with requests whose client address cannot be resolved
    #[serde(default)]
    pub unresolved_client: UnresolvedClientPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            trust_forwarded_header: default_trust_forwarded_header(),
            unresolved_client: UnresolvedClientPolicy::default(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_trust_forwarded_header() -> bool {
    true
}

/// Handling of requests that carry neither a forwarded header nor a peer address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedClientPolicy {
    /// All such requests share a single `unknown` bucket.
    #[default]
    Shared,
    /// Such requests are refused before reaching the limiter.
    Reject,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum admitted requests per client within one window
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Window length in seconds
    #[serde(default = "default_time_window")]
    pub time_window_secs: u64,

    /// How often idle clients are evicted, in seconds (0 disables sweeping)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            time_window_secs: default_time_window(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_max_requests() -> usize {
    5
}

fn default_time_window() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    300
}

impl RateLimitingConfig {
    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl SlidegateConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SlidegateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| SlidegateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file path, with environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Load configuration from an optional YAML file, then `SLIDEGATE__*` environment variables.
    ///
    /// The file is parsed as YAML whatever its extension.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: SlidegateConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.max_requests == 0 {
            return Err(SlidegateError::Config(
                "rate_limiting.max_requests must be at least 1".to_string(),
            ));
        }
        if self.rate_limiting.time_window_secs == 0 {
            return Err(SlidegateError::Config(
                "rate_limiting.time_window_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
