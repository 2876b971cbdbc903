//! Configuration for the geoprocessing client.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use geop_common::{GeopError, GeopResult};

use crate::layers::LayerConfig;

/// Retry policy for transient engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound on the delay between retries, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Configuration for the geoprocessing client and runners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeopConfig {
    /// Engine host name.
    pub host: String,

    /// Engine port.
    pub port: u16,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    pub retry: RetryPolicy,

    /// Read and write the result cache.
    pub cache_enabled: bool,

    /// Sub-basins per Multi-Area Runner call.
    pub chunk_size: usize,

    /// Chunks dispatched at once.
    pub chunk_concurrency: usize,

    /// TTL for parameterized results, in seconds.
    pub short_ttl_secs: u64,

    /// Default dataset for each layer token.
    pub layers: LayerConfig,
}

impl Default for GeopConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8090,
            timeout_secs: 200,
            retry: RetryPolicy::default(),
            cache_enabled: true,
            chunk_size: 8,
            chunk_concurrency: 4,
            short_ttl_secs: 3_600,
            layers: LayerConfig::default(),
        }
    }
}

impl GeopConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GEOP_HOST") {
            config.host = val;
        }

        if let Ok(val) = std::env::var("GEOP_PORT") {
            if let Ok(port) = val.parse() {
                config.port = port;
            }
        }

        if let Ok(val) = std::env::var("GEOP_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.timeout_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("GEOP_MAX_RETRIES") {
            if let Ok(n) = val.parse() {
                config.retry.max_retries = n;
            }
        }

        if let Ok(val) = std::env::var("GEOP_CACHE") {
            config.cache_enabled = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("GEOP_CHUNK_SIZE") {
            if let Ok(size) = val.parse() {
                config.chunk_size = size;
            }
        }

        config
    }

    /// Load configuration from a YAML file. Missing fields take defaults.
    pub fn from_yaml(path: impl AsRef<Path>) -> GeopResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GeopError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config: Self = serde_yaml::from_str(&content).map_err(|e| {
            GeopError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        // A partial `layers:` map only replaces the tokens it names.
        config.layers = LayerConfig::default().merge(config.layers);

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("host must not be empty".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("timeout_secs must be > 0".to_string());
        }

        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }

        if self.chunk_concurrency == 0 {
            return Err("chunk_concurrency must be > 0".to_string());
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err("retry.initial_delay_ms must be <= retry.max_delay_ms".to_string());
        }

        Ok(())
    }

    /// Base URL of the engine.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn short_ttl(&self) -> Duration {
        Duration::from_secs(self.short_ttl_secs)
    }
}
