//! Worker configuration: command line, environment and the optional
//! geoprocessing YAML file.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, Level};

use geoprocessing::GeopConfig;
use mapshed::ancillary::DEFAULT_STATION_COUNT;
use mapshed::{Ancillary, StaticAncillary};

#[derive(Parser, Debug, Clone)]
#[command(name = "mapshed-worker")]
#[command(about = "Runs MapShed geoprocessing and model assembly jobs")]
pub struct Args {
    /// Redis URL for the cache, job records and job queue
    #[arg(long, env = "REDIS_URL", default_value = "redis://redis:6379")]
    pub redis_url: String,

    /// Worker name (for consumer group)
    #[arg(short, long, env = "WORKER_NAME")]
    pub name: Option<String>,

    /// Number of concurrent jobs
    #[arg(short, long, env = "WORKER_CONCURRENCY", default_value = "4")]
    pub concurrency: usize,

    /// Weather stations averaged per area
    #[arg(long, default_value_t = DEFAULT_STATION_COUNT)]
    pub stations: usize,

    /// Geoprocessing YAML config; environment variables are used otherwise
    #[arg(long, env = "GEOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON file of ancillary data (weather, animals, point sources)
    /// served for every area
    #[arg(long, env = "MAPSHED_ANCILLARY")]
    pub ancillary: Option<PathBuf>,

    /// Port for status HTTP server
    #[arg(long, env = "STATUS_PORT", default_value = "8091")]
    pub status_port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Load and validate the geoprocessing configuration.
    pub fn geop_config(&self) -> Result<GeopConfig> {
        let config = match &self.config {
            Some(path) => {
                info!(path = %path.display(), "Loading geoprocessing config");
                GeopConfig::from_yaml(path)
                    .with_context(|| format!("failed to load {}", path.display()))?
            }
            None => GeopConfig::from_env(),
        };

        config
            .validate()
            .map_err(|e| anyhow!("invalid geoprocessing config: {}", e))?;

        Ok(config)
    }

    /// The ancillary source. Without a file every area gets empty
    /// ancillary data.
    pub fn ancillary_source(&self) -> Result<StaticAncillary> {
        let Some(path) = &self.ancillary else {
            return Ok(StaticAncillary::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let data: Ancillary = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        info!(
            path = %path.display(),
            stations = data.weather.len(),
            point_sources = data.point_sources.len(),
            "Loaded ancillary data"
        );
        Ok(StaticAncillary::new(data))
    }
}
