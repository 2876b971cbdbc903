//! MapShed worker service.
//!
//! Consumes MapShed jobs from the Redis queue, runs geoprocessing and model
//! assembly, and serves job status over HTTP.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use geoprocessing::{HttpEngine, MultiRunner};
use mapshed_worker::config::Args;
use mapshed_worker::server::{self, ServerState};
use mapshed_worker::{ChainBuilder, ChainContext, MapshedJob, Worker};
use storage::{JobFeed, JobQueue, JobStore, RedisCache, RedisJobStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.level())
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("failed to install Prometheus recorder: {}", e))?;

    let worker_name = args
        .name
        .clone()
        .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));

    info!(name = %worker_name, "Starting MapShed worker");

    let config = Arc::new(args.geop_config()?);
    info!(
        engine = %config.base_url(),
        cache = config.cache_enabled,
        chunk_size = config.chunk_size,
        "Geoprocessing configured"
    );

    // Connect to services
    let engine = Arc::new(HttpEngine::new(&config)?);
    let cache = Arc::new(RedisCache::connect(&args.redis_url).await?);
    let jobs: Arc<dyn JobStore> = Arc::new(RedisJobStore::connect(&args.redis_url).await?);
    let queue: Arc<dyn JobFeed<MapshedJob>> =
        Arc::new(JobQueue::<MapshedJob>::connect(&args.redis_url).await?);

    info!("Connected to Redis");

    let ctx = ChainContext {
        multi: Arc::new(MultiRunner::new(engine, cache, config.clone())),
        ancillary: Arc::new(args.ancillary_source()?),
        simulation: None,
        jobs: jobs.clone(),
        station_count: args.stations,
    };

    let server_state = Arc::new(ServerState {
        jobs,
        prometheus: Some(prometheus),
    });
    let status_port = args.status_port;
    tokio::spawn(async move {
        if let Err(e) = server::run_server(server_state, status_port).await {
            error!(error = %e, "Status server failed");
        }
    });

    // Handle Ctrl+C
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal.cancel();
    });

    Worker::new(worker_name, ChainBuilder::new(&config), ctx, args.concurrency)
        .run(queue, shutdown)
        .await;

    Ok(())
}
