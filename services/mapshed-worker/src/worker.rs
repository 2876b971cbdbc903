//! Queue consumer: claims submitted jobs and runs their chains.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use storage::{JobFeed, QueuedJob};

use crate::chain::{ChainBuilder, ChainContext, ChainOutcome, FailureSink, Stage};
use crate::request::MapshedJob;

/// Run one queued job: record it as started, then run its chain.
pub async fn process_job(
    builder: &ChainBuilder,
    ctx: &ChainContext,
    job: QueuedJob<MapshedJob>,
) -> ChainOutcome {
    info!(job_id = %job.id, kind = job.payload.kind(), "Processing job");

    if let Err(e) = ctx.jobs.start(job.id).await {
        error!(job_id = %job.id, error = %e, "Failed to record job start");
    }

    match builder.build(job.id, job.payload) {
        Ok(chain) => chain.run(ctx).await,
        Err(error) => {
            FailureSink::new(ctx.jobs.clone(), job.id)
                .fail(Stage::Validate, &error)
                .await;
            ChainOutcome::Failed {
                stage: Stage::Validate,
                error,
            }
        }
    }
}

/// Consumes the job queue with bounded concurrency.
pub struct Worker {
    name: String,
    builder: ChainBuilder,
    ctx: Arc<ChainContext>,
    concurrency: usize,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        builder: ChainBuilder,
        ctx: ChainContext,
        concurrency: usize,
    ) -> Self {
        Self {
            name: name.into(),
            builder,
            ctx: Arc::new(ctx),
            concurrency: concurrency.max(1),
        }
    }

    /// Claim and run jobs until `shutdown` is cancelled, then wait for the
    /// jobs in flight.
    ///
    /// A job is acked only after its chain has recorded a terminal status.
    pub async fn run(&self, feed: Arc<dyn JobFeed<MapshedJob>>, shutdown: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        info!(name = %self.name, concurrency = self.concurrency, "Worker started");

        while !shutdown.is_cancelled() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let claimed = tokio::select! {
                _ = shutdown.cancelled() => break,
                claimed = feed.claim_next(&self.name) => claimed,
            };

            match claimed {
                Ok(Some(job)) => {
                    let builder = self.builder.clone();
                    let ctx = self.ctx.clone();
                    let feed = feed.clone();
                    let job_id = job.id;
                    let entry_id = job.entry_id.clone();
                    tokio::spawn(async move {
                        process_job(&builder, &ctx, job).await;
                        if let Some(entry_id) = entry_id {
                            if let Err(e) = feed.ack(&entry_id).await {
                                error!(%job_id, error = %e, "Failed to ack job");
                            }
                        }
                        drop(permit);
                    });
                }
                Ok(None) => {
                    // Nothing queued; claim_next already blocked.
                }
                Err(e) => {
                    error!(error = %e, "Error claiming job");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        // Every permit back means every spawned job has finished.
        match semaphore.acquire_many(self.concurrency as u32).await {
            Ok(_) => info!(name = %self.name, "Worker stopped"),
            Err(e) => warn!(name = %self.name, error = %e, "Worker stopped without draining jobs"),
        };
    }
}
