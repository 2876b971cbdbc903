//! Worker loop over an in-process feed.

mod common;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use common::*;
use geoprocessing::GeopConfig;
use mapshed_worker::{ChainBuilder, MapshedJob, Worker};
use storage::{JobFeed, JobStatus, QueuedJob};

#[tokio::test]
async fn test_jobs_acked_after_terminal_status() {
    let h = harness(FixtureEngine::new(), GeopConfig::default());
    let done = QueuedJob::new(MapshedJob::area(area("huc12__55174")));
    let rejected = QueuedJob::new(MapshedJob::watershed(watershed(), Vec::new()));
    let ids = [done.id, rejected.id];

    let shutdown = CancellationToken::new();
    let feed = Arc::new(MemoryFeed::new(
        h.jobs.clone(),
        vec![done, rejected],
        shutdown.clone(),
    ));
    let dyn_feed: Arc<dyn JobFeed<MapshedJob>> = feed.clone();

    Worker::new("test-worker", ChainBuilder::new(&h.config), h.ctx.clone(), 2)
        .run(dyn_feed, shutdown)
        .await;

    let mut acks = feed.acks();
    acks.sort_by_key(|(id, _)| ids.iter().position(|known| known == id));
    assert_eq!(
        acks,
        vec![
            (ids[0], Some(JobStatus::Complete)),
            (ids[1], Some(JobStatus::Failed)),
        ]
    );
}
