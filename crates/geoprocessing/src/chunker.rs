//! Fan-out Chunker.
//!
//! Splits a watershed's sub-basins into bounded chunks, runs one
//! Multi-Area Runner call per chunk concurrently, and joins every chunk
//! before returning. The join never drops a failed chunk's areas: any
//! failure fails the whole join.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use geop_common::{ensure_distinct_keys, AreaDescriptor, GeopError, GeopResult};

use crate::catalog::OperationSet;
use crate::layers::LayerConfig;
use crate::multi::{MultiRunner, PartialResultSet};

/// Partition `areas` into `ceil(len / size)` chunks, preserving order.
pub fn chunk_areas(areas: &[AreaDescriptor], size: usize) -> Vec<Vec<AreaDescriptor>> {
    areas
        .chunks(size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

enum ChunkOutcome {
    Done(PartialResultSet),
    Failed(GeopError),
    /// Not run because another chunk had already failed.
    Skipped,
}

enum Branch {
    Running(JoinHandle<ChunkOutcome>),
    Skipped,
}

/// Run `set` over `areas` in chunks of the configured size and join the
/// results into one set keyed by area.
///
/// The first failing chunk cancels `cancel`, so chunks that have not
/// started yet are skipped. When several chunks fail, the error of the
/// earliest chunk is returned.
pub async fn run_chunked(
    runner: Arc<MultiRunner>,
    set: OperationSet,
    areas: &[AreaDescriptor],
    stream_lines: &Value,
    layers: &LayerConfig,
    cancel: CancellationToken,
) -> GeopResult<PartialResultSet> {
    // Keys must be unique across chunks too, or the join overwrites.
    ensure_distinct_keys(areas)?;

    let chunk_size = runner.config().chunk_size;
    let chunks = chunk_areas(areas, chunk_size);
    let total = chunks.len();
    let start = Instant::now();

    info!(
        areas = areas.len(),
        chunks = total,
        chunk_size = chunk_size,
        "Dispatching chunked geoprocessing"
    );

    let semaphore = Arc::new(Semaphore::new(runner.config().chunk_concurrency.max(1)));
    let stream_lines = Arc::new(stream_lines.clone());
    let layers = Arc::new(layers.clone());
    let mut branches = Vec::with_capacity(total);

    for (index, chunk) in chunks.into_iter().enumerate() {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| GeopError::Internal(format!("chunk semaphore closed: {}", e)))?;

        if cancel.is_cancelled() {
            debug!(chunk = index, "Skipping chunk after earlier failure");
            branches.push(Branch::Skipped);
            continue;
        }

        let runner = runner.clone();
        let stream_lines = stream_lines.clone();
        let layers = layers.clone();
        let cancel = cancel.clone();

        branches.push(Branch::Running(tokio::spawn(async move {
            let outcome = match runner.run(set, &chunk, &stream_lines, &layers).await {
                Ok(results) => ChunkOutcome::Done(results),
                Err(e) => {
                    warn!(chunk = index, error = %e, "Chunk failed");
                    cancel.cancel();
                    ChunkOutcome::Failed(e)
                }
            };
            drop(permit);
            outcome
        })));
    }

    // Join every branch, in chunk order, before deciding the outcome.
    let mut joined = PartialResultSet::new();
    let mut first_error: Option<GeopError> = None;
    let mut skipped = 0;

    for branch in branches {
        let outcome = match branch {
            Branch::Running(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => ChunkOutcome::Failed(GeopError::Internal(format!(
                    "chunk task panicked: {}",
                    e
                ))),
            },
            Branch::Skipped => ChunkOutcome::Skipped,
        };

        match outcome {
            ChunkOutcome::Done(results) => joined.extend(results),
            ChunkOutcome::Failed(e) => {
                first_error.get_or_insert(e);
            }
            ChunkOutcome::Skipped => skipped += 1,
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    if skipped > 0 {
        return Err(GeopError::Internal(format!(
            "{} of {} chunks cancelled before dispatch",
            skipped, total
        )));
    }

    info!(
        areas = joined.len(),
        chunks = total,
        duration_ms = start.elapsed().as_millis() as u64,
        "Chunked geoprocessing joined"
    );

    Ok(joined)
}
