//! Fan-out over sub-basins: chunking, joining, and failure propagation.

mod common;

use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use common::{multi_runner, CountingEngine};
use geop_common::{AreaDescriptor, AreaId, GeopError};
use geoprocessing::{run_chunked, GeopConfig, LayerConfig, OperationSet};
use storage::MemoryCache;
use test_utils::pa_square;

fn sub_basins(n: usize) -> Vec<AreaDescriptor> {
    (0..n)
        .map(|i| AreaDescriptor::new(AreaId::well_known("huc12", i.to_string()), pa_square()))
        .collect()
}

fn config(chunk_size: usize, chunk_concurrency: usize) -> GeopConfig {
    GeopConfig {
        chunk_size,
        chunk_concurrency,
        ..GeopConfig::default()
    }
}

#[tokio::test]
async fn test_join_contains_every_sub_basin() {
    let engine = Arc::new(CountingEngine::new());
    let runner = Arc::new(multi_runner(engine.clone(), MemoryCache::default(), config(8, 4)));
    let basins = sub_basins(20);

    let joined = run_chunked(
        runner,
        OperationSet::MapshedCore,
        &basins,
        &json!([]),
        &LayerConfig::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(engine.multi_calls(), 3);
    assert_eq!(joined.len(), 20);
    for basin in &basins {
        assert!(joined.contains_key(&basin.result_key()));
    }

    let mut sizes: Vec<_> = engine.multi_shapes().iter().map(Vec::len).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![4, 8, 8]);
}

#[tokio::test]
async fn test_failed_chunk_fails_the_join() {
    let engine = Arc::new(CountingEngine::failing_on(&["huc12__9"]));
    let runner = Arc::new(multi_runner(engine.clone(), MemoryCache::default(), config(4, 2)));

    let err = run_chunked(
        runner,
        OperationSet::MapshedCore,
        &sub_basins(16),
        &json!([]),
        &LayerConfig::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err, GeopError::ServiceUnreachable);
}

#[tokio::test]
async fn test_failure_stops_later_dispatch() {
    let engine = Arc::new(CountingEngine::failing_on(&["huc12__0"]));
    // One chunk at a time, so the failure is seen before the next dispatch.
    let runner = Arc::new(multi_runner(engine.clone(), MemoryCache::default(), config(2, 1)));

    let cancel = CancellationToken::new();
    let result = run_chunked(
        runner,
        OperationSet::MapshedCore,
        &sub_basins(10),
        &json!([]),
        &LayerConfig::default(),
        cancel.clone(),
    )
    .await;

    assert_eq!(result.unwrap_err(), GeopError::ServiceUnreachable);
    assert!(cancel.is_cancelled());
    assert_eq!(engine.multi_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_is_an_error() {
    let engine = Arc::new(CountingEngine::new());
    let runner = Arc::new(multi_runner(engine.clone(), MemoryCache::default(), config(4, 4)));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = run_chunked(
        runner,
        OperationSet::MapshedCore,
        &sub_basins(8),
        &json!([]),
        &LayerConfig::default(),
        cancel,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(engine.multi_calls(), 0);
}

#[tokio::test]
async fn test_cached_chunks_need_no_engine_call() {
    let engine = Arc::new(CountingEngine::new());
    let cache = MemoryCache::default();
    let runner = Arc::new(multi_runner(engine.clone(), cache, config(4, 4)));
    let basins = sub_basins(8);

    for _ in 0..2 {
        run_chunked(
            runner.clone(),
            OperationSet::MapshedCore,
            &basins,
            &json!([]),
            &LayerConfig::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    }

    assert_eq!(engine.multi_calls(), 2);
}

#[tokio::test]
async fn test_drawn_sub_basins_join_by_member_id() {
    let engine = Arc::new(CountingEngine::new());
    let runner = Arc::new(multi_runner(engine.clone(), MemoryCache::default(), config(2, 2)));
    let basins: Vec<_> = (0..3)
        .map(|i| AreaDescriptor::uncached(pa_square()).with_member_id(format!("drawn-{}", i)))
        .collect();

    let joined = run_chunked(
        runner,
        OperationSet::MapshedCore,
        &basins,
        &json!([]),
        &LayerConfig::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(joined.len(), 3);
    assert!(joined.contains_key("drawn-2"));
}

#[tokio::test]
async fn test_shared_keys_across_chunks_are_rejected() {
    let engine = Arc::new(CountingEngine::new());
    let runner = Arc::new(multi_runner(engine.clone(), MemoryCache::default(), config(1, 2)));
    let basins = vec![
        AreaDescriptor::uncached(pa_square()),
        AreaDescriptor::uncached(pa_square()),
    ];

    let err = run_chunked(
        runner,
        OperationSet::MapshedCore,
        &basins,
        &json!([]),
        &LayerConfig::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(err.is_config_error());
    assert_eq!(engine.multi_calls(), 0);
}
