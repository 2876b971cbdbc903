//! Multi-Area Runner: one operation set over many shapes in one call.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use geop_common::{ensure_distinct_keys, AreaDescriptor, GeopError, GeopResult};
use storage::CacheStore;

use crate::cache_key::CacheKey;
use crate::catalog::OperationSet;
use crate::config::GeopConfig;
use crate::engine::{GeoprocessingEngine, MultiRequest, RawResult};
use crate::layers::LayerConfig;
use crate::runner::ResultCache;

/// Area result key to operation label to raw result.
pub type PartialResultSet = BTreeMap<String, BTreeMap<String, RawResult>>;

/// Runs an operation set over many shapes, skipping fully cached areas.
#[derive(Clone)]
pub struct MultiRunner {
    engine: Arc<dyn GeoprocessingEngine>,
    cache: ResultCache,
    config: Arc<GeopConfig>,
}

impl MultiRunner {
    pub fn new(
        engine: Arc<dyn GeoprocessingEngine>,
        cache: Arc<dyn CacheStore>,
        config: Arc<GeopConfig>,
    ) -> Self {
        Self {
            engine,
            cache: ResultCache::new(cache),
            config,
        }
    }

    pub fn config(&self) -> &GeopConfig {
        &self.config
    }

    /// Resolve per-request overrides against the configured defaults.
    pub fn resolve_layers(&self, overrides: &BTreeMap<String, String>) -> GeopResult<LayerConfig> {
        self.config.layers.resolve(overrides)
    }

    /// Run `set` over `areas` with already-resolved layers.
    ///
    /// An area is left out of the engine request only when every operation
    /// of the set is cached for it. Fresh results for well-known areas are
    /// written back one (area, label) pair at a time.
    #[instrument(skip_all, fields(set = set.name(), areas = areas.len()))]
    pub async fn run(
        &self,
        set: OperationSet,
        areas: &[AreaDescriptor],
        stream_lines: &Value,
        layers: &LayerConfig,
    ) -> GeopResult<PartialResultSet> {
        ensure_distinct_keys(areas)?;

        let mut results = PartialResultSet::new();
        let mut outbound: Vec<&AreaDescriptor> = Vec::new();

        for area in areas {
            match self.cached_set(set, area, layers).await {
                Some(hit) => {
                    results.insert(area.result_key(), hit);
                }
                None => outbound.push(area),
            }
        }

        if outbound.is_empty() {
            debug!(cached = results.len(), "All areas cached, skipping engine call");
            return Ok(results);
        }

        let request = MultiRequest::build(set, &outbound, stream_lines, layers)?;
        let mut response = self.engine.multi(&request).await?;

        info!(
            requested = outbound.len(),
            cached = results.len(),
            "Multi operation computed"
        );

        for area in outbound {
            let area_key = area.result_key();
            let fresh = response.remove(&area_key).ok_or_else(|| {
                GeopError::MalformedResult(format!("engine response is missing shape {}", area_key))
            })?;

            if self.config.cache_enabled {
                for (label, result) in &fresh {
                    if let Some(key) = CacheKey::for_area(&area.id, label, layers) {
                        self.cache.store(&key, result, None).await;
                    }
                }
            }

            results.insert(area_key, fresh);
        }

        Ok(results)
    }

    /// Every result of `set` for `area`, or `None` on any miss.
    async fn cached_set(
        &self,
        set: OperationSet,
        area: &AreaDescriptor,
        layers: &LayerConfig,
    ) -> Option<BTreeMap<String, RawResult>> {
        if !self.config.cache_enabled || !area.id.is_cacheable() {
            return None;
        }

        let mut hits = BTreeMap::new();
        for label in set.labels() {
            let key = CacheKey::for_area(&area.id, label, layers)?;
            let result = self.cache.lookup(&key).await?;
            hits.insert(label.to_string(), result);
        }

        Some(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geop_common::AreaId;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use storage::MemoryCache;

    use crate::engine::{MultiResponse, RunRequest};

    /// Answers every requested shape with one group per label.
    #[derive(Default)]
    struct EchoEngine {
        calls: AtomicUsize,
        shapes: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl GeoprocessingEngine for EchoEngine {
        async fn run(&self, _request: &RunRequest) -> GeopResult<RawResult> {
            Err(GeopError::Internal("not used".into()))
        }

        async fn multi(&self, request: &MultiRequest) -> GeopResult<MultiResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.shapes
                .lock()
                .unwrap()
                .push(request.shape_ids().map(str::to_string).collect());

            Ok(request
                .shapes
                .iter()
                .map(|shape| {
                    let per_label = request
                        .operations
                        .iter()
                        .map(|op| {
                            (
                                op.label.clone(),
                                BTreeMap::from([("List(1)".to_string(), 1.0)]),
                            )
                        })
                        .collect();
                    (shape.id.clone(), per_label)
                })
                .collect())
        }
    }

    fn huc(row: u32) -> AreaDescriptor {
        AreaDescriptor::new(
            AreaId::well_known("huc12", row.to_string()),
            json!({"type": "Polygon", "coordinates": []}),
        )
    }

    fn runner(engine: Arc<EchoEngine>, cache: MemoryCache) -> MultiRunner {
        MultiRunner::new(engine, Arc::new(cache), Arc::new(GeopConfig::default()))
    }

    #[tokio::test]
    async fn test_fully_cached_batch_makes_no_call() {
        let engine = Arc::new(EchoEngine::default());
        let runner = runner(engine.clone(), MemoryCache::default());
        let layers = LayerConfig::default();
        let areas = vec![huc(1), huc(2)];

        let first = runner
            .run(OperationSet::MapshedCore, &areas, &json!([]), &layers)
            .await
            .unwrap();
        let second = runner
            .run(OperationSet::MapshedCore, &areas, &json!([]), &layers)
            .await
            .unwrap();

        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_partial_area_hit_is_requested_in_full() {
        let engine = Arc::new(EchoEngine::default());
        let cache = MemoryCache::default();
        let runner = runner(engine.clone(), cache.clone());
        let layers = LayerConfig::default();

        // Only one label cached for huc12__1.
        let key = CacheKey::for_area(&huc(1).id, "gwn", &layers).unwrap();
        cache
            .set(key.as_str(), &json!({"List(3)": 9.0}), None)
            .await
            .unwrap();

        let results = runner
            .run(OperationSet::MapshedCore, &[huc(1)], &json!([]), &layers)
            .await
            .unwrap();

        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(results["huc12__1"]["gwn"]["List(1)"], 1.0);
        assert_eq!(
            results["huc12__1"].len(),
            OperationSet::MapshedCore.members().len()
        );
    }

    #[tokio::test]
    async fn test_uncached_areas_never_written() {
        let engine = Arc::new(EchoEngine::default());
        let cache = MemoryCache::default();
        let runner = runner(engine.clone(), cache.clone());

        let area = AreaDescriptor::uncached(json!({"type": "Polygon"})).with_member_id("sb-1");
        let results = runner
            .run(
                OperationSet::MapshedCore,
                &[area],
                &json!([]),
                &LayerConfig::default(),
            )
            .await
            .unwrap();

        assert!(results.contains_key("sb-1"));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_shape_in_response_is_an_error() {
        struct ForgetfulEngine;

        #[async_trait]
        impl GeoprocessingEngine for ForgetfulEngine {
            async fn run(&self, _request: &RunRequest) -> GeopResult<RawResult> {
                Err(GeopError::Internal("not used".into()))
            }

            async fn multi(&self, _request: &MultiRequest) -> GeopResult<MultiResponse> {
                Ok(MultiResponse::new())
            }
        }

        let runner = MultiRunner::new(
            Arc::new(ForgetfulEngine),
            Arc::new(MemoryCache::default()),
            Arc::new(GeopConfig::default()),
        );
        let err = runner
            .run(
                OperationSet::MapshedCore,
                &[huc(7)],
                &json!([]),
                &LayerConfig::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_result");
    }

    #[tokio::test]
    async fn test_colliding_uncached_areas_rejected_before_engine() {
        let engine = Arc::new(EchoEngine::default());
        let runner = runner(engine.clone(), MemoryCache::default());
        let areas = vec![
            AreaDescriptor::uncached(json!({"type": "Polygon", "coordinates": []})),
            AreaDescriptor::uncached(json!({"type": "Polygon", "coordinates": []})),
        ];

        let err = runner
            .run(
                OperationSet::MapshedCore,
                &areas,
                &json!([]),
                &LayerConfig::default(),
            )
            .await
            .unwrap_err();

        assert!(err.is_config_error());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }
}
