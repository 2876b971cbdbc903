//! Common test helpers for geoprocessing integration tests.
//!
//! Provides a counting in-process engine and runner constructors over an
//! in-memory cache.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use geoprocessing::{
    GeoprocessingEngine, GeopConfig, MultiRequest, MultiResponse, MultiRunner, RawResult,
    RunRequest, Runner,
};
use geop_common::{GeopError, GeopResult};
use storage::MemoryCache;

/// Engine fake that counts calls and records what it was asked.
#[derive(Default)]
pub struct CountingEngine {
    run_calls: AtomicUsize,
    multi_calls: AtomicUsize,
    run_inputs: Mutex<Vec<RunRequest>>,
    multi_shapes: Mutex<Vec<Vec<String>>>,
    /// Shapes whose presence in a `/multi` request fails the call.
    failing_shapes: Vec<String>,
    /// Fixed `/multi` per-area results; otherwise one group per label.
    per_area: Option<Value>,
}

impl CountingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(shapes: &[&str]) -> Self {
        Self {
            failing_shapes: shapes.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_area_results(per_area: Value) -> Self {
        Self {
            per_area: Some(per_area),
            ..Self::default()
        }
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn multi_calls(&self) -> usize {
        self.multi_calls.load(Ordering::SeqCst)
    }

    pub fn run_inputs(&self) -> Vec<RunRequest> {
        self.run_inputs.lock().unwrap().clone()
    }

    /// Shape ids of each `/multi` request, in call order.
    pub fn multi_shapes(&self) -> Vec<Vec<String>> {
        self.multi_shapes.lock().unwrap().clone()
    }
}

#[async_trait]
impl GeoprocessingEngine for CountingEngine {
    async fn run(&self, request: &RunRequest) -> GeopResult<RawResult> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.run_inputs.lock().unwrap().push(request.clone());

        // Vary the result with the rasters so different layers differ.
        let rasters = request.input["rasters"].to_string();
        Ok(BTreeMap::from([
            ("List(1)".to_string(), 100.0),
            ("List(2)".to_string(), rasters.len() as f64),
        ]))
    }

    async fn multi(&self, request: &MultiRequest) -> GeopResult<MultiResponse> {
        self.multi_calls.fetch_add(1, Ordering::SeqCst);
        let ids: Vec<String> = request.shape_ids().map(str::to_string).collect();
        self.multi_shapes.lock().unwrap().push(ids.clone());

        if ids.iter().any(|id| self.failing_shapes.contains(id)) {
            return Err(GeopError::ServiceUnreachable);
        }

        let mut response = MultiResponse::new();
        for id in ids {
            let per_label: BTreeMap<String, RawResult> = match &self.per_area {
                Some(value) => serde_json::from_value(value.clone())?,
                None => request
                    .operations
                    .iter()
                    .map(|op| {
                        (
                            op.label.clone(),
                            BTreeMap::from([("List(1)".to_string(), 1.0)]),
                        )
                    })
                    .collect(),
            };
            response.insert(id, per_label);
        }
        Ok(response)
    }
}

pub fn runner(engine: Arc<CountingEngine>, cache: MemoryCache) -> Runner {
    Runner::new(engine, Arc::new(cache), Arc::new(GeopConfig::default()))
}

pub fn multi_runner(
    engine: Arc<CountingEngine>,
    cache: MemoryCache,
    config: GeopConfig,
) -> MultiRunner {
    MultiRunner::new(engine, Arc::new(cache), Arc::new(config))
}
