//! Common test helpers for job chain tests.
//!
//! Provides an in-process engine answering the MapShed operation set from
//! fixtures, and a chain context over in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use geop_common::{AreaDescriptor, AreaId, GeopError, GeopResult};
use geoprocessing::{
    GeoprocessingEngine, GeopConfig, MultiRequest, MultiResponse, MultiRunner, RawResult,
    RunRequest,
};
use mapshed::StaticAncillary;
use mapshed_worker::{ChainContext, MapshedJob, Simulation};
use storage::{JobFeed, JobStatus, JobStore, MemoryCache, MemoryJobStore, QueuedJob};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Engine fake answering `/multi` with per-shape fixtures.
#[derive(Default)]
pub struct FixtureEngine {
    multi_calls: AtomicUsize,
    shapes: Mutex<Vec<Vec<String>>>,
    /// Per-shape results; shapes not listed get the standard fixture.
    overrides: HashMap<String, Value>,
    failing_shapes: Vec<String>,
}

impl FixtureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(shapes: &[&str]) -> Self {
        Self {
            failing_shapes: shapes.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_override(mut self, shape: &str, per_area: Value) -> Self {
        self.overrides.insert(shape.to_string(), per_area);
        self
    }

    pub fn multi_calls(&self) -> usize {
        self.multi_calls.load(Ordering::SeqCst)
    }

    pub fn shapes(&self) -> Vec<Vec<String>> {
        self.shapes.lock().unwrap().clone()
    }
}

#[async_trait]
impl GeoprocessingEngine for FixtureEngine {
    async fn run(&self, _request: &RunRequest) -> GeopResult<RawResult> {
        Err(GeopError::Engine("run is not used by job chains".to_string()))
    }

    async fn multi(&self, request: &MultiRequest) -> GeopResult<MultiResponse> {
        self.multi_calls.fetch_add(1, Ordering::SeqCst);
        let ids: Vec<String> = request.shape_ids().map(str::to_string).collect();
        self.shapes.lock().unwrap().push(ids.clone());

        if ids.iter().any(|id| self.failing_shapes.contains(id)) {
            return Err(GeopError::ServiceUnreachable);
        }

        let mut response = MultiResponse::new();
        for id in ids {
            let value = self
                .overrides
                .get(&id)
                .cloned()
                .unwrap_or_else(test_utils::mapshed_area_results);
            let per_label: BTreeMap<String, RawResult> = serde_json::from_value(value)?;
            response.insert(id, per_label);
        }
        Ok(response)
    }
}

/// Echoes the model back with a marker.
pub struct EchoSimulation;

#[async_trait]
impl Simulation for EchoSimulation {
    async fn simulate(&self, model: &Value) -> GeopResult<Value> {
        Ok(json!({"simulated": true, "input_area": model["Area"].clone()}))
    }
}

pub struct Harness {
    pub engine: Arc<FixtureEngine>,
    pub jobs: MemoryJobStore,
    pub ctx: ChainContext,
    pub config: GeopConfig,
}

pub fn harness(engine: FixtureEngine, config: GeopConfig) -> Harness {
    let engine = Arc::new(engine);
    let jobs = MemoryJobStore::new();
    let ctx = ChainContext {
        multi: Arc::new(MultiRunner::new(
            engine.clone(),
            Arc::new(MemoryCache::default()),
            Arc::new(config.clone()),
        )),
        ancillary: Arc::new(StaticAncillary::default()),
        simulation: None,
        jobs: Arc::new(jobs.clone()),
        station_count: 2,
    };

    Harness {
        engine,
        jobs,
        ctx,
        config,
    }
}

pub fn area(id: &str) -> AreaDescriptor {
    AreaDescriptor::new(id.parse::<AreaId>().unwrap(), test_utils::pa_square())
}

/// `n` adjacent sub-basins, `huc12__0` to `huc12__{n-1}`.
pub fn sub_basins(n: usize) -> Vec<AreaDescriptor> {
    (0..n)
        .map(|i| {
            AreaDescriptor::new(
                AreaId::well_known("huc12", i.to_string()),
                test_utils::square(-75.2 + 0.01 * i as f64, 39.95, 0.01),
            )
            .with_member_id(format!("sub-{}", i))
        })
        .collect()
}

pub fn watershed() -> AreaDescriptor {
    AreaDescriptor::new(
        test_utils::areas::HUC10.parse::<AreaId>().unwrap(),
        test_utils::square(-75.2, 39.95, 0.05),
    )
}

/// Fixture results where every land cell is open water.
pub fn water_only_results() -> Value {
    let mut results = test_utils::mapshed_area_results();
    results["nlcd_soil"] = json!({"List(11,2)": 1000.0});
    results
}

/// In-process job feed. Entry ids are the job ids; each ack records the
/// job's status at the time it was acked. Cancels `drained` once empty.
pub struct MemoryFeed {
    pending: Mutex<VecDeque<QueuedJob<MapshedJob>>>,
    jobs: MemoryJobStore,
    acks: Mutex<Vec<(Uuid, Option<JobStatus>)>>,
    drained: CancellationToken,
}

impl MemoryFeed {
    pub fn new(
        jobs: MemoryJobStore,
        queued: Vec<QueuedJob<MapshedJob>>,
        drained: CancellationToken,
    ) -> Self {
        let pending = queued
            .into_iter()
            .map(|mut job| {
                job.entry_id = Some(job.id.to_string());
                job
            })
            .collect();
        Self {
            pending: Mutex::new(pending),
            jobs,
            acks: Mutex::new(Vec::new()),
            drained,
        }
    }

    pub fn acks(&self) -> Vec<(Uuid, Option<JobStatus>)> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobFeed<MapshedJob> for MemoryFeed {
    async fn claim_next(&self, _consumer: &str) -> GeopResult<Option<QueuedJob<MapshedJob>>> {
        let next = self.pending.lock().unwrap().pop_front();
        if next.is_none() {
            self.drained.cancel();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        Ok(next)
    }

    async fn ack(&self, entry_id: &str) -> GeopResult<()> {
        let id: Uuid = entry_id
            .parse()
            .map_err(|_| GeopError::Internal(format!("bad entry id {}", entry_id)))?;
        let status = self.jobs.get(id).await?.map(|record| record.status);
        self.acks.lock().unwrap().push((id, status));
        Ok(())
    }
}
