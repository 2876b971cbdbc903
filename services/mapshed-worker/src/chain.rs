//! Job chains.
//!
//! A chain is the ordered list of stages one request runs through:
//!
//! ```text
//! Geoprocess ─► Parse ─► Assemble ─► [Simulate] ─► Persist
//!   │
//!   └─ watershed: chunk 1 ┐
//!                 chunk 2 ├─► join
//!                 chunk n ┘
//! ```
//!
//! Each stage takes the previous stage's output, or its error. An error
//! is passed through untouched to the end of the chain, where one
//! [`FailureSink`] records it against the job.

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use geop_common::{ensure_distinct_keys, AreaDescriptor, GeopError, GeopResult};
use geoprocessing::{run_chunked, GeopConfig, MultiRunner, OperationSet, PartialResultSet};
use mapshed::{
    assemble_area, assemble_watershed, gather_ancillary, parse_results, AncillarySource,
    AreaInput, ParsedLayers,
};
use storage::JobStore;

use crate::request::MapshedJob;

/// Runs the hydrology simulation on an assembled model.
#[async_trait]
pub trait Simulation: Send + Sync {
    async fn simulate(&self, model: &Value) -> GeopResult<Value>;
}

/// One step of a job chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Request checks made while the chain is built. Never part of a
    /// stage list; only reported for rejected requests.
    Validate,
    /// Run the MapShed operation set. `chunks` is the number of concurrent
    /// engine batches joined before the next stage.
    Geoprocess { chunks: usize },
    Parse,
    Assemble,
    Simulate,
    Persist,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Geoprocess { .. } => "geoprocess",
            Stage::Parse => "parse",
            Stage::Assemble => "assemble",
            Stage::Simulate => "simulate",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything stages need besides the request.
#[derive(Clone)]
pub struct ChainContext {
    pub multi: Arc<MultiRunner>,
    pub ancillary: Arc<dyn AncillarySource>,
    pub simulation: Option<Arc<dyn Simulation>>,
    pub jobs: Arc<dyn JobStore>,
    /// Weather stations averaged per area.
    pub station_count: usize,
}

/// Builds job chains for requests.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    chunk_size: usize,
}

impl ChainBuilder {
    pub fn new(config: &GeopConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Wire `request` to its stages. Requests that could never run are
    /// rejected with a config error.
    pub fn build(&self, job_id: Uuid, request: MapshedJob) -> GeopResult<JobChain> {
        let chunks = match &request {
            MapshedJob::Area { .. } => 1,
            MapshedJob::Watershed { sub_basins, .. } => {
                if sub_basins.is_empty() {
                    return Err(GeopError::Config("watershed has no sub-basins".to_string()));
                }
                ensure_distinct_keys(sub_basins)?;
                sub_basins.len().div_ceil(self.chunk_size)
            }
        };

        let mut stages = vec![Stage::Geoprocess { chunks }, Stage::Parse, Stage::Assemble];
        if request.options().simulate {
            stages.push(Stage::Simulate);
        }
        stages.push(Stage::Persist);

        Ok(JobChain {
            job_id,
            request,
            stages,
        })
    }
}

/// Output passed between stages.
#[derive(Debug)]
enum StageData {
    Submitted,
    Joined(PartialResultSet),
    Parsed(ParsedLayers),
    Model(Value),
}

impl StageData {
    fn kind(&self) -> &'static str {
        match self {
            StageData::Submitted => "submitted",
            StageData::Joined(_) => "joined results",
            StageData::Parsed(_) => "parsed layers",
            StageData::Model(_) => "model",
        }
    }
}

/// How a chain ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    Complete(Value),
    /// The stage that raised the error, and the error.
    Failed { stage: Stage, error: GeopError },
}

impl ChainOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, ChainOutcome::Complete(_))
    }
}

/// Marks a job failed, at most once.
pub struct FailureSink {
    jobs: Arc<dyn JobStore>,
    job_id: Uuid,
    reported: AtomicBool,
}

impl FailureSink {
    pub fn new(jobs: Arc<dyn JobStore>, job_id: Uuid) -> Self {
        Self {
            jobs,
            job_id,
            reported: AtomicBool::new(false),
        }
    }

    /// Record `error` raised by `stage`. Later calls are ignored.
    pub async fn fail(&self, stage: Stage, error: &GeopError) {
        if self.reported.swap(true, Ordering::SeqCst) {
            debug!(job_id = %self.job_id, %stage, "Job already marked failed");
            return;
        }

        error!(
            job_id = %self.job_id,
            %stage,
            kind = error.kind(),
            error = %error,
            "Job failed"
        );
        counter!("mapshed_jobs_total", "status" => "failed").increment(1);

        if let Err(e) = self.jobs.fail(self.job_id, error.to_envelope()).await {
            error!(job_id = %self.job_id, error = %e, "Failed to record job failure");
        }
    }
}

/// A request wired to its stages.
#[derive(Debug, Clone)]
pub struct JobChain {
    job_id: Uuid,
    request: MapshedJob,
    stages: Vec<Stage>,
}

impl JobChain {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run every stage in order and record the outcome against the job.
    #[instrument(skip_all, fields(job_id = %self.job_id, kind = self.request.kind()))]
    pub async fn run(&self, ctx: &ChainContext) -> ChainOutcome {
        let start = Instant::now();
        let sink = FailureSink::new(ctx.jobs.clone(), self.job_id);
        let mut carried: Result<StageData, (Stage, GeopError)> = Ok(StageData::Submitted);

        for stage in &self.stages {
            carried = match carried {
                Ok(data) => {
                    debug!(%stage, input = data.kind(), "Running stage");
                    self.apply(*stage, data, ctx)
                        .await
                        .map_err(|e| (*stage, e))
                }
                Err(upstream) => {
                    debug!(%stage, "Passing upstream error through");
                    Err(upstream)
                }
            };
        }

        let outcome = match carried {
            Ok(StageData::Model(result)) => ChainOutcome::Complete(result),
            Ok(other) => ChainOutcome::Failed {
                stage: Stage::Persist,
                error: GeopError::Internal(format!("chain ended with {}", other.kind())),
            },
            Err((stage, error)) => ChainOutcome::Failed { stage, error },
        };

        if let ChainOutcome::Failed { stage, error } = &outcome {
            sink.fail(*stage, error).await;
        }

        info!(
            complete = outcome.is_complete(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Job chain finished"
        );

        outcome
    }

    async fn apply(
        &self,
        stage: Stage,
        data: StageData,
        ctx: &ChainContext,
    ) -> GeopResult<StageData> {
        match (stage, data) {
            (Stage::Geoprocess { chunks }, StageData::Submitted) => {
                self.geoprocess(chunks, ctx).await.map(StageData::Joined)
            }
            (Stage::Parse, StageData::Joined(results)) => parse_results(&results)
                .map(StageData::Parsed)
                .map_err(GeopError::from),
            (Stage::Assemble, StageData::Parsed(parsed)) => {
                self.assemble(&parsed, ctx).await.map(StageData::Model)
            }
            (Stage::Simulate, StageData::Model(model)) => {
                let simulation = ctx.simulation.as_ref().ok_or_else(|| {
                    GeopError::Config("simulation requested but none is configured".to_string())
                })?;
                simulation.simulate(&model).await.map(StageData::Model)
            }
            (Stage::Persist, StageData::Model(result)) => {
                self.persist(&result, ctx).await?;
                Ok(StageData::Model(result))
            }
            (stage, data) => Err(GeopError::Internal(format!(
                "stage {} cannot take {}",
                stage,
                data.kind()
            ))),
        }
    }

    async fn geoprocess(&self, chunks: usize, ctx: &ChainContext) -> GeopResult<PartialResultSet> {
        let options = self.request.options();
        let layers = ctx.multi.resolve_layers(&options.layer_overrides)?;
        let stream_lines = Value::Array(options.stream_lines.clone());
        let areas = self.request.geoprocessed_areas();

        if chunks <= 1 {
            return ctx
                .multi
                .run(OperationSet::MapshedCore, areas, &stream_lines, &layers)
                .await;
        }

        run_chunked(
            ctx.multi.clone(),
            OperationSet::MapshedCore,
            areas,
            &stream_lines,
            &layers,
            CancellationToken::new(),
        )
        .await
    }

    async fn assemble(&self, parsed: &ParsedLayers, ctx: &ChainContext) -> GeopResult<Value> {
        let result = match &self.request {
            MapshedJob::Area { area, .. } => {
                let input = area_input(area, ctx).await?;
                let model = assemble_area(&input, parsed).map_err(no_land_cover)?;
                serde_json::to_value(model)
            }
            MapshedJob::Watershed {
                watershed,
                sub_basins,
                ..
            } => {
                let whole = area_input(watershed, ctx).await?;
                let parts =
                    futures::future::try_join_all(sub_basins.iter().map(|a| area_input(a, ctx)))
                        .await?;
                let models = assemble_watershed(&whole, &parts, parsed).map_err(no_land_cover)?;
                serde_json::to_value(models)
            }
        };

        result.map_err(|e| GeopError::Internal(format!("model serialization failed: {}", e)))
    }

    async fn persist(&self, result: &Value, ctx: &ChainContext) -> GeopResult<()> {
        ctx.jobs.complete(self.job_id, result.clone()).await?;
        counter!("mapshed_jobs_total", "status" => "complete").increment(1);
        Ok(())
    }
}

async fn area_input(area: &AreaDescriptor, ctx: &ChainContext) -> GeopResult<AreaInput> {
    let ancillary = gather_ancillary(ctx.ancillary.as_ref(), area, ctx.station_count).await?;
    Ok(AreaInput {
        area: area.clone(),
        ancillary,
    })
}

/// Convert an assembly error, logging the no-land-cover case where it is
/// raised.
fn no_land_cover(err: mapshed::AssemblyError) -> GeopError {
    if err == mapshed::AssemblyError::NoLandCover {
        error!("Area has no land cover; stopping the chain");
    }
    err.into()
}
