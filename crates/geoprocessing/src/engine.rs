//! Client for the external geoprocessing engine.
//!
//! Two endpoints:
//! - `POST /run` computes one operation over one polygon and answers
//!   `{"result": {"List(..)": n, ...}}`.
//! - `POST /multi` computes a set of labelled operations over many shapes
//!   and answers `{shapeId: {label: {"List(..)": n}}}`.

use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use geop_common::{AreaDescriptor, GeopError, GeopResult};

use crate::catalog::{OperationSet, OperationSpec};
use crate::config::{GeopConfig, RetryPolicy};
use crate::layers::LayerConfig;

/// One operation's raw result: composite-key string to number.
pub type RawResult = BTreeMap<String, f64>;

/// `/multi` response: shape id to label to raw result.
pub type MultiResponse = BTreeMap<String, BTreeMap<String, RawResult>>;

/// Body of a `/run` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub input: Map<String, Value>,
}

impl RunRequest {
    /// Build the engine input for `spec`, with layers resolved and the
    /// caller's payload (polygon, vector, ...) merged in.
    ///
    /// Fields derived from the operation take precedence over the payload.
    pub fn for_operation(
        spec: &OperationSpec,
        layers: &LayerConfig,
        payload: &Map<String, Value>,
    ) -> GeopResult<Self> {
        let mut input = payload.clone();

        input
            .entry("polygonCRS")
            .or_insert_with(|| Value::from("LatLng"));
        input
            .entry("rasterCRS")
            .or_insert_with(|| Value::from("ConusAlbers"));
        input.entry("zoom").or_insert_with(|| Value::from(0));

        input.insert(
            "rasters".to_string(),
            Value::from(layers.substitute(spec.raster_tokens)?),
        );
        if let Some(token) = spec.target_raster_token {
            input.insert(
                "targetRaster".to_string(),
                Value::from(layers.dataset(token)?),
            );
        }
        input.insert(
            "operationType".to_string(),
            Value::from(spec.kind.as_str()),
        );
        if spec.pixel_is_area {
            input.insert("pixelIsArea".to_string(), Value::Bool(true));
        }

        Ok(Self { input })
    }
}

/// A shape in a `/multi` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiShape {
    pub id: String,
    pub shape: Value,
}

/// A labelled operation in a `/multi` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiOperation {
    /// Engine operation type.
    pub name: String,
    pub label: String,
    pub rasters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_raster: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pixel_is_area: bool,
}

impl MultiOperation {
    pub fn new(label: &str, spec: &OperationSpec, layers: &LayerConfig) -> GeopResult<Self> {
        Ok(Self {
            name: spec.kind.as_str().to_string(),
            label: label.to_string(),
            rasters: layers.substitute(spec.raster_tokens)?,
            target_raster: spec
                .target_raster_token
                .map(|t| layers.dataset(t).map(str::to_string))
                .transpose()?,
            pixel_is_area: spec.pixel_is_area,
        })
    }
}

/// Body of a `/multi` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiRequest {
    pub shapes: Vec<MultiShape>,
    #[serde(default)]
    pub stream_lines: Value,
    pub operations: Vec<MultiOperation>,
}

impl MultiRequest {
    /// Request covering every operation of `set` for each of `areas`.
    pub fn build(
        set: OperationSet,
        areas: &[&AreaDescriptor],
        stream_lines: &Value,
        layers: &LayerConfig,
    ) -> GeopResult<Self> {
        let operations = set
            .members()
            .iter()
            .map(|(label, op)| MultiOperation::new(label, &op.spec(), layers))
            .collect::<GeopResult<Vec<_>>>()?;

        Ok(Self {
            shapes: areas
                .iter()
                .map(|area| MultiShape {
                    id: area.result_key(),
                    shape: area.geometry.clone(),
                })
                .collect(),
            stream_lines: stream_lines.clone(),
            operations,
        })
    }

    pub fn shape_ids(&self) -> impl Iterator<Item = &str> {
        self.shapes.iter().map(|s| s.id.as_str())
    }
}

/// The geoprocessing engine.
#[async_trait]
pub trait GeoprocessingEngine: Send + Sync {
    /// Compute one operation over one polygon.
    async fn run(&self, request: &RunRequest) -> GeopResult<RawResult>;

    /// Compute a set of operations over many shapes in one call.
    async fn multi(&self, request: &MultiRequest) -> GeopResult<MultiResponse>;
}

#[derive(Deserialize)]
struct RunResponse {
    result: Option<RawResult>,
}

/// HTTP engine client with bounded retry on transient failures.
#[derive(Clone)]
pub struct HttpEngine {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpEngine {
    pub fn new(config: &GeopConfig) -> GeopResult<Self> {
        Self::with_base_url(config.base_url(), config.timeout(), config.retry)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> GeopResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| GeopError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// POST `body` to `path`, retrying connection failures and timeouts.
    #[instrument(skip_all, fields(endpoint = path))]
    async fn post<B, R>(&self, path: &'static str, body: &B) -> GeopResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            counter!("geop_engine_requests_total", "endpoint" => path).increment(1);

            match self.client.post(&url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let text = response.text().await.unwrap_or_default();
                        return Err(GeopError::Engine(format!("{} {}", status.as_u16(), text)));
                    }

                    debug!(status = status.as_u16(), "Engine responded");
                    return response.json::<R>().await.map_err(|e| {
                        GeopError::MalformedResult(format!("Undecodable engine response: {}", e))
                    });
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    attempt += 1;
                    if attempt > self.retry.max_retries {
                        warn!(error = %e, attempts = attempt, "Engine unreachable, giving up");
                        return Err(GeopError::ServiceUnreachable);
                    }

                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        error = %e,
                        retry = attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Engine request failed, retrying"
                    );
                    counter!("geop_engine_retries_total", "endpoint" => path).increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(GeopError::Engine(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl GeoprocessingEngine for HttpEngine {
    async fn run(&self, request: &RunRequest) -> GeopResult<RawResult> {
        let response: RunResponse = self.post("/run", request).await?;
        response
            .result
            .ok_or_else(|| GeopError::Engine("engine response has no result".to_string()))
    }

    async fn multi(&self, request: &MultiRequest) -> GeopResult<MultiResponse> {
        self.post("/multi", request).await
    }
}
