//! Single-Area Runner: one operation over one shape.

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use geop_common::{AreaId, GeopResult};
use storage::CacheStore;

use crate::cache_key::CacheKey;
use crate::catalog::Operation;
use crate::config::GeopConfig;
use crate::engine::{GeoprocessingEngine, RawResult, RunRequest};
use crate::parse::{self, ParsedResult};

/// Explicit cache key for a parameterized request.
///
/// Used in place of the operation name; the result is cached with the
/// short TTL since it depends on request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOverride {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// A request for one operation over one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleRequest {
    /// Catalog operation name.
    pub operation: String,
    /// Engine input fields supplied by the caller (`polygon`, `vector`, ...).
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Well-known id of the shape, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<AreaId>,
    #[serde(default)]
    pub layer_overrides: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_override: Option<CacheOverride>,
}

impl SingleRequest {
    pub fn new(operation: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            operation: operation.into(),
            payload,
            area_id: None,
            layer_overrides: BTreeMap::new(),
            cache_override: None,
        }
    }

    /// Request for `operation` over a GeoJSON geometry.
    pub fn for_geometry(operation: impl Into<String>, geometry: &Value) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "polygon".to_string(),
            Value::Array(vec![Value::String(geometry.to_string())]),
        );
        Self::new(operation, payload)
    }

    pub fn with_area(mut self, id: AreaId) -> Self {
        self.area_id = Some(id);
        self
    }

    pub fn with_overrides(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.layer_overrides = overrides;
        self
    }

    pub fn with_cache_override(mut self, key: impl Into<String>, suffix: Option<String>) -> Self {
        self.cache_override = Some(CacheOverride {
            key: key.into(),
            suffix,
        });
        self
    }
}

/// Read/write access to cached raw results.
///
/// Cache failures never fail a run: a failed read is a miss and a failed
/// write is logged.
#[derive(Clone)]
pub(crate) struct ResultCache {
    store: Arc<dyn CacheStore>,
}

impl ResultCache {
    pub(crate) fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub(crate) async fn lookup(&self, key: &CacheKey) -> Option<RawResult> {
        match self.store.get(key.as_str()).await {
            Ok(Some(value)) => match serde_json::from_value::<RawResult>(value) {
                Ok(result) => {
                    counter!("geop_cache_hits_total").increment(1);
                    Some(result)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Ignoring undecodable cache entry");
                    counter!("geop_cache_misses_total").increment(1);
                    None
                }
            },
            Ok(None) => {
                counter!("geop_cache_misses_total").increment(1);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                counter!("geop_cache_misses_total").increment(1);
                None
            }
        }
    }

    pub(crate) async fn store(&self, key: &CacheKey, result: &RawResult, ttl: Option<Duration>) {
        let value = match serde_json::to_value(result) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode result for cache");
                return;
            }
        };

        if let Err(e) = self.store.set(key.as_str(), &value, ttl).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }
}

/// Runs single operations with result caching.
#[derive(Clone)]
pub struct Runner {
    engine: Arc<dyn GeoprocessingEngine>,
    cache: ResultCache,
    config: Arc<GeopConfig>,
}

impl Runner {
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

    /// Run one operation, reading and writing the cache for well-known areas.
    #[instrument(skip(self, request), fields(operation = %request.operation))]
    pub async fn run(&self, request: &SingleRequest) -> GeopResult<RawResult> {
        let operation = Operation::from_name(&request.operation)?;
        let layers = self.config.layers.resolve(&request.layer_overrides)?;
        let spec = operation.spec();

        let (key_name, ttl) = match &request.cache_override {
            Some(o) => (o.key.as_str(), Some(self.config.short_ttl())),
            None => (spec.name, None),
        };
        let suffix = request
            .cache_override
            .as_ref()
            .and_then(|o| o.suffix.as_deref());

        let key = match (&request.area_id, self.config.cache_enabled) {
            (Some(id), true) => CacheKey::with_suffix(id, key_name, &layers, suffix),
            _ => None,
        };

        if let Some(key) = &key {
            if let Some(cached) = self.cache.lookup(key).await {
                debug!(key = %key, "Cache hit");
                return Ok(cached);
            }
        }

        let engine_request = RunRequest::for_operation(&spec, &layers, &request.payload)?;
        let result = self.engine.run(&engine_request).await?;

        info!(operation = spec.name, groups = result.len(), "Operation computed");

        if let Some(key) = &key {
            self.cache.store(key, &result, ttl).await;
        }

        Ok(result)
    }

    /// Run one operation and decode its composite keys.
    pub async fn run_parsed(&self, request: &SingleRequest) -> GeopResult<ParsedResult> {
        let raw = self.run(request).await?;
        parse::parse(&raw)
    }
}
