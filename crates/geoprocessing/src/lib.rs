//! Geoprocessing orchestration.
//!
//! Submits raster/vector operations to the external geoprocessing engine,
//! caches results per (area, operation, layer configuration), and fans a
//! fixed set of operations out over many sub-basins in bounded chunks.
//!
//! # Architecture
//!
//! ```text
//! Request
//!    │
//!    ├─► Operation catalog + LayerConfig::resolve(overrides)
//!    │
//!    ├─► Runner (one shape)        ─┐
//!    ├─► MultiRunner (many shapes) ─┼─► CacheStore (read) ─► engine ─► CacheStore (write)
//!    └─► run_chunked (sub-basins)  ─┘
//!               │
//!               ▼
//!        parse::parse ─► model assembly
//! ```

pub mod analyze;
pub mod cache_key;
pub mod catalog;
pub mod chunker;
pub mod config;
pub mod engine;
pub mod layers;
pub mod multi;
pub mod parse;
pub mod runner;

pub use cache_key::CacheKey;
pub use catalog::{Operation, OperationKind, OperationSet, OperationSpec};
pub use chunker::{chunk_areas, run_chunked};
pub use config::{GeopConfig, RetryPolicy};
pub use engine::{
    GeoprocessingEngine, HttpEngine, MultiOperation, MultiRequest, MultiResponse, RawResult,
    RunRequest,
};
pub use layers::LayerConfig;
pub use multi::{MultiRunner, PartialResultSet};
pub use parse::{CompositeKey, ParsedResult};
pub use runner::{CacheOverride, Runner, SingleRequest};
