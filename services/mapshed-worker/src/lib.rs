//! MapShed worker.
//!
//! Claims MapShed jobs from the queue, runs each through its job chain
//! (geoprocessing, parsing, model assembly, optional simulation) and
//! records the outcome in the job store, where clients poll for it.

pub mod chain;
pub mod config;
pub mod request;
pub mod server;
pub mod worker;

pub use chain::{ChainBuilder, ChainContext, ChainOutcome, FailureSink, JobChain, Simulation, Stage};
pub use request::{JobOptions, MapshedJob};
pub use worker::{process_job, Worker};
