//! Storage abstractions for the geoprocessing pipeline.
//!
//! Provides unified interfaces for:
//! - Redis or in-process LRU for per-(area, operation) result caching
//! - Redis for job records and the job queue

pub mod cache;
pub mod jobs;
pub mod memory_cache;
pub mod queue;

pub use cache::{CacheStore, RedisCache};
pub use jobs::{JobRecord, JobStatus, JobStore, MemoryJobStore, RedisJobStore};
pub use memory_cache::{MemoryCache, MemoryCacheStats};
pub use queue::{JobFeed, JobQueue, QueuedJob};
