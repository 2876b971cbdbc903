//! Job records: the externally visible outcome of a pipeline run.
//!
//! A polling client reads the record by job id; it always ends in either
//! `complete` (with a result) or `failed` (with an error envelope).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use geop_common::{ErrorEnvelope, GeopError, GeopResult};

const JOB_PREFIX: &str = "mapshed:job:";
const COMPLETE_CHANNEL: &str = "mapshed:complete";
/// Finished job records are kept for a day.
const JOB_RETENTION_SECS: u64 = 86_400;

/// Job status as seen by polling clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Started,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn started(id: Uuid) -> Self {
        Self {
            id,
            status: JobStatus::Started,
            result: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn finish(mut self, status: JobStatus) -> Self {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self
    }
}

/// Sink for job status transitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create the record in the `started` state.
    async fn start(&self, id: Uuid) -> GeopResult<()>;

    /// Mark the job complete with its result.
    async fn complete(&self, id: Uuid, result: Value) -> GeopResult<()>;

    /// Mark the job failed with the triggering error.
    async fn fail(&self, id: Uuid, error: ErrorEnvelope) -> GeopResult<()>;

    /// Look up a job record.
    async fn get(&self, id: Uuid) -> GeopResult<Option<JobRecord>>;
}

/// Redis job store. Records are JSON under `mapshed:job:{id}`.
#[derive(Clone)]
pub struct RedisJobStore {
    conn: MultiplexedConnection,
}

impl RedisJobStore {
    pub async fn connect(redis_url: &str) -> GeopResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| GeopError::JobStore(format!("Redis connection failed: {}", e)))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| GeopError::JobStore(format!("Redis connection failed: {}", e)))?;

        Ok(Self { conn })
    }

    async fn write(&self, record: &JobRecord) -> GeopResult<()> {
        let mut conn = self.conn.clone();
        let key = format!("{}{}", JOB_PREFIX, record.id);
        let payload = serde_json::to_string(record)
            .map_err(|e| GeopError::JobStore(format!("Serialization failed: {}", e)))?;

        let _: () = conn
            .set_ex(&key, payload, JOB_RETENTION_SECS)
            .await
            .map_err(|e| GeopError::JobStore(format!("Store job failed: {}", e)))?;

        if record.status.is_terminal() {
            let _: () = conn
                .publish(COMPLETE_CHANNEL, record.id.to_string())
                .await
                .map_err(|e| GeopError::JobStore(format!("Publish failed: {}", e)))?;
        }

        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        update: impl FnOnce(&mut JobRecord),
    ) -> GeopResult<()> {
        let mut record = self
            .get(id)
            .await?
            .unwrap_or_else(|| JobRecord::started(id))
            .finish(status);
        update(&mut record);
        self.write(&record).await
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn start(&self, id: Uuid) -> GeopResult<()> {
        self.write(&JobRecord::started(id)).await
    }

    async fn complete(&self, id: Uuid, result: Value) -> GeopResult<()> {
        self.finish(id, JobStatus::Complete, |r| r.result = Some(result))
            .await
    }

    async fn fail(&self, id: Uuid, error: ErrorEnvelope) -> GeopResult<()> {
        self.finish(id, JobStatus::Failed, |r| r.error = Some(error))
            .await
    }

    async fn get(&self, id: Uuid) -> GeopResult<Option<JobRecord>> {
        let mut conn = self.conn.clone();
        let key = format!("{}{}", JOB_PREFIX, id);
        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| GeopError::JobStore(format!("Get job failed: {}", e)))?;

        raw.map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| GeopError::JobStore(format!("Deserialize failed: {}", e)))
        })
        .transpose()
    }
}

/// In-memory job store that also keeps every transition, for tests and
/// single-process runs.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    records: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
    history: Arc<RwLock<HashMap<Uuid, Vec<JobStatus>>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status a job has been put in, in order.
    pub async fn transitions(&self, id: Uuid) -> Vec<JobStatus> {
        self.history
            .read()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    async fn put(&self, record: JobRecord) {
        self.history
            .write()
            .await
            .entry(record.id)
            .or_default()
            .push(record.status);
        self.records.write().await.insert(record.id, record);
    }

    async fn existing(&self, id: Uuid) -> JobRecord {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_else(|| JobRecord::started(id))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn start(&self, id: Uuid) -> GeopResult<()> {
        self.put(JobRecord::started(id)).await;
        Ok(())
    }

    async fn complete(&self, id: Uuid, result: Value) -> GeopResult<()> {
        let mut record = self.existing(id).await.finish(JobStatus::Complete);
        record.result = Some(result);
        self.put(record).await;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: ErrorEnvelope) -> GeopResult<()> {
        let mut record = self.existing(id).await.finish(JobStatus::Failed);
        record.error = Some(error);
        self.put(record).await;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> GeopResult<Option<JobRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }
}
