//! Redis Streams-based job queue for pipeline requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::MultiplexedConnection, streams::*, AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tracing::warn;
use uuid::Uuid;

use geop_common::{GeopError, GeopResult};

const STREAM_KEY: &str = "mapshed:jobs";
const CONSUMER_GROUP: &str = "mapshed-workers";

/// Pending entries idle this long belong to a dead consumer and are
/// claimed again. Longer than any chain is expected to run.
const RECLAIM_IDLE_MS: usize = 30 * 60 * 1000;

/// A queued request with its job id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob<T> {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub payload: T,
    /// Stream entry the job was read from; set on claim, acked once the
    /// job has a terminal record.
    #[serde(skip)]
    pub entry_id: Option<String>,
}

impl<T> QueuedJob<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            payload,
            entry_id: None,
        }
    }
}

impl<T: Serialize> QueuedJob<T> {
    /// The stream entry's `data` field.
    pub fn encode(&self) -> GeopResult<String> {
        serde_json::to_string(self)
            .map_err(|e| GeopError::Internal(format!("Serialization failed: {}", e)))
    }
}

impl<T: DeserializeOwned> QueuedJob<T> {
    pub fn decode(data: &[u8], entry_id: impl Into<String>) -> GeopResult<Self> {
        let mut job: QueuedJob<T> = serde_json::from_slice(data)
            .map_err(|e| GeopError::Internal(format!("Deserialize failed: {}", e)))?;
        job.entry_id = Some(entry_id.into());
        Ok(job)
    }
}

/// Where workers take jobs from.
///
/// A claimed job stays pending until it is acked, so a job whose worker
/// dies mid-run is handed out again.
#[async_trait]
pub trait JobFeed<T>: Send + Sync {
    /// Next job for `consumer`, or `None` when nothing arrived in time.
    async fn claim_next(&self, consumer: &str) -> GeopResult<Option<QueuedJob<T>>>;

    /// Mark the claimed stream entry as done.
    async fn ack(&self, entry_id: &str) -> GeopResult<()>;
}

/// Redis Streams job queue, typed by its payload.
pub struct JobQueue<T> {
    conn: MultiplexedConnection,
    _payload: PhantomData<fn() -> T>,
}

impl<T> JobQueue<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Connect to Redis and initialize the stream.
    pub async fn connect(redis_url: &str) -> GeopResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| GeopError::JobStore(format!("Redis connection failed: {}", e)))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| GeopError::JobStore(format!("Redis connection failed: {}", e)))?;

        // Create consumer group if it doesn't exist
        let _: Result<(), _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(STREAM_KEY)
            .arg(CONSUMER_GROUP)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        Ok(Self {
            conn,
            _payload: PhantomData,
        })
    }

    /// Enqueue a job and return its stream entry id.
    pub async fn enqueue(&self, job: &QueuedJob<T>) -> GeopResult<String> {
        let mut conn = self.conn.clone();
        let entry_id: String = redis::cmd("XADD")
            .arg(STREAM_KEY)
            .arg("*")
            .arg("job_id")
            .arg(job.id.to_string())
            .arg("data")
            .arg(job.encode()?)
            .query_async(&mut conn)
            .await
            .map_err(|e| GeopError::JobStore(format!("Enqueue failed: {}", e)))?;

        Ok(entry_id)
    }

    /// Take over one entry left pending by a consumer that went quiet.
    async fn reclaim_stale(&self, consumer: &str) -> GeopResult<Option<QueuedJob<T>>> {
        let mut conn = self.conn.clone();
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                STREAM_KEY,
                CONSUMER_GROUP,
                consumer,
                RECLAIM_IDLE_MS,
                "0-0",
                StreamAutoClaimOptions::default().count(1),
            )
            .await
            .map_err(|e| GeopError::JobStore(format!("Reclaim failed: {}", e)))?;

        match reply.claimed.first() {
            Some(entry) => {
                warn!(entry = %entry.id, consumer, "Reclaimed stale job");
                decode_entry(entry)
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<T> JobFeed<T> for JobQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn claim_next(&self, consumer: &str) -> GeopResult<Option<QueuedJob<T>>> {
        if let Some(job) = self.reclaim_stale(consumer).await? {
            return Ok(Some(job));
        }

        let opts = StreamReadOptions::default()
            .group(CONSUMER_GROUP, consumer)
            .count(1)
            .block(5000); // 5 second block

        let mut conn = self.conn.clone();
        let result: StreamReadReply = conn
            .xread_options(&[STREAM_KEY], &[">"], &opts)
            .await
            .map_err(|e| GeopError::JobStore(format!("Read failed: {}", e)))?;

        for stream_key in result.keys {
            for entry in stream_key.ids {
                if let Some(job) = decode_entry(&entry)? {
                    return Ok(Some(job));
                }
            }
        }

        Ok(None)
    }

    async fn ack(&self, entry_id: &str) -> GeopResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .xack(STREAM_KEY, CONSUMER_GROUP, &[entry_id])
            .await
            .map_err(|e| GeopError::JobStore(format!("Ack failed: {}", e)))?;
        Ok(())
    }
}

fn decode_entry<T: DeserializeOwned>(entry: &StreamId) -> GeopResult<Option<QueuedJob<T>>> {
    let Some(data) = entry.map.get("data") else {
        return Ok(None);
    };
    let bytes: Vec<u8> = redis::from_redis_value(data)
        .map_err(|e| GeopError::Internal(format!("Parse failed: {}", e)))?;
    QueuedJob::decode(&bytes, entry.id.clone()).map(Some)
}
