//! Redis-backed cache for geoprocessing results.

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde_json::Value;
use std::time::Duration;

use geop_common::{GeopError, GeopResult};

/// Key/value store for previously computed operation results.
///
/// Writes are idempotent: the same key always carries the same value, so
/// concurrent writers need no coordination.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a cached value.
    async fn get(&self, key: &str) -> GeopResult<Option<Value>>;

    /// Store a value. `None` means no expiry.
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> GeopResult<()>;

    /// Remove a key.
    async fn delete(&self, key: &str) -> GeopResult<()>;
}

/// Redis cache client.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// Connect to Redis.
    pub async fn connect(redis_url: &str) -> GeopResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| GeopError::Cache(format!("Redis connection failed: {}", e)))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| GeopError::Cache(format!("Redis connection failed: {}", e)))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> GeopResult<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| GeopError::Cache(format!("Cache get failed: {}", e)))?;

        raw.map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| GeopError::Cache(format!("Corrupt cache entry {}: {}", key, e)))
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> GeopResult<()> {
        let mut conn = self.conn.clone();
        let payload = value.to_string();

        let _: () = match ttl {
            Some(ttl) => conn.set_ex(key, payload, ttl.as_secs().max(1)).await,
            None => conn.set(key, payload).await,
        }
        .map_err(|e| GeopError::Cache(format!("Cache set failed: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> GeopResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| GeopError::Cache(format!("Cache delete failed: {}", e)))?;

        Ok(())
    }
}
