// ===============================
// src/store_redis.rs (redis-backed StateStore)
// ===============================
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, RedisResult};
use std::future::Future;
use tokio::time::Duration;
use tracing::info;

use crate::error::LedgerError;
use crate::store::{SnapshotWrite, StateStore};

/// Redis adapter. The multiplexed connection is cheap to clone, so every call
/// works on its own handle and calls from different tasks never block each other.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    timeout: Duration,
}

async fn bounded<T, F>(after: Duration, op: &'static str, fut: F) -> Result<T, LedgerError>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res.map_err(LedgerError::from),
        Err(_) => Err(LedgerError::Timeout { op, after }),
    }
}

impl RedisStore {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = redis::Client::open(url)?;
        let conn = bounded(timeout, "redis connect", client.get_multiplexed_async_connection()).await?;
        info!(%url, "redis store connected");
        Ok(Self { conn, timeout })
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        let mut conn = self.conn.clone();
        let v: Option<String> = bounded(self.timeout, "GET", conn.get(key)).await?;
        Ok(v)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        let mut conn = self.conn.clone();
        let _: () = bounded(self.timeout, "SET", conn.set(key, value)).await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, end: isize) -> Result<Vec<String>, LedgerError> {
        let mut conn = self.conn.clone();
        let v: Vec<String> = bounded(self.timeout, "LRANGE", conn.lrange(key, start, end)).await?;
        Ok(v)
    }

    async fn list_push_many(&self, key: &str, values: &[String]) -> Result<(), LedgerError> {
        // RPUSH tanpa value ditolak redis
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = bounded(self.timeout, "RPUSH", conn.rpush(key, values.to_vec())).await?;
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: isize, end: isize) -> Result<(), LedgerError> {
        let mut conn = self.conn.clone();
        let _: () = bounded(self.timeout, "LTRIM", conn.ltrim(key, start, end)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LedgerError> {
        let mut conn = self.conn.clone();
        let _: () = bounded(self.timeout, "DEL", conn.del(key)).await?;
        Ok(())
    }

    // MULTI/EXEC: position + id list land together or not at all.
    async fn write_snapshot(&self, w: &SnapshotWrite<'_>) -> Result<(), LedgerError> {
        let mut pipe = redis::pipe();
        pipe.atomic().set(w.position_key, &w.position).ignore();
        if w.replace_ids {
            pipe.del(w.ids_key).ignore();
        }
        if !w.new_ids.is_empty() {
            pipe.rpush(w.ids_key, w.new_ids.to_vec())
                .ignore()
                .ltrim(w.ids_key, -(w.keep as isize), -1)
                .ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = bounded(self.timeout, "MULTI snapshot", pipe.query_async(&mut conn)).await?;
        Ok(())
    }
}
