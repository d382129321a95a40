//! Redis-backed job queue.
//!
//! Jobs are JSON strings on a list per queue name. `reserve` moves the next
//! job into a per-queue processing list (`BLMOVE`), so a consumer crash
//! leaves the job parked there instead of losing it; `ack` removes it.
//! Failed jobs are appended to a `:failed` list for inspection. Recovery of
//! stale processing entries is an operational concern, not handled here.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::QueueError;
use crate::queue::{Job, JobId, JobQueue};

/// Seconds a `reserve` call blocks waiting for work before returning empty.
const RESERVE_BLOCK_SECS: usize = 5;

pub struct RedisQueue {
    client: redis::Client,
    prefix: String,
}

impl RedisQueue {
    pub fn new(url: &str, prefix: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(url).map_err(backend)?;
        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    fn pending_key(&self, queue: &str) -> String {
        format!("{}:{}", self.prefix, queue)
    }

    fn processing_key(&self, queue: &str) -> String {
        format!("{}:{}:processing", self.prefix, queue)
    }

    fn failed_key(&self, queue: &str) -> String {
        format!("{}:{}:failed", self.prefix, queue)
    }

    async fn connection(&self) -> Result<redis::aio::Connection, QueueError> {
        self.client.get_async_connection().await.map_err(backend)
    }
}

fn backend(err: redis::RedisError) -> QueueError {
    QueueError::Backend(err.to_string())
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, queue: &str, job: Job) -> Result<JobId, QueueError> {
        let id = job.id.clone();
        let encoded = serde_json::to_string(&job)?;
        let mut con = self.connection().await?;
        let _: i64 = con
            .rpush(self.pending_key(queue), encoded)
            .await
            .map_err(backend)?;
        Ok(id)
    }

    async fn reserve(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        let mut con = self.connection().await?;
        let moved: Option<String> = redis::cmd("BLMOVE")
            .arg(self.pending_key(queue))
            .arg(self.processing_key(queue))
            .arg("LEFT")
            .arg("RIGHT")
            .arg(RESERVE_BLOCK_SECS)
            .query_async(&mut con)
            .await
            .map_err(backend)?;

        match moved {
            Some(encoded) => {
                let job: Job = serde_json::from_str(&encoded)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, queue: &str, job: &Job) -> Result<(), QueueError> {
        let encoded = serde_json::to_string(job)?;
        let mut con = self.connection().await?;
        let _: i64 = con
            .lrem(self.processing_key(queue), 1, encoded)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn fail(&self, queue: &str, job: &Job, error: &str) -> Result<(), QueueError> {
        let encoded = serde_json::to_string(job)?;
        let record = serde_json::to_string(&serde_json::json!({
            "job": job,
            "error": error,
        }))?;

        let mut con = self.connection().await?;
        let _: i64 = con
            .lrem(self.processing_key(queue), 1, encoded)
            .await
            .map_err(backend)?;
        let _: i64 = con
            .rpush(self.failed_key(queue), record)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
