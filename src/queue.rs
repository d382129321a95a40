//! Named, at-least-once job queues and the consumer worker pool.
//!
//! Two queues exist in this system: [`MAIL_QUEUE`] carries `send` jobs and
//! [`WEBHOOK_QUEUE`] carries `deliver` jobs. Producers push jobs; consumer
//! pools pull them and acknowledge on success. A job may be delivered more
//! than once (e.g. after a consumer crash before acknowledgment), so every
//! handler must tolerate duplicates.
//!
//! A failed handler never crashes the consumer: the job is reported through
//! [`JobQueue::fail`] and, absent further retry configuration, is not
//! redelivered. `fail` is the seam where backoff and dead-lettering attach
//! in a later iteration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{JobError, QueueError};

/// Queue carrying `send` jobs for the mail dispatcher.
pub const MAIL_QUEUE: &str = "mail";

/// Queue carrying `deliver` jobs for the webhook dispatcher.
pub const WEBHOOK_QUEUE: &str = "webhooks";

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Handle assigned to an enqueued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// A unit of asynchronous work: a name plus an opaque JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub payload: serde_json::Value,
}

impl Job {
    pub fn new<T: Serialize>(name: &str, payload: &T) -> Result<Self, QueueError> {
        Ok(Self {
            id: JobId::generate(),
            name: name.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Decode the payload into a concrete job type.
    pub fn data<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Durable, named, at-least-once work queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push a job onto the named queue.
    async fn enqueue(&self, queue: &str, job: Job) -> Result<JobId, QueueError>;

    /// Pull the next job, waiting for work. `Ok(None)` means no job arrived
    /// within the backend's wait window; callers should loop.
    async fn reserve(&self, queue: &str) -> Result<Option<Job>, QueueError>;

    /// Acknowledge a job after its handler succeeded.
    async fn ack(&self, queue: &str, job: &Job) -> Result<(), QueueError>;

    /// Report a job whose handler failed. The job is not redelivered.
    async fn fail(&self, queue: &str, job: &Job, error: &str) -> Result<(), QueueError>;
}

/// Processes jobs pulled from one queue.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: Job) -> Result<(), JobError>;
}

/// Worker pool consuming one named queue.
pub struct Consumer;

impl Consumer {
    /// Spawn `workers` tasks pulling from `queue_name` until cancelled.
    pub fn spawn(
        queue: Arc<dyn JobQueue>,
        queue_name: &'static str,
        handler: Arc<dyn JobHandler>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..workers.max(1))
            .map(|_| {
                tokio::spawn(consumer_loop(
                    queue.clone(),
                    queue_name,
                    handler.clone(),
                    cancel.clone(),
                ))
            })
            .collect()
    }
}

async fn consumer_loop(
    queue: Arc<dyn JobQueue>,
    queue_name: &'static str,
    handler: Arc<dyn JobHandler>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            reserved = queue.reserve(queue_name) => match reserved {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(queue = queue_name, error = %err, "failed to reserve job");
                    // Pause so a broken broker does not spin the loop.
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            },
        };

        // Run the handler in its own task so a panic is contained to the job.
        let handler_job = job.clone();
        let handler = handler.clone();
        let result = match tokio::spawn(async move { handler.handle(handler_job).await }).await {
            Ok(result) => result,
            Err(_) => Err(JobError::Panicked),
        };

        match result {
            Ok(()) => {
                if let Err(err) = queue.ack(queue_name, &job).await {
                    tracing::warn!(queue = queue_name, job = %job.id.0, error = %err, "failed to ack job");
                }
            }
            Err(err) => {
                metric_inc("maildog.queue.failed");
                tracing::error!(queue = queue_name, job = %job.id.0, error = %err, "job failed");
                if let Err(err) = queue.fail(queue_name, &job, &err.to_string()).await {
                    tracing::warn!(queue = queue_name, job = %job.id.0, error = %err, "failed to report job failure");
                }
            }
        }
    }
}

/// A job reported through [`JobQueue::fail`].
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub queue: String,
    pub job: Job,
    pub error: String,
}

type Channel = (
    mpsc::UnboundedSender<Job>,
    Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
);

/// In-memory queue for tests and single-process usage.
///
/// Delivery is effectively at-most-once here (a popped job lost to a crash
/// is gone); the broker-backed implementation carries the at-least-once
/// guarantee in production.
#[derive(Default)]
pub struct InMemoryQueue {
    channels: Mutex<HashMap<String, Channel>>,
    failed: Mutex<Vec<FailedJob>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel(&self, queue: &str) -> Channel {
        let mut channels = self.channels.lock().await;
        let (tx, rx) = channels.entry(queue.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            (tx, Arc::new(Mutex::new(rx)))
        });
        (tx.clone(), rx.clone())
    }

    /// Snapshot of every job reported failed, for assertions.
    pub async fn failed_jobs(&self) -> Vec<FailedJob> {
        self.failed.lock().await.clone()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, queue: &str, job: Job) -> Result<JobId, QueueError> {
        let id = job.id.clone();
        let (tx, _) = self.channel(queue).await;
        tx.send(job).map_err(|_| QueueError::Shutdown)?;
        Ok(id)
    }

    async fn reserve(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        let (_, rx) = self.channel(queue).await;
        let mut rx = rx.lock().await;
        Ok(rx.recv().await)
    }

    async fn ack(&self, _queue: &str, _job: &Job) -> Result<(), QueueError> {
        // Popping already removed the job.
        Ok(())
    }

    async fn fail(&self, queue: &str, job: &Job, error: &str) -> Result<(), QueueError> {
        self.failed.lock().await.push(FailedJob {
            queue: queue.to_string(),
            job: job.clone(),
            error: error.to_string(),
        });
        Ok(())
    }
}
