//! maildog — asynchronous dispatch pipeline for a multi-tenant
//! transactional email service.
//!
//! Two job queues drive the pipeline. The `mail` queue turns a stored
//! [`Message`] into an attempted send through a pluggable
//! [`MailTransport`]; the `webhooks` queue fans a stored [`MessageEvent`]
//! out to every subscribed tenant endpoint with an HMAC-signed JSON body.
//!
//! # Guarantees
//!
//! - At-least-once job processing: a job survives a consumer crash before
//!   acknowledgment (with a broker-backed queue) and handlers tolerate the
//!   resulting duplicates. The mail dispatcher never invokes the transport
//!   twice for the same message.
//! - A send is never falsely recorded: the message only becomes `sent`
//!   after the transport accepted it.
//! - Webhook bodies are signed deterministically over
//!   `timestamp.body` with the shared secret; receivers can verify with
//!   the helpers in [`signing`].
//! - Webhook endpoints are isolated: one slow or failing receiver never
//!   blocks delivery to the others, and never fails the job.
//!
//! # Non-guarantees
//!
//! - No exactly-once delivery: a crash between transport accept and the
//!   status write can produce a duplicate email on redelivery.
//! - No cross-message ordering, and no ordering across webhook endpoints.
//! - Message status is a last-writer-wins cache over the event log;
//!   out-of-order ingestion can move it backward.
//! - Failed jobs are not retried; they are reported through the queue's
//!   failure path and parked.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use maildog::{
//!     Address, Config, Consumer, InMemoryQueue, InMemoryStore, MailDispatcher,
//!     NoopTransport, Producer, SendRequest, TenantId, WebhookDispatcher,
//!     MAIL_QUEUE, WEBHOOK_QUEUE,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let store = Arc::new(InMemoryStore::new());
//! let queue = Arc::new(InMemoryQueue::new());
//! let cancel = CancellationToken::new();
//!
//! let mail = Arc::new(MailDispatcher::new(
//!     store.clone(),
//!     queue.clone(),
//!     Arc::new(NoopTransport),
//!     config.mail_send_timeout(),
//! ));
//! let webhooks = Arc::new(WebhookDispatcher::new(
//!     store.clone(),
//!     config.webhook_signing_secret.clone(),
//!     config.webhook_timeout(),
//! ));
//! Consumer::spawn(queue.clone(), MAIL_QUEUE, mail, config.mail_workers, cancel.clone());
//! Consumer::spawn(queue.clone(), WEBHOOK_QUEUE, webhooks, config.webhook_workers, cancel.clone());
//!
//! let producer = Producer::new(store, queue);
//! producer
//!     .submit(
//!         TenantId::new("acme"),
//!         SendRequest::new(Address::new("no-reply@acme.test"), Address::new("user@example.com"), "Welcome")
//!             .with_text("Hello!"),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod mail;
pub mod producer;
pub mod queue;
pub mod render;
pub mod signing;
pub mod store;
pub mod types;
pub mod webhook;

#[cfg(feature = "redis")]
pub mod queue_redis;

#[cfg(feature = "postgres")]
pub mod store_postgres;

pub use config::{Config, MailTransportKind};
pub use dispatch::{MailDispatcher, SendJob, SEND_JOB};
pub use error::{
    ConfigError, IngestError, JobError, QueueError, RenderError, SendError, StoreError,
    SubmitError,
};
pub use ingest::Ingestor;
pub use mail::{transport_from_config, MailTransport, NoopTransport, SendMail, SendOutcome};
pub use producer::{Producer, SendRequest};
pub use queue::{
    Consumer, InMemoryQueue, Job, JobHandler, JobId, JobQueue, MAIL_QUEUE, WEBHOOK_QUEUE,
};
pub use render::Renderer;
pub use signing::{sign, verify_webhook_request, SIGNATURE_HEADER, TIMESTAMP_HEADER};
pub use store::{InMemoryStore, Store};
pub use types::{
    Address, EndpointId, EventId, EventType, Message, MessageEvent, MessageId, MessageStatus,
    Suppression, SuppressionReason, Template, TemplateId, TenantId, WebhookEndpoint,
    WebhookEventPayload,
};
pub use webhook::{DeliverJob, WebhookDispatcher, DELIVER_JOB};

#[cfg(feature = "redis")]
pub use queue_redis::RedisQueue;

#[cfg(feature = "postgres")]
pub use store_postgres::PostgresStore;

#[cfg(feature = "smtp")]
pub use mail::SmtpSinkTransport;
