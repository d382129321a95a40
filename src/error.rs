use std::time::Duration;

use thiserror::Error;

use crate::types::{EventType, MessageId, SuppressionReason};

/// Errors returned by job queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing broker rejected or lost the operation.
    #[error("queue backend error: {0}")]
    Backend(String),

    /// A job payload could not be encoded.
    #[error("job payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    /// The queue has been shut down; no further jobs are accepted.
    #[error("queue is shut down")]
    Shutdown,
}

/// Errors returned by store backends.
///
/// Not-found is never an error; tenant-scoped lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors returned by mail transports.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("transport {transport} failed: {message}")]
    Transport { transport: String, message: String },

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors returned by the template renderer.
///
/// Missing variables are not an error (they render empty); only malformed
/// template syntax fails.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template failed to render: {0}")]
    Template(String),
}

/// Error returned by a job handler.
///
/// A failed handler is reported to the queue's failure path and is not
/// automatically redelivered.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("job handler panicked")]
    Panicked,
}

/// Errors returned when submitting a message for delivery.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The recipient is on the tenant's suppression list.
    #[error("recipient {email} is suppressed ({reason})")]
    Suppressed {
        email: String,
        reason: SuppressionReason,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors returned when ingesting an externally-originated event.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// Only provider-originated lifecycle types may be ingested.
    #[error("event type {0} cannot be ingested")]
    UnsupportedType(EventType),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors raised while loading process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    Invalid { var: String, value: String },
}
