//! Message submission: the producer side of the pipeline.
//!
//! Submission is fire-and-forget: the message is persisted, a `queued`
//! event is recorded, jobs land on both queues, and the caller gets the
//! message id back before any send is attempted. The suppression check
//! happens only here; a suppression added after enqueue does not cancel
//! the in-flight job.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dispatch::{SendJob, SEND_JOB};
use crate::error::SubmitError;
use crate::queue::{Job, JobQueue, MAIL_QUEUE, WEBHOOK_QUEUE};
use crate::store::Store;
use crate::types::{
    Address, EventType, Message, MessageEvent, MessageId, TemplateId, TenantId,
};
use crate::webhook::{DeliverJob, DELIVER_JOB};

/// What a caller hands to [`Producer::submit`].
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub from: Address,
    pub to: Address,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub tags: Vec<String>,
    pub template_id: Option<TemplateId>,
    pub template_data: Option<serde_json::Value>,
}

impl SendRequest {
    pub fn new(from: Address, to: Address, subject: impl Into<String>) -> Self {
        Self {
            from,
            to,
            subject: subject.into(),
            text: None,
            html: None,
            headers: None,
            tags: Vec::new(),
            template_id: None,
            template_data: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_template(mut self, template_id: TemplateId, data: Option<serde_json::Value>) -> Self {
        self.template_id = Some(template_id);
        self.template_data = data;
        self
    }
}

/// Accepts messages for asynchronous delivery.
pub struct Producer {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
}

impl Producer {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Persist a message and queue it for sending.
    ///
    /// Returns the new message id immediately; the send happens later on
    /// the `mail` queue. Suppressed recipients are rejected up front.
    pub async fn submit(
        &self,
        tenant_id: TenantId,
        request: SendRequest,
    ) -> Result<MessageId, SubmitError> {
        if let Some(suppression) = self
            .store
            .suppression(&tenant_id, &request.to.email)
            .await?
        {
            return Err(SubmitError::Suppressed {
                email: suppression.email,
                reason: suppression.reason,
            });
        }

        let mut message = Message::new(
            tenant_id.clone(),
            request.from,
            request.to,
            request.subject,
        );
        message.text = request.text;
        message.html = request.html;
        message.headers = request.headers;
        message.tags = request.tags;
        message.template_id = request.template_id;
        message.template_data = request.template_data;

        let message_id = message.id.clone();
        self.store.insert_message(message).await?;

        let event = MessageEvent::new(tenant_id.clone(), message_id.clone(), EventType::Queued);
        let event_id = event.id.clone();
        self.store.insert_event(event).await?;

        self.queue
            .enqueue(
                MAIL_QUEUE,
                Job::new(
                    SEND_JOB,
                    &SendJob {
                        message_id: message_id.clone(),
                        tenant_id: tenant_id.clone(),
                    },
                )?,
            )
            .await?;
        self.queue
            .enqueue(
                WEBHOOK_QUEUE,
                Job::new(
                    DELIVER_JOB,
                    &DeliverJob {
                        tenant_id: tenant_id.clone(),
                        event_id,
                    },
                )?,
            )
            .await?;

        tracing::info!(message = %message_id, tenant = %tenant_id, "message accepted");
        Ok(message_id)
    }
}
