//! Mail dispatcher: turns a stored message into an attempted send.
//!
//! Consumes `send` jobs from the `mail` queue. A missing message, a message
//! already past `queued`, or a missing template are all tolerated; transport,
//! template-syntax, and store failures fail the job. Side effects are
//! strictly ordered:
//! transport send, then status update, then `sent` event, then webhook
//! enqueue. A send is never falsely recorded, but a crash after the send
//! leaves an accepted inconsistency window (message `sent` without event or
//! fan-out).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{JobError, SendError};
use crate::mail::{MailTransport, SendMail};
use crate::queue::{Job, JobHandler, JobQueue, WEBHOOK_QUEUE};
use crate::render::Renderer;
use crate::store::Store;
use crate::types::{EventType, Message, MessageEvent, MessageId, MessageStatus, TenantId};
use crate::webhook::{DeliverJob, DELIVER_JOB};

/// Job name handled by the mail dispatcher.
pub const SEND_JOB: &str = "send";

/// Payload of a `mail`/`send` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendJob {
    pub message_id: MessageId,
    pub tenant_id: TenantId,
}

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Consumer for the `mail` queue.
pub struct MailDispatcher {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    transport: Arc<dyn MailTransport>,
    renderer: Renderer,
    send_timeout: Duration,
}

impl MailDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        transport: Arc<dyn MailTransport>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            transport,
            renderer: Renderer::new(),
            send_timeout,
        }
    }

    /// Resolve the content actually handed to the transport: rendered
    /// template fields when a template is set and present, the literal
    /// message fields otherwise.
    async fn effective_content(
        &self,
        message: &Message,
    ) -> Result<(String, Option<String>, Option<String>), JobError> {
        if let Some(template_id) = &message.template_id {
            match self.store.template(&message.tenant_id, template_id).await? {
                Some(template) => {
                    let data = message
                        .template_data
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({}));

                    let (subject, html, text) = self.renderer.render_message(&template, &data)?;
                    return Ok((subject, Some(html), text.or_else(|| message.text.clone())));
                }
                None => {
                    // Tolerated: fall back to the literal fields.
                    tracing::debug!(
                        template = %template_id,
                        message = %message.id,
                        "template not found, using literal content"
                    );
                }
            }
        }

        Ok((message.subject.clone(), message.html.clone(), message.text.clone()))
    }
}

#[async_trait]
impl JobHandler for MailDispatcher {
    async fn handle(&self, job: Job) -> Result<(), JobError> {
        if job.name != SEND_JOB {
            tracing::debug!(job = %job.name, "ignoring unknown job on mail queue");
            return Ok(());
        }

        let SendJob {
            message_id,
            tenant_id,
        } = job.data()?;

        let Some(message) = self.store.message(&tenant_id, &message_id).await? else {
            // Deleted, or a cross-tenant payload: success-no-op.
            tracing::debug!(message = %message_id, "message not found, skipping send");
            return Ok(());
        };

        if message.status != MessageStatus::Queued {
            // Duplicate delivery guard: the transport must not run twice.
            tracing::debug!(
                message = %message_id,
                status = %message.status,
                "message already processed, skipping send"
            );
            return Ok(());
        }

        let (subject, html, text) = self.effective_content(&message).await?;

        let outcome = tokio::time::timeout(
            self.send_timeout,
            self.transport.send(SendMail {
                from: message.from.clone(),
                to: message.to.clone(),
                subject,
                text,
                html,
                headers: message.headers.clone(),
            }),
        )
        .await
        .map_err(|_| SendError::Timeout(self.send_timeout))??;

        self.store
            .mark_sent(
                &tenant_id,
                &message_id,
                &outcome.provider,
                outcome.provider_msg_id.as_deref(),
            )
            .await?;

        let mut payload = serde_json::Map::new();
        payload.insert("provider".to_string(), outcome.provider.clone().into());
        if let Some(provider_msg_id) = &outcome.provider_msg_id {
            payload.insert("providerMsgId".to_string(), provider_msg_id.clone().into());
        }

        let event = MessageEvent::new(tenant_id.clone(), message_id.clone(), EventType::Sent)
            .with_payload(serde_json::Value::Object(payload));
        let event_id = event.id.clone();
        self.store.insert_event(event).await?;

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

        metric_inc("maildog.mail.sent");
        tracing::info!(
            message = %message_id,
            tenant = %tenant_id,
            provider = %outcome.provider,
            "message sent"
        );
        Ok(())
    }
}
