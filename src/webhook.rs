//! Webhook dispatcher: fans one message event out to subscribed endpoints.
//!
//! Consumes `deliver` jobs from the `webhooks` queue. Delivery is
//! best-effort: each endpoint gets its own POST attempt, failures are
//! logged and swallowed, and the job itself succeeds whenever the fan-out
//! ran. Endpoint isolation holds because every attempt runs in its own
//! task; one slow or broken receiver never delays the others.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::queue::{Job, JobHandler};
use crate::signing::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::store::Store;
use crate::types::{EventId, TenantId, WebhookEndpoint, WebhookEventPayload};

/// Job name handled by the webhook dispatcher.
pub const DELIVER_JOB: &str = "deliver";

/// Payload of a `webhooks`/`deliver` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverJob {
    pub tenant_id: TenantId,
    pub event_id: EventId,
}

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// A payload serialized and signed once, shared across every endpoint
/// attempt of one fan-out.
struct SignedDelivery {
    body: String,
    timestamp: String,
    signature: String,
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}

/// Consumer for the `webhooks` queue.
pub struct WebhookDispatcher {
    store: Arc<dyn Store>,
    client: reqwest::Client,
    signing_secret: String,
    timeout: Duration,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<dyn Store>, signing_secret: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            signing_secret: signing_secret.into(),
            timeout,
        }
    }

    /// POST the signed body to one endpoint. Non-2xx counts as failure.
    async fn deliver_to(
        client: reqwest::Client,
        url: String,
        delivery: Arc<SignedDelivery>,
        timeout: Duration,
    ) -> Result<(), String> {
        let response = client
            .post(&url)
            .header("content-type", "application/json")
            .header(TIMESTAMP_HEADER, &delivery.timestamp)
            .header(SIGNATURE_HEADER, &delivery.signature)
            .body(delivery.body.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("endpoint returned {status}"))
        }
    }
}

#[async_trait]
impl JobHandler for WebhookDispatcher {
    async fn handle(&self, job: Job) -> Result<(), JobError> {
        if job.name != DELIVER_JOB {
            tracing::debug!(job = %job.name, "ignoring unknown job on webhook queue");
            return Ok(());
        }

        let DeliverJob {
            tenant_id,
            event_id,
        } = job.data()?;

        let Some((event, message)) = self.store.event_with_message(&tenant_id, &event_id).await?
        else {
            // Deleted event or message: success-no-op under redelivery.
            tracing::debug!(event = %event_id, "event not found, skipping fan-out");
            return Ok(());
        };

        let endpoints: Vec<WebhookEndpoint> = self
            .store
            .enabled_endpoints(&tenant_id)
            .await?
            .into_iter()
            .filter(|e| e.is_subscribed(event.event_type))
            .collect();

        if endpoints.is_empty() {
            tracing::debug!(event = %event_id, "no subscribed endpoints");
            return Ok(());
        }

        // One serialization and one signature, shared across all attempts,
        // so every endpoint receives byte-identical signed content.
        let body = serde_json::to_string(&WebhookEventPayload::new(&event, &message))
            .map_err(JobError::Payload)?;
        let timestamp = unix_timestamp();
        let signature = signing::sign(&self.signing_secret, &timestamp, body.as_bytes());
        let delivery = Arc::new(SignedDelivery {
            body,
            timestamp,
            signature,
        });

        let mut attempts = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let client = self.client.clone();
            let delivery = delivery.clone();
            let timeout = self.timeout;
            let url = endpoint.url.clone();
            let endpoint_id = endpoint.id.clone();

            attempts.push(tokio::spawn(async move {
                match Self::deliver_to(client, url.clone(), delivery, timeout).await {
                    Ok(()) => {
                        metric_inc("maildog.webhook.delivered");
                        tracing::debug!(endpoint = %endpoint_id, url = %url, "webhook delivered");
                    }
                    Err(err) => {
                        metric_inc("maildog.webhook.failed");
                        tracing::warn!(
                            endpoint = %endpoint_id,
                            url = %url,
                            error = %err,
                            "webhook delivery failed"
                        );
                    }
                }
            }));
        }

        for attempt in attempts {
            // A panicked attempt is still best-effort; log and move on.
            if attempt.await.is_err() {
                tracing::warn!(event = %event_id, "webhook delivery task panicked");
            }
        }

        tracing::info!(event = %event_id, tenant = %tenant_id, "webhook fan-out complete");
        Ok(())
    }
}
