//! Provider event ingestion.
//!
//! Delivery reports arrive from outside (provider callbacks relayed by the
//! API layer) as `delivered`, `bounce`, `complaint`, `open`, or `click`.
//! Ingestion appends the event, refreshes the status cache for the
//! status-bearing types, adds a suppression for `bounce`/`complaint`, and
//! queues webhook fan-out. `queued` and `sent` originate inside the
//! pipeline and are never accepted here.

use std::sync::Arc;

use crate::error::IngestError;
use crate::queue::{Job, JobQueue, WEBHOOK_QUEUE};
use crate::store::Store;
use crate::types::{
    EventId, EventType, MessageEvent, MessageId, MessageStatus, Suppression, SuppressionReason,
    TenantId,
};
use crate::webhook::{DeliverJob, DELIVER_JOB};

/// Accepts provider-originated lifecycle events.
pub struct Ingestor {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Record an external event against an existing message.
    pub async fn ingest(
        &self,
        tenant_id: TenantId,
        message_id: MessageId,
        event_type: EventType,
        payload: Option<serde_json::Value>,
    ) -> Result<EventId, IngestError> {
        if matches!(event_type, EventType::Queued | EventType::Sent) {
            return Err(IngestError::UnsupportedType(event_type));
        }

        let Some(message) = self.store.message(&tenant_id, &message_id).await? else {
            return Err(IngestError::MessageNotFound(message_id));
        };

        let mut event = MessageEvent::new(tenant_id.clone(), message_id.clone(), event_type);
        if let Some(payload) = payload {
            event = event.with_payload(payload);
        }
        let event_id = event.id.clone();
        self.store.insert_event(event).await?;

        // Status cache: last writer wins, no monotonicity enforced.
        let status = match event_type {
            EventType::Delivered => Some(MessageStatus::Delivered),
            EventType::Bounce => Some(MessageStatus::Bounce),
            EventType::Complaint => Some(MessageStatus::Complaint),
            _ => None,
        };
        if let Some(status) = status {
            self.store.set_status(&tenant_id, &message_id, status).await?;
        }

        let reason = match event_type {
            EventType::Bounce => Some(SuppressionReason::Bounce),
            EventType::Complaint => Some(SuppressionReason::Complaint),
            _ => None,
        };
        if let Some(reason) = reason {
            self.store
                .upsert_suppression(Suppression::new(
                    tenant_id.clone(),
                    message.to.email.clone(),
                    reason,
                ))
                .await?;
        }

        self.queue
            .enqueue(
                WEBHOOK_QUEUE,
                Job::new(
                    DELIVER_JOB,
                    &DeliverJob {
                        tenant_id: tenant_id.clone(),
                        event_id: event_id.clone(),
                    },
                )?,
            )
            .await?;

        tracing::info!(
            message = %message_id,
            tenant = %tenant_id,
            event = %event_type,
            "event ingested"
        );
        Ok(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryQueue;
    use crate::store::InMemoryStore;
    use crate::types::Address;

    async fn setup() -> (Arc<InMemoryStore>, Arc<InMemoryQueue>, TenantId, MessageId) {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryQueue::new());
        let tenant = TenantId::new("t1");
        let message = crate::types::Message::new(
            tenant.clone(),
            Address::new("a@x.com"),
            Address::new("b@y.com"),
            "Hi",
        );
        let id = message.id.clone();
        store.insert_message(message).await.unwrap();
        (store, queue, tenant, id)
    }

    #[tokio::test]
    async fn bounce_updates_status_and_adds_suppression() {
        let (store, queue, tenant, message_id) = setup().await;
        let ingestor = Ingestor::new(store.clone(), queue.clone());

        ingestor
            .ingest(tenant.clone(), message_id.clone(), EventType::Bounce, None)
            .await
            .unwrap();

        let stored = store.message(&tenant, &message_id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Bounce);

        let suppression = store.suppression(&tenant, "b@y.com").await.unwrap().unwrap();
        assert_eq!(suppression.reason, SuppressionReason::Bounce);

        let deliver = queue.reserve(WEBHOOK_QUEUE).await.unwrap().unwrap();
        assert_eq!(deliver.name, DELIVER_JOB);
    }

    #[tokio::test]
    async fn open_records_event_without_touching_status() {
        let (store, queue, tenant, message_id) = setup().await;
        let ingestor = Ingestor::new(store.clone(), queue.clone());

        ingestor
            .ingest(tenant.clone(), message_id.clone(), EventType::Open, None)
            .await
            .unwrap();

        let stored = store.message(&tenant, &message_id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Queued);
        assert!(store.suppression(&tenant, "b@y.com").await.unwrap().is_none());

        let events = store.events_for_message(&tenant, &message_id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Open);
    }

    #[tokio::test]
    async fn internal_types_are_rejected() {
        let (store, queue, tenant, message_id) = setup().await;
        let ingestor = Ingestor::new(store, queue);

        let err = ingestor
            .ingest(tenant, message_id, EventType::Sent, None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedType(EventType::Sent)));
    }

    #[tokio::test]
    async fn unknown_message_is_an_error() {
        let (_, queue, tenant, _) = setup().await;
        let ingestor = Ingestor::new(Arc::new(InMemoryStore::new()), queue);

        let err = ingestor
            .ingest(tenant, MessageId::new("nope"), EventType::Delivered, None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MessageNotFound(_)));
    }
}
