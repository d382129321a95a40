//! Backing-store seam for the dispatch pipeline.
//!
//! The pipeline's handlers depend only on the [`Store`] trait. All reads are
//! tenant-scoped; a lookup for the wrong tenant behaves exactly like a
//! missing row. Not-found is `Ok(None)`, never an error, because it is
//! expected under duplicate job delivery.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::types::{
    EventId, Message, MessageEvent, MessageId, MessageStatus, Suppression, Template, TemplateId,
    TenantId, WebhookEndpoint,
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_message(&self, message: Message) -> Result<(), StoreError>;

    async fn message(
        &self,
        tenant_id: &TenantId,
        id: &MessageId,
    ) -> Result<Option<Message>, StoreError>;

    /// Record a successful send: status becomes `sent` and the provider
    /// metadata is stored. No-op when the message is missing.
    async fn mark_sent(
        &self,
        tenant_id: &TenantId,
        id: &MessageId,
        provider: &str,
        provider_msg_id: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Overwrite the derived status cache. Last writer wins.
    async fn set_status(
        &self,
        tenant_id: &TenantId,
        id: &MessageId,
        status: MessageStatus,
    ) -> Result<(), StoreError>;

    async fn insert_event(&self, event: MessageEvent) -> Result<(), StoreError>;

    /// Load an event together with its parent message.
    async fn event_with_message(
        &self,
        tenant_id: &TenantId,
        id: &EventId,
    ) -> Result<Option<(MessageEvent, Message)>, StoreError>;

    async fn insert_endpoint(&self, endpoint: WebhookEndpoint) -> Result<(), StoreError>;

    /// All of a tenant's endpoints with `enabled == true`.
    async fn enabled_endpoints(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<WebhookEndpoint>, StoreError>;

    async fn insert_template(&self, template: Template) -> Result<(), StoreError>;

    async fn template(
        &self,
        tenant_id: &TenantId,
        id: &TemplateId,
    ) -> Result<Option<Template>, StoreError>;

    async fn upsert_suppression(&self, suppression: Suppression) -> Result<(), StoreError>;

    async fn suppression(
        &self,
        tenant_id: &TenantId,
        email: &str,
    ) -> Result<Option<Suppression>, StoreError>;
}

/// In-memory store for tests and single-process usage.
#[derive(Default)]
pub struct InMemoryStore {
    messages: Mutex<HashMap<(TenantId, MessageId), Message>>,
    events: Mutex<HashMap<(TenantId, EventId), MessageEvent>>,
    endpoints: Mutex<HashMap<(TenantId, crate::types::EndpointId), WebhookEndpoint>>,
    templates: Mutex<HashMap<(TenantId, TemplateId), Template>>,
    suppressions: Mutex<HashMap<(TenantId, String), Suppression>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded for a message, oldest first. Test helper.
    pub async fn events_for_message(
        &self,
        tenant_id: &TenantId,
        message_id: &MessageId,
    ) -> Vec<MessageEvent> {
        let events = self.events.lock().await;
        let mut found: Vec<MessageEvent> = events
            .values()
            .filter(|e| &e.tenant_id == tenant_id && &e.message_id == message_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        found
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_message(&self, message: Message) -> Result<(), StoreError> {
        let key = (message.tenant_id.clone(), message.id.clone());
        self.messages.lock().await.insert(key, message);
        Ok(())
    }

    async fn message(
        &self,
        tenant_id: &TenantId,
        id: &MessageId,
    ) -> Result<Option<Message>, StoreError> {
        let messages = self.messages.lock().await;
        Ok(messages.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    async fn mark_sent(
        &self,
        tenant_id: &TenantId,
        id: &MessageId,
        provider: &str,
        provider_msg_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut messages = self.messages.lock().await;
        if let Some(message) = messages.get_mut(&(tenant_id.clone(), id.clone())) {
            message.status = MessageStatus::Sent;
            message.provider = Some(provider.to_string());
            message.provider_msg_id = provider_msg_id.map(str::to_string);
        }
        Ok(())
    }

    async fn set_status(
        &self,
        tenant_id: &TenantId,
        id: &MessageId,
        status: MessageStatus,
    ) -> Result<(), StoreError> {
        let mut messages = self.messages.lock().await;
        if let Some(message) = messages.get_mut(&(tenant_id.clone(), id.clone())) {
            message.status = status;
        }
        Ok(())
    }

    async fn insert_event(&self, event: MessageEvent) -> Result<(), StoreError> {
        let key = (event.tenant_id.clone(), event.id.clone());
        self.events.lock().await.insert(key, event);
        Ok(())
    }

    async fn event_with_message(
        &self,
        tenant_id: &TenantId,
        id: &EventId,
    ) -> Result<Option<(MessageEvent, Message)>, StoreError> {
        let events = self.events.lock().await;
        let Some(event) = events.get(&(tenant_id.clone(), id.clone())).cloned() else {
            return Ok(None);
        };
        drop(events);

        let messages = self.messages.lock().await;
        let Some(message) = messages
            .get(&(tenant_id.clone(), event.message_id.clone()))
            .cloned()
        else {
            return Ok(None);
        };

        Ok(Some((event, message)))
    }

    async fn insert_endpoint(&self, endpoint: WebhookEndpoint) -> Result<(), StoreError> {
        let key = (endpoint.tenant_id.clone(), endpoint.id.clone());
        self.endpoints.lock().await.insert(key, endpoint);
        Ok(())
    }

    async fn enabled_endpoints(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<WebhookEndpoint>, StoreError> {
        let endpoints = self.endpoints.lock().await;
        let mut found: Vec<WebhookEndpoint> = endpoints
            .values()
            .filter(|e| &e.tenant_id == tenant_id && e.enabled)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(found)
    }

    async fn insert_template(&self, template: Template) -> Result<(), StoreError> {
        let key = (template.tenant_id.clone(), template.id.clone());
        self.templates.lock().await.insert(key, template);
        Ok(())
    }

    async fn template(
        &self,
        tenant_id: &TenantId,
        id: &TemplateId,
    ) -> Result<Option<Template>, StoreError> {
        let templates = self.templates.lock().await;
        Ok(templates.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    async fn upsert_suppression(&self, suppression: Suppression) -> Result<(), StoreError> {
        let key = (suppression.tenant_id.clone(), suppression.email.clone());
        self.suppressions.lock().await.insert(key, suppression);
        Ok(())
    }

    async fn suppression(
        &self,
        tenant_id: &TenantId,
        email: &str,
    ) -> Result<Option<Suppression>, StoreError> {
        let suppressions = self.suppressions.lock().await;
        Ok(suppressions
            .get(&(tenant_id.clone(), email.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn message(tenant: &str) -> Message {
        Message::new(
            TenantId::new(tenant),
            Address::new("a@x.com"),
            Address::new("b@y.com"),
            "Hi",
        )
    }

    #[tokio::test]
    async fn lookups_are_tenant_scoped() {
        let store = InMemoryStore::new();
        let msg = message("t1");
        let id = msg.id.clone();
        store.insert_message(msg).await.unwrap();

        assert!(store.message(&TenantId::new("t1"), &id).await.unwrap().is_some());
        assert!(store.message(&TenantId::new("t2"), &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_sent_updates_status_and_provider() {
        let store = InMemoryStore::new();
        let msg = message("t1");
        let (tenant, id) = (msg.tenant_id.clone(), msg.id.clone());
        store.insert_message(msg).await.unwrap();

        store
            .mark_sent(&tenant, &id, "smtp_sink", Some("abc-123"))
            .await
            .unwrap();

        let stored = store.message(&tenant, &id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Sent);
        assert_eq!(stored.provider.as_deref(), Some("smtp_sink"));
        assert_eq!(stored.provider_msg_id.as_deref(), Some("abc-123"));
    }

    #[tokio::test]
    async fn suppression_upsert_overwrites_reason() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new("t1");
        store
            .upsert_suppression(Suppression::new(
                tenant.clone(),
                "b@y.com",
                crate::types::SuppressionReason::Bounce,
            ))
            .await
            .unwrap();
        store
            .upsert_suppression(Suppression::new(
                tenant.clone(),
                "b@y.com",
                crate::types::SuppressionReason::Complaint,
            ))
            .await
            .unwrap();

        let stored = store.suppression(&tenant, "b@y.com").await.unwrap().unwrap();
        assert_eq!(stored.reason, crate::types::SuppressionReason::Complaint);
    }
}
