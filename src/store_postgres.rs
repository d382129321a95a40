//! Postgres-backed store.
//!
//! Rows are JSONB documents keyed by tenant plus id, one table per entity.
//! Schema setup is idempotent (`CREATE TABLE IF NOT EXISTS`) and runs on
//! connect. Status updates are read-modify-write on the document; the
//! pipeline's last-writer-wins semantics make that acceptable.

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};

use crate::error::StoreError;
use crate::store::Store;
use crate::types::{
    EventId, Message, MessageEvent, MessageId, MessageStatus, Suppression, Template, TemplateId,
    TenantId, WebhookEndpoint,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS maildog_messages (
    tenant_id TEXT NOT NULL,
    id TEXT NOT NULL,
    doc JSONB NOT NULL,
    PRIMARY KEY (tenant_id, id)
);
CREATE TABLE IF NOT EXISTS maildog_events (
    tenant_id TEXT NOT NULL,
    id TEXT NOT NULL,
    message_id TEXT NOT NULL,
    doc JSONB NOT NULL,
    PRIMARY KEY (tenant_id, id)
);
CREATE TABLE IF NOT EXISTS maildog_endpoints (
    tenant_id TEXT NOT NULL,
    id TEXT NOT NULL,
    doc JSONB NOT NULL,
    PRIMARY KEY (tenant_id, id)
);
CREATE TABLE IF NOT EXISTS maildog_templates (
    tenant_id TEXT NOT NULL,
    id TEXT NOT NULL,
    doc JSONB NOT NULL,
    PRIMARY KEY (tenant_id, id)
);
CREATE TABLE IF NOT EXISTS maildog_suppressions (
    tenant_id TEXT NOT NULL,
    email TEXT NOT NULL,
    doc JSONB NOT NULL,
    PRIMARY KEY (tenant_id, email)
);
";

pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connect, spawn the connection driver, and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(backend)?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection terminated");
            }
        });

        client.batch_execute(SCHEMA).await.map_err(backend)?;
        Ok(Self { client })
    }

    async fn upsert_doc(
        &self,
        table: &str,
        tenant_id: &str,
        id: &str,
        doc: serde_json::Value,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {table} (tenant_id, id, doc) VALUES ($1, $2, $3) \
             ON CONFLICT (tenant_id, id) DO UPDATE SET doc = EXCLUDED.doc"
        );
        self.client
            .execute(&sql, &[&tenant_id, &id, &doc])
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn fetch_doc(
        &self,
        table: &str,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let sql = format!("SELECT doc FROM {table} WHERE tenant_id = $1 AND id = $2");
        let row = self
            .client
            .query_opt(&sql, &[&tenant_id, &id])
            .await
            .map_err(backend)?;
        Ok(row.map(|r| r.get(0)))
    }
}

fn backend(err: tokio_postgres::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn decode_err(err: serde_json::Error) -> StoreError {
    StoreError::Backend(format!("stored document is malformed: {err}"))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(decode_err)
}

fn decode<T: serde::de::DeserializeOwned>(doc: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(doc).map_err(decode_err)
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_message(&self, message: Message) -> Result<(), StoreError> {
        let doc = encode(&message)?;
        self.upsert_doc(
            "maildog_messages",
            message.tenant_id.as_str(),
            message.id.as_str(),
            doc,
        )
        .await
    }

    async fn message(
        &self,
        tenant_id: &TenantId,
        id: &MessageId,
    ) -> Result<Option<Message>, StoreError> {
        match self
            .fetch_doc("maildog_messages", tenant_id.as_str(), id.as_str())
            .await?
        {
            Some(doc) => Ok(Some(decode(doc)?)),
            None => Ok(None),
        }
    }

    async fn mark_sent(
        &self,
        tenant_id: &TenantId,
        id: &MessageId,
        provider: &str,
        provider_msg_id: Option<&str>,
    ) -> Result<(), StoreError> {
        if let Some(mut message) = self.message(tenant_id, id).await? {
            message.status = MessageStatus::Sent;
            message.provider = Some(provider.to_string());
            message.provider_msg_id = provider_msg_id.map(str::to_string);
            self.insert_message(message).await?;
        }
        Ok(())
    }

    async fn set_status(
        &self,
        tenant_id: &TenantId,
        id: &MessageId,
        status: MessageStatus,
    ) -> Result<(), StoreError> {
        if let Some(mut message) = self.message(tenant_id, id).await? {
            message.status = status;
            self.insert_message(message).await?;
        }
        Ok(())
    }

    async fn insert_event(&self, event: MessageEvent) -> Result<(), StoreError> {
        let doc = encode(&event)?;
        self.client
            .execute(
                "INSERT INTO maildog_events (tenant_id, id, message_id, doc) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (tenant_id, id) DO UPDATE SET doc = EXCLUDED.doc",
                &[
                    &event.tenant_id.as_str(),
                    &event.id.as_str(),
                    &event.message_id.as_str(),
                    &doc,
                ],
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn event_with_message(
        &self,
        tenant_id: &TenantId,
        id: &EventId,
    ) -> Result<Option<(MessageEvent, Message)>, StoreError> {
        let Some(doc) = self
            .fetch_doc("maildog_events", tenant_id.as_str(), id.as_str())
            .await?
        else {
            return Ok(None);
        };
        let event: MessageEvent = decode(doc)?;

        match self.message(tenant_id, &event.message_id).await? {
            Some(message) => Ok(Some((event, message))),
            None => Ok(None),
        }
    }

    async fn insert_endpoint(&self, endpoint: WebhookEndpoint) -> Result<(), StoreError> {
        let doc = encode(&endpoint)?;
        self.upsert_doc(
            "maildog_endpoints",
            endpoint.tenant_id.as_str(),
            endpoint.id.as_str(),
            doc,
        )
        .await
    }

    async fn enabled_endpoints(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<WebhookEndpoint>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT doc FROM maildog_endpoints WHERE tenant_id = $1 ORDER BY id",
                &[&tenant_id.as_str()],
            )
            .await
            .map_err(backend)?;

        let mut endpoints = Vec::with_capacity(rows.len());
        for row in rows {
            let endpoint: WebhookEndpoint = decode(row.get(0))?;
            if endpoint.enabled {
                endpoints.push(endpoint);
            }
        }
        Ok(endpoints)
    }

    async fn insert_template(&self, template: Template) -> Result<(), StoreError> {
        let doc = encode(&template)?;
        self.upsert_doc(
            "maildog_templates",
            template.tenant_id.as_str(),
            template.id.as_str(),
            doc,
        )
        .await
    }

    async fn template(
        &self,
        tenant_id: &TenantId,
        id: &TemplateId,
    ) -> Result<Option<Template>, StoreError> {
        match self
            .fetch_doc("maildog_templates", tenant_id.as_str(), id.as_str())
            .await?
        {
            Some(doc) => Ok(Some(decode(doc)?)),
            None => Ok(None),
        }
    }

    async fn upsert_suppression(&self, suppression: Suppression) -> Result<(), StoreError> {
        let doc = encode(&suppression)?;
        self.client
            .execute(
                "INSERT INTO maildog_suppressions (tenant_id, email, doc) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (tenant_id, email) DO UPDATE SET doc = EXCLUDED.doc",
                &[
                    &suppression.tenant_id.as_str(),
                    &suppression.email.as_str(),
                    &doc,
                ],
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn suppression(
        &self,
        tenant_id: &TenantId,
        email: &str,
    ) -> Result<Option<Suppression>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT doc FROM maildog_suppressions WHERE tenant_id = $1 AND email = $2",
                &[&tenant_id.as_str(), &email],
            )
            .await
            .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(decode(row.get(0))?)),
            None => Ok(None),
        }
    }
}
