use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tenant.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of tenant IDs with other string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Unique identifier for a message event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

/// Unique identifier for a webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub String);

/// Unique identifier for a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub String);

macro_rules! string_id {
    ($t:ty) => {
        impl $t {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(TenantId);
string_id!(MessageId);
string_id!(EventId);
string_id!(EndpointId);
string_id!(TemplateId);

/// An email address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub email: String,
    pub name: Option<String>,
}

impl Address {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Derived delivery state of a message.
///
/// The event log is the source of truth; this is a last-writer-wins
/// cache of the latest terminal-ish state. Out-of-order events can move
/// it backward; monotonic transitions are not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Bounce,
    Complaint,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageStatus::Queued => "queued",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Bounce => "bounce",
            MessageStatus::Complaint => "complaint",
        };
        f.write_str(s)
    }
}

/// Lifecycle event types recorded against a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Queued,
    Sent,
    Delivered,
    Bounce,
    Complaint,
    Open,
    Click,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Queued => "queued",
            EventType::Sent => "sent",
            EventType::Delivered => "delivered",
            EventType::Bounce => "bounce",
            EventType::Complaint => "complaint",
            EventType::Open => "open",
            EventType::Click => "click",
        };
        f.write_str(s)
    }
}

/// One outbound email attempt.
///
/// A `Message` is immutable except for `status` and the provider metadata
/// fields, which are set once by the mail dispatcher on a successful send
/// and thereafter by event ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub tenant_id: TenantId,
    pub from: Address,
    pub to: Address,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub tags: Vec<String>,

    /// When set, rendered template content supersedes the literal
    /// subject/html/text at send time.
    pub template_id: Option<TemplateId>,
    pub template_data: Option<serde_json::Value>,

    pub status: MessageStatus,
    pub provider: Option<String>,
    pub provider_msg_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new queued message with empty optional fields.
    pub fn new(tenant_id: TenantId, from: Address, to: Address, subject: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            tenant_id,
            from,
            to,
            subject: subject.into(),
            text: None,
            html: None,
            headers: None,
            tags: Vec::new(),
            template_id: None,
            template_data: None,
            status: MessageStatus::Queued,
            provider: None,
            provider_msg_id: None,
            created_at: Utc::now(),
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

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
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

/// Append-only log entry for something that happened to a message.
///
/// Never mutated or deleted. `created_at` is the authoritative ordering
/// key for display and analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub message_id: MessageId,
    pub event_type: EventType,
    /// Free-form context: provider ids, ingestion source.
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl MessageEvent {
    pub fn new(tenant_id: TenantId, message_id: MessageId, event_type: EventType) -> Self {
        Self {
            id: EventId::generate(),
            tenant_id,
            message_id,
            event_type,
            payload: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A tenant's webhook subscription target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: EndpointId,
    pub tenant_id: TenantId,
    pub url: String,
    pub enabled: bool,
    /// Event types this endpoint wants delivered.
    pub events: Vec<EventType>,
}

impl WebhookEndpoint {
    pub fn new(tenant_id: TenantId, url: impl Into<String>) -> Self {
        Self {
            id: EndpointId::generate(),
            tenant_id,
            url: url.into(),
            enabled: true,
            events: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Vec<EventType>) -> Self {
        self.events = events;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether this endpoint subscribes to the given event type.
    pub fn is_subscribed(&self, event_type: EventType) -> bool {
        self.events.contains(&event_type)
    }
}

/// A stored email template with mustache-style placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub tenant_id: TenantId,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

/// Why an address was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuppressionReason {
    Bounce,
    Complaint,
    Unsubscribe,
    Manual,
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SuppressionReason::Bounce => "bounce",
            SuppressionReason::Complaint => "complaint",
            SuppressionReason::Unsubscribe => "unsubscribe",
            SuppressionReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Per-tenant block list entry keyed by (tenant, email).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suppression {
    pub tenant_id: TenantId,
    pub email: String,
    pub reason: SuppressionReason,
    pub created_at: DateTime<Utc>,
}

impl Suppression {
    pub fn new(tenant_id: TenantId, email: impl Into<String>, reason: SuppressionReason) -> Self {
        Self {
            tenant_id,
            email: email.into(),
            reason,
            created_at: Utc::now(),
        }
    }
}

/// The JSON body POSTed to webhook endpoints.
///
/// Field names are camelCase on the wire; `payload` is omitted entirely
/// when the event carries none.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventPayload {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub tenant_id: TenantId,
    pub message_id: MessageId,
    /// RFC3339 timestamp of event creation, millisecond precision.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub message: WebhookMessageSummary,
}

/// Envelope summary embedded in every webhook body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookMessageSummary {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub tags: Vec<String>,
}

impl WebhookEventPayload {
    pub fn new(event: &MessageEvent, message: &Message) -> Self {
        Self {
            id: event.id.clone(),
            event_type: event.event_type,
            tenant_id: event.tenant_id.clone(),
            message_id: event.message_id.clone(),
            timestamp: event.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            payload: event.payload.clone(),
            message: WebhookMessageSummary {
                to: message.to.email.clone(),
                from: message.from.email.clone(),
                subject: message.subject.clone(),
                tags: message.tags.clone(),
            },
        }
    }
}
