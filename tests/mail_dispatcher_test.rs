mod common;

use std::sync::Arc;
use std::time::Duration;

use maildog::{
    Address, InMemoryQueue, InMemoryStore, Job, JobHandler, JobQueue, MailDispatcher, Message,
    MessageId, MessageStatus, SendJob, Store, Template, TemplateId, TenantId, SEND_JOB,
    WEBHOOK_QUEUE,
};

use common::MockTransport;

fn tenant() -> TenantId {
    TenantId::new("t1")
}

fn sample_message() -> Message {
    Message::new(
        tenant(),
        Address::new("no-reply@acme.test"),
        Address::new("user@example.com"),
        "Welcome",
    )
    .with_text("Hello!")
}

struct Fixture {
    store: Arc<InMemoryStore>,
    queue: Arc<InMemoryQueue>,
    transport: Arc<MockTransport>,
    dispatcher: MailDispatcher,
}

fn fixture(transport: MockTransport) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryQueue::new());
    let transport = Arc::new(transport);
    let dispatcher = MailDispatcher::new(
        store.clone(),
        queue.clone(),
        transport.clone(),
        Duration::from_secs(5),
    );
    Fixture {
        store,
        queue,
        transport,
        dispatcher,
    }
}

fn send_job(message_id: &MessageId) -> Job {
    Job::new(
        SEND_JOB,
        &SendJob {
            message_id: message_id.clone(),
            tenant_id: tenant(),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn send_job_sends_and_records_lifecycle() {
    let f = fixture(MockTransport::new());
    let message = sample_message();
    let message_id = message.id.clone();
    f.store.insert_message(message).await.unwrap();

    f.dispatcher.handle(send_job(&message_id)).await.unwrap();

    // Transport saw the message once.
    let sent = f.transport.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Welcome");
    assert_eq!(sent[0].to.email, "user@example.com");
    drop(sent);

    // Status and provider metadata recorded.
    let stored = f.store.message(&tenant(), &message_id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Sent);
    assert_eq!(stored.provider.as_deref(), Some("mock"));
    assert_eq!(stored.provider_msg_id.as_deref(), Some("mock-1"));

    // One sent event, carrying provider metadata.
    let events = f.store.events_for_message(&tenant(), &message_id).await;
    assert_eq!(events.len(), 1);
    let payload = events[0].payload.as_ref().unwrap();
    assert_eq!(payload["provider"], "mock");
    assert_eq!(payload["providerMsgId"], "mock-1");

    // A deliver job pointing at that event landed on the webhook queue.
    let deliver = f.queue.reserve(WEBHOOK_QUEUE).await.unwrap().unwrap();
    assert_eq!(deliver.name, "deliver");
    assert_eq!(deliver.payload["eventId"], events[0].id.as_str());
}

#[tokio::test]
async fn missing_message_is_a_noop() {
    let f = fixture(MockTransport::new());

    f.dispatcher
        .handle(send_job(&MessageId::new("gone")))
        .await
        .unwrap();

    assert_eq!(f.transport.sent_count().await, 0);
}

#[tokio::test]
async fn duplicate_send_job_invokes_transport_once() {
    let f = fixture(MockTransport::new());
    let message = sample_message();
    let message_id = message.id.clone();
    f.store.insert_message(message).await.unwrap();

    f.dispatcher.handle(send_job(&message_id)).await.unwrap();
    f.dispatcher.handle(send_job(&message_id)).await.unwrap();

    assert_eq!(f.transport.sent_count().await, 1);
    let events = f.store.events_for_message(&tenant(), &message_id).await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn transport_failure_fails_job_and_leaves_message_queued() {
    let f = fixture(MockTransport::failing());
    let message = sample_message();
    let message_id = message.id.clone();
    f.store.insert_message(message).await.unwrap();

    let result = f.dispatcher.handle(send_job(&message_id)).await;
    assert!(result.is_err());

    let stored = f.store.message(&tenant(), &message_id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Queued);
    assert!(stored.provider.is_none());
    assert!(f.store.events_for_message(&tenant(), &message_id).await.is_empty());

    // Nothing was queued for fan-out.
    let no_job = tokio::time::timeout(
        Duration::from_millis(50),
        f.queue.reserve(WEBHOOK_QUEUE),
    )
    .await;
    assert!(no_job.is_err());
}

#[tokio::test]
async fn template_content_supersedes_literal_fields() {
    let f = fixture(MockTransport::new());
    f.store
        .insert_template(Template {
            id: TemplateId::new("welcome"),
            tenant_id: tenant(),
            subject: "Welcome {{name}}".to_string(),
            html: "<p>Hi {{name}}</p>".to_string(),
            text: Some("Hi {{name}}".to_string()),
        })
        .await
        .unwrap();

    let message = sample_message().with_template(
        TemplateId::new("welcome"),
        Some(serde_json::json!({"name": "Ada"})),
    );
    let message_id = message.id.clone();
    f.store.insert_message(message).await.unwrap();

    f.dispatcher.handle(send_job(&message_id)).await.unwrap();

    let sent = f.transport.sent.lock().await;
    assert_eq!(sent[0].subject, "Welcome Ada");
    assert_eq!(sent[0].html.as_deref(), Some("<p>Hi Ada</p>"));
    assert_eq!(sent[0].text.as_deref(), Some("Hi Ada"));
}

#[tokio::test]
async fn missing_template_falls_back_to_literal_fields() {
    let f = fixture(MockTransport::new());
    let message = sample_message().with_template(TemplateId::new("nope"), None);
    let message_id = message.id.clone();
    f.store.insert_message(message).await.unwrap();

    f.dispatcher.handle(send_job(&message_id)).await.unwrap();

    let sent = f.transport.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Welcome");
    assert_eq!(sent[0].text.as_deref(), Some("Hello!"));
}
