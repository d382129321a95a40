//! Worker process: runs both queue consumers until interrupted.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use maildog::{
    transport_from_config, Config, Consumer, JobQueue, MailDispatcher, Store, WebhookDispatcher,
    MAIL_QUEUE, WEBHOOK_QUEUE,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        transport = ?config.mail_transport,
        mail_workers = config.mail_workers,
        webhook_workers = config.webhook_workers,
        "starting maildog worker"
    );

    let queue = build_queue(&config)?;
    let store = build_store(&config).await?;
    let transport = transport_from_config(&config);

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    let mail = Arc::new(MailDispatcher::new(
        store.clone(),
        queue.clone(),
        transport,
        config.mail_send_timeout(),
    ));
    handles.extend(Consumer::spawn(
        queue.clone(),
        MAIL_QUEUE,
        mail,
        config.mail_workers,
        cancel.clone(),
    ));

    let webhooks = Arc::new(WebhookDispatcher::new(
        store,
        config.webhook_signing_secret.clone(),
        config.webhook_timeout(),
    ));
    handles.extend(Consumer::spawn(
        queue,
        WEBHOOK_QUEUE,
        webhooks,
        config.webhook_workers,
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining workers");
    cancel.cancel();

    for handle in handles {
        let _ = handle.await;
    }
    tracing::info!("worker stopped");
    Ok(())
}

#[cfg(feature = "redis")]
fn build_queue(config: &Config) -> Result<Arc<dyn JobQueue>, Box<dyn std::error::Error>> {
    let queue = maildog::RedisQueue::new(&config.redis_url, config.queue_prefix.clone())?;
    Ok(Arc::new(queue))
}

#[cfg(not(feature = "redis"))]
fn build_queue(_config: &Config) -> Result<Arc<dyn JobQueue>, Box<dyn std::error::Error>> {
    tracing::warn!("redis feature not enabled, using in-process queue");
    Ok(Arc::new(maildog::InMemoryQueue::new()))
}

#[cfg(feature = "postgres")]
async fn build_store(config: &Config) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    let store = maildog::PostgresStore::connect(&config.database_url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn build_store(_config: &Config) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::warn!("postgres feature not enabled, using in-memory store");
    Ok(Arc::new(maildog::InMemoryStore::new()))
}
