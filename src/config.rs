//! Process-wide configuration.
//!
//! All settings are loaded once at startup and immutable thereafter:
//! the queue connection, the mail transport selection, the shared webhook
//! signing secret, and the pipeline's worker/timeout knobs.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which mail transport the worker sends through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailTransportKind {
    /// SMTP to a local sink such as MailHog. Dev default, never the real world.
    #[default]
    SmtpSink,
    /// Accepts every send without doing anything.
    Noop,
}

impl FromStr for MailTransportKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smtp_sink" => Ok(MailTransportKind::SmtpSink),
            "noop" => Ok(MailTransportKind::Noop),
            _ => Err(()),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Queue broker connection string.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Store connection string, used when the worker runs with a
    /// persistent store backend.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Mail transport selection.
    #[serde(default)]
    pub mail_transport: MailTransportKind,

    /// SMTP sink host.
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    /// SMTP sink port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Shared per-deployment secret for webhook signatures.
    #[serde(default = "default_signing_secret")]
    pub webhook_signing_secret: String,

    /// Worker count for the `mail` queue.
    #[serde(default = "default_workers")]
    pub mail_workers: usize,

    /// Worker count for the `webhooks` queue.
    #[serde(default = "default_workers")]
    pub webhook_workers: usize,

    /// Upper bound on a single transport send, in seconds.
    #[serde(default = "default_mail_send_timeout")]
    pub mail_send_timeout_secs: u64,

    /// Upper bound on a single webhook delivery attempt, in seconds.
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,

    /// Key prefix for broker-backed queues.
    #[serde(default = "default_queue_prefix")]
    pub queue_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            database_url: default_database_url(),
            mail_transport: MailTransportKind::default(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            webhook_signing_secret: default_signing_secret(),
            mail_workers: default_workers(),
            webhook_workers: default_workers(),
            mail_send_timeout_secs: default_mail_send_timeout(),
            webhook_timeout_secs: default_webhook_timeout(),
            queue_prefix: default_queue_prefix(),
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(v) = env::var("REDIS_URL") {
            config.redis_url = v;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database_url = v;
        }
        if let Ok(v) = env::var("MAIL_TRANSPORT") {
            config.mail_transport = v.parse().map_err(|_| ConfigError::Invalid {
                var: "MAIL_TRANSPORT".to_string(),
                value: v,
            })?;
        }
        if let Ok(v) = env::var("SMTP_HOST") {
            config.smtp_host = v;
        }
        if let Ok(v) = env::var("SMTP_PORT") {
            config.smtp_port = parse_var("SMTP_PORT", &v)?;
        }
        if let Ok(v) = env::var("WEBHOOK_SIGNING_SECRET") {
            config.webhook_signing_secret = v;
        }
        if let Ok(v) = env::var("MAIL_WORKERS") {
            config.mail_workers = parse_var("MAIL_WORKERS", &v)?;
        }
        if let Ok(v) = env::var("WEBHOOK_WORKERS") {
            config.webhook_workers = parse_var("WEBHOOK_WORKERS", &v)?;
        }
        if let Ok(v) = env::var("MAIL_SEND_TIMEOUT_SECS") {
            config.mail_send_timeout_secs = parse_var("MAIL_SEND_TIMEOUT_SECS", &v)?;
        }
        if let Ok(v) = env::var("WEBHOOK_TIMEOUT_SECS") {
            config.webhook_timeout_secs = parse_var("WEBHOOK_TIMEOUT_SECS", &v)?;
        }
        if let Ok(v) = env::var("QUEUE_PREFIX") {
            config.queue_prefix = v;
        }

        Ok(config)
    }

    pub fn mail_send_timeout(&self) -> Duration {
        Duration::from_secs(self.mail_send_timeout_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

fn parse_var<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost/maildog".to_string()
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    1025
}

fn default_signing_secret() -> String {
    "REPLACE_ME".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_mail_send_timeout() -> u64 {
    10
}

fn default_webhook_timeout() -> u64 {
    5
}

fn default_queue_prefix() -> String {
    "maildog".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dev_sink_deployment() {
        let config = Config::default();
        assert_eq!(config.mail_transport, MailTransportKind::SmtpSink);
        assert_eq!(config.smtp_port, 1025);
        assert_eq!(config.queue_prefix, "maildog");
        assert_eq!(config.webhook_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn transport_kind_parses_known_values() {
        assert_eq!("noop".parse(), Ok(MailTransportKind::Noop));
        assert_eq!("smtp_sink".parse(), Ok(MailTransportKind::SmtpSink));
        assert!("sendgrid".parse::<MailTransportKind>().is_err());
    }
}
