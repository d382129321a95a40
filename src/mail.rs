//! Mail transport abstraction and adapters.
//!
//! A transport delivers one rendered message to a provider and reports the
//! provider's name plus an optional provider-assigned message id. Transports
//! know nothing about queues or the store; the selection happens once at
//! startup from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, MailTransportKind};
use crate::error::SendError;
use crate::types::Address;

/// Input to a transport send.
#[derive(Debug, Clone, PartialEq)]
pub struct SendMail {
    pub from: Address,
    pub to: Address,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

/// Result of a successful transport send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub provider: String,
    pub provider_msg_id: Option<String>,
}

/// A mail provider backend.
#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, mail: SendMail) -> Result<SendOutcome, SendError>;
}

/// Accepts every send without doing anything.
pub struct NoopTransport;

#[async_trait]
impl MailTransport for NoopTransport {
    fn name(&self) -> &str {
        "noop"
    }

    async fn send(&self, _mail: SendMail) -> Result<SendOutcome, SendError> {
        Ok(SendOutcome {
            provider: self.name().to_string(),
            provider_msg_id: None,
        })
    }
}

/// Build the configured transport.
///
/// Future real-provider adapters (SES, SendGrid, Mailgun) slot in here.
pub fn transport_from_config(config: &Config) -> Arc<dyn MailTransport> {
    match config.mail_transport {
        MailTransportKind::Noop => Arc::new(NoopTransport),
        MailTransportKind::SmtpSink => {
            #[cfg(feature = "smtp")]
            {
                Arc::new(smtp_sink::SmtpSinkTransport::new(config))
            }
            #[cfg(not(feature = "smtp"))]
            {
                tracing::warn!("smtp feature not enabled, using noop transport");
                Arc::new(NoopTransport)
            }
        }
    }
}

#[cfg(feature = "smtp")]
pub use smtp_sink::SmtpSinkTransport;

#[cfg(feature = "smtp")]
mod smtp_sink {
    use lettre::message::{Mailbox, MultiPart, SinglePart};
    use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

    use super::*;

    /// SMTP to a local sink (e.g. MailHog). Dev adapter, never the real world.
    pub struct SmtpSinkTransport {
        transport: AsyncSmtpTransport<Tokio1Executor>,
    }

    impl SmtpSinkTransport {
        pub fn new(config: &Config) -> Self {
            // Plaintext, unauthenticated: the sink runs next door.
            let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                config.smtp_host.as_str(),
            )
            .port(config.smtp_port)
            .timeout(Some(config.mail_send_timeout()))
            .build();

            Self { transport }
        }
    }

    #[async_trait]
    impl MailTransport for SmtpSinkTransport {
        fn name(&self) -> &str {
            "smtp_sink"
        }

        async fn send(&self, mail: SendMail) -> Result<SendOutcome, SendError> {
            if let Some(headers) = &mail.headers {
                // Raw header passthrough is not supported by this adapter.
                tracing::debug!(count = headers.len(), "skipping custom headers for smtp sink");
            }

            let message = build_message(&mail)?;
            let response = self
                .transport
                .send(message)
                .await
                .map_err(|e| SendError::Transport {
                    transport: self.name().to_string(),
                    message: e.to_string(),
                })?;

            let provider_msg_id = response.message().next().map(str::to_string);
            Ok(SendOutcome {
                provider: self.name().to_string(),
                provider_msg_id,
            })
        }
    }

    fn build_message(mail: &SendMail) -> Result<lettre::Message, SendError> {
        let builder = lettre::Message::builder()
            .from(mailbox(&mail.from)?)
            .to(mailbox(&mail.to)?)
            .subject(mail.subject.clone());

        let result = match (mail.text.clone(), mail.html.clone()) {
            (Some(text), Some(html)) => {
                builder.multipart(MultiPart::alternative_plain_html(text, html))
            }
            (Some(text), None) => builder.singlepart(SinglePart::plain(text)),
            (None, Some(html)) => builder.singlepart(SinglePart::html(html)),
            (None, None) => builder.singlepart(SinglePart::plain(String::new())),
        };

        result.map_err(|e| SendError::Transport {
            transport: "smtp_sink".to_string(),
            message: e.to_string(),
        })
    }

    fn mailbox(address: &Address) -> Result<Mailbox, SendError> {
        let parsed = address
            .email
            .parse::<lettre::Address>()
            .map_err(|_| SendError::InvalidAddress(address.email.clone()))?;
        Ok(Mailbox::new(address.name.clone(), parsed))
    }
}
