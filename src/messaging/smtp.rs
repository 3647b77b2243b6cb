//! SMTP message bus via lettre.
//!
//! Queue messages go to their recipient. Topic messages go to the
//! configured back-office address.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use super::{MessageBus, OutboundMessage};
use crate::config::SmtpConfig;
use crate::error::CollaboratorError;

const SERVICE: &str = "smtp";

pub struct SmtpMessageBus {
    config: SmtpConfig,
}

impl SmtpMessageBus {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Build the lettre message for `to`.
    fn build(&self, to: &str, message: &OutboundMessage) -> Result<Message, CollaboratorError> {
        Message::builder()
            .from(self.config.from_address.parse().map_err(|e| {
                CollaboratorError::Rejected {
                    service: SERVICE.into(),
                    reason: format!("Invalid from address: {e}"),
                }
            })?)
            .to(to.parse().map_err(|e| CollaboratorError::Rejected {
                service: SERVICE.into(),
                reason: format!("Invalid to address: {e}"),
            })?)
            .subject(message.subject())
            .body(message.body())
            .map_err(|e| CollaboratorError::Rejected {
                service: SERVICE.into(),
                reason: format!("Failed to build email: {e}"),
            })
    }

    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<(), CollaboratorError> {
        let email = self.build(to, message)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || {
            let creds = Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            );
            let transport = SmtpTransport::relay(&config.host)
                .map_err(|e| {
                    CollaboratorError::request_failed(SERVICE, format!("SMTP relay error: {e}"))
                })?
                .port(config.port)
                .credentials(creds)
                .build();
            transport
                .send(&email)
                .map_err(|e| CollaboratorError::request_failed(SERVICE, format!("SMTP send failed: {e}")))
        })
        .await
        .map_err(|e| CollaboratorError::request_failed(SERVICE, format!("send task failed: {e}")))??;

        tracing::info!(template = message.template(), "Email sent to {to}");
        Ok(())
    }
}

#[async_trait]
impl MessageBus for SmtpMessageBus {
    async fn send_to_queue(
        &self,
        queue: &str,
        message: &OutboundMessage,
    ) -> Result<(), CollaboratorError> {
        let to = message.recipient().ok_or_else(|| CollaboratorError::Rejected {
            service: SERVICE.into(),
            reason: format!("{} has no recipient for queue {queue}", message.template()),
        })?;
        self.send(to, message).await
    }

    async fn send_to_topic(
        &self,
        topic: &str,
        message: &OutboundMessage,
    ) -> Result<(), CollaboratorError> {
        tracing::debug!(topic, template = message.template(), "Publishing to back office");
        let to = self.config.back_office_address.clone();
        self.send(&to, message).await
    }
}
