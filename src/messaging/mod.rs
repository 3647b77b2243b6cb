//! Outbound messages and the message-bus seam.
//!
//! Sends are fire-and-forget: `dispatch` spawns the send onto the runtime
//! and only logs a failure. Callers never wait on delivery.

pub mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::CollaboratorError;

pub use smtp::SmtpMessageBus;

/// Queue carrying transactional emails.
pub const EMAIL_QUEUE: &str = "email-notifications";

/// Topic the back office subscribes to for new dealers.
pub const DEALER_SIGNUP_TOPIC: &str = "dealer-signup";

/// Every message this crate sends, one variant per template.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum OutboundMessage {
    RegistrationOtp {
        to: String,
        first_name: String,
        otp: String,
        validity_minutes: i64,
    },
    PasswordResetOtp {
        to: String,
        first_name: String,
        otp: String,
        validity_minutes: i64,
    },
    DealerSignup {
        business_name: String,
        dealer_name: String,
        dealer_email: String,
        phone_number: Option<String>,
    },
}

// OTPs must not end up in logs.
impl std::fmt::Debug for OutboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegistrationOtp { to, .. } | Self::PasswordResetOtp { to, .. } => f
                .debug_struct(self.template())
                .field("to", to)
                .field("otp", &"[REDACTED]")
                .finish(),
            Self::DealerSignup {
                business_name,
                dealer_email,
                ..
            } => f
                .debug_struct(self.template())
                .field("business_name", business_name)
                .field("dealer_email", dealer_email)
                .finish(),
        }
    }
}

impl OutboundMessage {
    pub fn template(&self) -> &'static str {
        match self {
            Self::RegistrationOtp { .. } => "registration_otp",
            Self::PasswordResetOtp { .. } => "password_reset_otp",
            Self::DealerSignup { .. } => "dealer_signup",
        }
    }

    /// Direct recipient, if the message is addressed to a person.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::RegistrationOtp { to, .. } | Self::PasswordResetOtp { to, .. } => Some(to),
            Self::DealerSignup { .. } => None,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::RegistrationOtp { .. } => "Verify your email address".to_string(),
            Self::PasswordResetOtp { .. } => "Reset your password".to_string(),
            Self::DealerSignup { business_name, .. } => {
                format!("New dealer signed up: {business_name}")
            }
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::RegistrationOtp {
                first_name,
                otp,
                validity_minutes,
                ..
            } => format!(
                "Hi {first_name},\n\nYour verification code is {otp}.\n\
                 It expires in {validity_minutes} minutes.\n"
            ),
            Self::PasswordResetOtp {
                first_name,
                otp,
                validity_minutes,
                ..
            } => format!(
                "Hi {first_name},\n\nUse the code {otp} to reset your password.\n\
                 It expires in {validity_minutes} minutes. If you did not ask for a reset, ignore this email.\n"
            ),
            Self::DealerSignup {
                business_name,
                dealer_name,
                dealer_email,
                phone_number,
            } => format!(
                "Business: {business_name}\nDealer: {dealer_name}\nEmail: {dealer_email}\nPhone: {}\n",
                phone_number.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// Where a message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Queue(&'static str),
    Topic(&'static str),
}

impl Route {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queue(name) | Self::Topic(name) => name,
        }
    }
}

/// Queue/topic transport. "Accepted" is all a successful send promises.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn send_to_queue(
        &self,
        queue: &str,
        message: &OutboundMessage,
    ) -> Result<(), CollaboratorError>;

    async fn send_to_topic(
        &self,
        topic: &str,
        message: &OutboundMessage,
    ) -> Result<(), CollaboratorError>;
}

/// Send in the background. Failures are logged, never returned.
pub fn dispatch(bus: Arc<dyn MessageBus>, route: Route, message: OutboundMessage) -> JoinHandle<()> {
    tokio::spawn(async move {
        let template = message.template();
        let result = match route {
            Route::Queue(queue) => bus.send_to_queue(queue, &message).await,
            Route::Topic(topic) => bus.send_to_topic(topic, &message).await,
        };
        match result {
            Ok(()) => tracing::debug!(route = route.name(), template, "Message accepted"),
            Err(e) => tracing::warn!(route = route.name(), template, error = %e, "Message dispatch failed"),
        }
    })
}
