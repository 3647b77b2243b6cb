//! Registration and password-reset sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::model::Role;

/// Cache key for a session id.
pub fn session_key(id: &str) -> String {
    format!("session:{id}")
}

/// What a caller submits to start registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub terms_accepted: bool,
}

/// Variant-specific session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionKind {
    Registration {
        verified: bool,
        payload: RegistrationPayload,
    },
    PasswordReset {
        account_id: Uuid,
        first_name: String,
        otp_verified: bool,
    },
}

/// A cached session: shared envelope plus its variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub otp_issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: SessionKind,
}

impl Session {
    pub fn registration(payload: RegistrationPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            email: payload.email.clone(),
            otp: None,
            otp_issued_at: None,
            created_at: now,
            kind: SessionKind::Registration {
                verified: false,
                payload,
            },
        }
    }

    pub fn password_reset(
        account_id: Uuid,
        email: impl Into<String>,
        first_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            email: email.into(),
            otp: None,
            otp_issued_at: None,
            created_at: now,
            kind: SessionKind::PasswordReset {
                account_id,
                first_name: first_name.into(),
                otp_verified: false,
            },
        }
    }

    pub fn key(&self) -> String {
        session_key(&self.id)
    }

    /// Name used to greet the recipient of an OTP email.
    pub fn first_name(&self) -> &str {
        match &self.kind {
            SessionKind::Registration { payload, .. } => &payload.first_name,
            SessionKind::PasswordReset { first_name, .. } => first_name,
        }
    }

    pub fn is_verified(&self) -> bool {
        match self.kind {
            SessionKind::Registration { verified, .. } => verified,
            SessionKind::PasswordReset { otp_verified, .. } => otp_verified,
        }
    }

    /// Set the variant's verification flag.
    pub fn mark_verified(&mut self) {
        match &mut self.kind {
            SessionKind::Registration { verified, .. } => *verified = true,
            SessionKind::PasswordReset { otp_verified, .. } => *otp_verified = true,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self.kind {
            SessionKind::Registration { .. } => "registration",
            SessionKind::PasswordReset { .. } => "password_reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> RegistrationPayload {
        RegistrationPayload {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            phone_number: None,
            role: Role::Customer,
            terms_accepted: true,
        }
    }

    #[test]
    fn new_sessions_are_unverified_without_otp() {
        let session = Session::registration(payload(), Utc::now());
        assert!(!session.is_verified());
        assert!(session.otp.is_none());
        assert_eq!(session.email, "ada@example.com");
        assert_eq!(session.key(), format!("session:{}", session.id));
    }

    #[test]
    fn mark_verified_sets_the_variant_flag() {
        let mut reset = Session::password_reset(Uuid::new_v4(), "a@example.com", "Ada", Utc::now());
        reset.mark_verified();
        assert!(matches!(
            reset.kind,
            SessionKind::PasswordReset {
                otp_verified: true,
                ..
            }
        ));

        let mut registration = Session::registration(payload(), Utc::now());
        registration.mark_verified();
        assert!(matches!(
            registration.kind,
            SessionKind::Registration { verified: true, .. }
        ));
    }

    #[test]
    fn serialized_form_is_flat_and_tagged() {
        let session = Session::password_reset(Uuid::nil(), "a@example.com", "Ada", Utc::now());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["kind"], "password_reset");
        assert_eq!(json["otp_verified"], false);
        assert_eq!(json["email"], "a@example.com");

        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }
}
