//! Registration and password-reset flows over cached sessions.
//!
//! Lifecycle: `Created → OtpIssued → Verified → Consumed`. Expiry is the
//! cache TTL; an expired session reads as absent and fails with
//! `InvalidSession`.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::cache::{Cache, RefreshTokens};
use crate::collaborators::IdentityProvider;
use crate::config::SessionConfig;
use crate::error::{DatabaseError, Entity, Error, Result, RuleViolation};
use crate::messaging::{self, EMAIL_QUEUE, MessageBus, OutboundMessage, Route};
use crate::profile::model::{Account, Customer, Dealer, Expert, Role};
use crate::store::{NewActor, ProfileStore};

use super::model::{RegistrationPayload, Session, SessionKind, session_key};
use super::otp::{self, Clock, SystemClock};

/// Everything the session workflow talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub cache: Arc<dyn Cache>,
    pub bus: Arc<dyn MessageBus>,
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn ProfileStore>,
}

pub struct SessionWorkflow {
    cache: Arc<dyn Cache>,
    bus: Arc<dyn MessageBus>,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn ProfileStore>,
    tokens: RefreshTokens,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl SessionWorkflow {
    pub fn new(deps: SessionDeps, config: SessionConfig) -> Self {
        Self::with_clock(deps, config, Arc::new(SystemClock))
    }

    pub fn with_clock(deps: SessionDeps, config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: RefreshTokens::new(Arc::clone(&deps.cache)),
            cache: deps.cache,
            bus: deps.bus,
            identity: deps.identity,
            store: deps.store,
            clock,
            config,
        }
    }

    // ── Cache plumbing ──────────────────────────────────────────────

    async fn load(&self, session_id: &str) -> Result<Session> {
        let bytes = self
            .cache
            .get(&session_key(session_id))
            .await?
            .ok_or(RuleViolation::InvalidSession)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let bytes = serde_json::to_vec(session)?;
        self.cache
            .set(&session.key(), bytes, Some(self.config.ttl()))
            .await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.cache.remove(&session_key(session_id)).await?;
        Ok(())
    }

    async fn ensure_email_free(&self, email: &str) -> Result<()> {
        if self.store.find_account_by_email(email).await?.is_some() {
            return Err(RuleViolation::DuplicateEmail {
                email: email.to_string(),
            }
            .into());
        }
        Ok(())
    }

    // ── Registration ────────────────────────────────────────────────

    /// Start a registration session. Returns the opaque session id.
    pub async fn create_session(&self, mut payload: RegistrationPayload) -> Result<String> {
        if !payload.terms_accepted {
            return Err(RuleViolation::TermsNotAccepted.into());
        }
        payload.email = normalize_email(&payload.email);
        self.ensure_email_free(&payload.email).await?;

        let session = Session::registration(payload, self.clock.now());
        self.save(&session).await?;
        info!(session_id = %session.id, kind = session.kind_str(), "Session created");
        Ok(session.id)
    }

    /// Return the buffered payload of a verified registration session.
    /// The session stays in the cache until the actor has been created.
    pub async fn consume_for_registration(&self, session_id: &str) -> Result<RegistrationPayload> {
        let session = self.load(session_id).await?;
        match session.kind {
            SessionKind::Registration {
                verified: true,
                payload,
            } => Ok(payload),
            SessionKind::Registration { verified: false, .. } => {
                Err(RuleViolation::EmailNotVerified.into())
            }
            SessionKind::PasswordReset { .. } => Err(RuleViolation::InvalidSession.into()),
        }
    }

    /// Turn a verified registration session into an account and actor.
    pub async fn complete_registration(
        &self,
        session_id: &str,
        password: SecretString,
    ) -> Result<Account> {
        let payload = self.consume_for_registration(session_id).await?;
        self.ensure_email_free(&payload.email).await?;

        let mut account = Account::new(
            payload.first_name.trim(),
            payload.last_name.trim(),
            payload.email.as_str(),
            payload.role,
        );
        account.phone_number = payload
            .phone_number
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let actor = match payload.role {
            Role::Customer => NewActor::Customer(Customer::new(account.clone())),
            Role::Dealer => NewActor::Dealer(Dealer::new(account.clone())),
            Role::Expert => NewActor::Expert(Expert::new(account.clone())),
        };

        match self.store.create_actor(&actor).await {
            Ok(()) => {}
            Err(DatabaseError::Constraint(reason)) => {
                warn!(email = %account.email, %reason, "Account created concurrently");
                return Err(RuleViolation::DuplicateEmail {
                    email: account.email,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        // The login is created last; the account row is rolled back if it fails.
        if let Err(e) = self
            .identity
            .create_user(&account, &password, payload.role)
            .await
        {
            warn!(account_id = %account.id, error = %e, "Identity user creation failed");
            self.store.delete_actor(account.id).await?;
            return Err(e.into());
        }

        self.delete(session_id).await?;
        info!(
            account_id = %account.id,
            role = account.role.as_str(),
            "Registration completed"
        );
        Ok(account)
    }

    // ── Password reset ──────────────────────────────────────────────

    /// Start a password-reset session for an existing account.
    pub async fn start_password_reset(&self, email: &str) -> Result<String> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_account_by_email(&email)
            .await?
            .ok_or_else(|| Error::not_found(Entity::Account, &email))?;

        let session =
            Session::password_reset(account.id, email, account.first_name, self.clock.now());
        self.save(&session).await?;
        info!(session_id = %session.id, account_id = %account.id, "Password reset started");
        Ok(session.id)
    }

    /// Apply a new password once the reset OTP has been verified.
    pub async fn consume_for_password_reset(
        &self,
        session_id: &str,
        new_password: SecretString,
    ) -> Result<()> {
        let session = self.load(session_id).await?;
        let SessionKind::PasswordReset {
            account_id,
            otp_verified,
            ..
        } = session.kind
        else {
            return Err(RuleViolation::InvalidSession.into());
        };
        if !otp_verified {
            return Err(Error::Unauthorized(
                "password reset OTP not verified".to_string(),
            ));
        }

        self.identity
            .reset_password(&session.email, &new_password)
            .await?;
        self.delete(session_id).await?;
        let revoked = self.tokens.revoke(account_id).await?;
        info!(%account_id, revoked, "Password reset completed");
        Ok(())
    }

    // ── OTP ─────────────────────────────────────────────────────────

    /// Issue a fresh OTP and email it. The code is never returned.
    pub async fn issue_otp(&self, session_id: &str) -> Result<()> {
        let mut session = self.load(session_id).await?;
        let now = self.clock.now();

        let remaining = session
            .otp_issued_at
            .and_then(|issued_at| otp::cooldown_remaining(issued_at, now, self.config.otp_cooldown));
        if let Some(remaining_secs) = remaining {
            debug!(session_id, remaining_secs, "OTP requested during cooldown");
            return Err(RuleViolation::OtpCoolDown { remaining_secs }.into());
        }

        let code = otp::generate_otp(self.config.otp_length);
        session.otp = Some(code.clone());
        session.otp_issued_at = Some(now);
        self.save(&session).await?;

        let validity_minutes = (self.config.otp_validity.as_secs() / 60) as i64;
        let message = match &session.kind {
            SessionKind::Registration { .. } => OutboundMessage::RegistrationOtp {
                to: session.email.clone(),
                first_name: session.first_name().to_string(),
                otp: code,
                validity_minutes,
            },
            SessionKind::PasswordReset { .. } => OutboundMessage::PasswordResetOtp {
                to: session.email.clone(),
                first_name: session.first_name().to_string(),
                otp: code,
                validity_minutes,
            },
        };
        messaging::dispatch(Arc::clone(&self.bus), Route::Queue(EMAIL_QUEUE), message);

        info!(session_id, kind = session.kind_str(), "OTP issued");
        Ok(())
    }

    /// Check a submitted OTP and mark the session verified.
    pub async fn verify_otp(&self, session_id: &str, submitted: &str) -> Result<()> {
        let mut session = self.load(session_id).await?;

        let (Some(expected), Some(issued_at)) = (session.otp.as_deref(), session.otp_issued_at)
        else {
            return Err(RuleViolation::InvalidOtp.into());
        };
        if expected != submitted {
            debug!(session_id, "OTP mismatch");
            return Err(RuleViolation::InvalidOtp.into());
        }
        if otp::is_expired(issued_at, self.clock.now(), self.config.otp_validity) {
            debug!(session_id, "OTP expired");
            return Err(RuleViolation::OtpExpired.into());
        }

        session.mark_verified();
        self.save(&session).await?;
        info!(session_id, kind = session.kind_str(), "OTP verified");
        Ok(())
    }
}
