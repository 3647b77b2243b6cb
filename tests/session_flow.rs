//! Registration and password-reset sessions driven through a manual clock.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use secrecy::SecretString;

use actor_onboarding::cache::{Cache, RefreshTokens};
use actor_onboarding::error::{Entity, Error, RuleViolation};
use actor_onboarding::messaging::{EMAIL_QUEUE, OutboundMessage};
use actor_onboarding::profile::Role;
use actor_onboarding::session::RegistrationPayload;
use actor_onboarding::store::ProfileStore;

use common::Harness;

fn payload(email: &str, role: Role) -> RegistrationPayload {
    RegistrationPayload {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: email.into(),
        phone_number: Some("555-0100".into()),
        role,
        terms_accepted: true,
    }
}

fn password(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn rule(err: &Error) -> &RuleViolation {
    err.rule()
        .unwrap_or_else(|| panic!("expected a rule violation, got {err:?}"))
}

#[tokio::test]
async fn registration_end_to_end() {
    let h = Harness::new().await;
    let sessions = h.sessions();

    let id = sessions
        .create_session(payload("Ada@Example.com", Role::Dealer))
        .await
        .unwrap();
    sessions.issue_otp(&id).await.unwrap();

    let sent = h.bus.wait_for(1).await;
    assert_eq!(sent[0].0, format!("queue:{EMAIL_QUEUE}"));
    match &sent[0].1 {
        OutboundMessage::RegistrationOtp {
            to,
            first_name,
            otp,
            validity_minutes,
        } => {
            assert_eq!(to, "ada@example.com");
            assert_eq!(first_name, "Ada");
            assert_eq!(otp.len(), 6);
            assert_eq!(*validity_minutes, 10);
        }
        other => panic!("unexpected message {other:?}"),
    }
    let otp = h.bus.last_otp(1).await;

    let err = sessions
        .consume_for_registration(&id)
        .await
        .unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::EmailNotVerified);

    sessions.verify_otp(&id, &otp).await.unwrap();
    let buffered = sessions.consume_for_registration(&id).await.unwrap();
    assert_eq!(buffered.email, "ada@example.com");

    let account = sessions
        .complete_registration(&id, password("correct horse"))
        .await
        .unwrap();
    assert_eq!(account.first_name, "Ada");
    assert_eq!(account.role, Role::Dealer);
    assert_eq!(account.phone_number.as_deref(), Some("555-0100"));
    assert!(!account.onboarding_complete);

    let dealer = h
        .store
        .get_dealer_by_account(account.id)
        .await
        .unwrap()
        .unwrap();
    assert!(dealer.business.is_none());
    assert_eq!(
        h.identity.users.lock().unwrap().clone(),
        vec![("ada@example.com".to_string(), Role::Dealer)]
    );

    let err = sessions.issue_otp(&id).await.unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::InvalidSession);
}

#[tokio::test]
async fn terms_must_be_accepted() {
    let h = Harness::new().await;
    let mut request = payload("terms@example.com", Role::Customer);
    request.terms_accepted = false;

    let err = h.sessions().create_session(request).await.unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::TermsNotAccepted);
}

#[tokio::test]
async fn registered_email_cannot_start_again() {
    let h = Harness::new().await;
    h.customer("taken@example.com").await;

    let err = h
        .sessions()
        .create_session(payload("TAKEN@example.com", Role::Expert))
        .await
        .unwrap_err();
    assert_eq!(
        rule(&err),
        &RuleViolation::DuplicateEmail {
            email: "taken@example.com".into()
        }
    );
}

#[tokio::test]
async fn email_taken_while_session_was_open() {
    let h = Harness::new().await;
    let sessions = h.sessions();

    let id = sessions
        .create_session(payload("race@example.com", Role::Customer))
        .await
        .unwrap();
    sessions.issue_otp(&id).await.unwrap();
    let otp = h.bus.last_otp(1).await;
    sessions.verify_otp(&id, &otp).await.unwrap();

    h.customer("race@example.com").await;
    let err = sessions
        .complete_registration(&id, password("pw"))
        .await
        .unwrap_err();
    assert!(matches!(
        rule(&err),
        RuleViolation::DuplicateEmail { .. }
    ));
    assert!(h.identity.users.lock().unwrap().is_empty());
}

#[tokio::test]
async fn otp_reissue_respects_cooldown() {
    let h = Harness::new().await;
    let sessions = h.sessions();
    let id = sessions
        .create_session(payload("cool@example.com", Role::Customer))
        .await
        .unwrap();

    sessions.issue_otp(&id).await.unwrap();
    h.clock.advance(Duration::from_secs(15));
    let err = sessions.issue_otp(&id).await.unwrap_err();
    assert_eq!(
        rule(&err),
        &RuleViolation::OtpCoolDown { remaining_secs: 45 }
    );

    h.clock.advance(Duration::from_secs(45));
    sessions.issue_otp(&id).await.unwrap();
    assert_eq!(h.bus.wait_for(2).await.len(), 2);
}

#[tokio::test]
async fn reissued_otp_replaces_the_old_one() {
    let h = Harness::new().await;
    let sessions = h.sessions();
    let id = sessions
        .create_session(payload("swap@example.com", Role::Customer))
        .await
        .unwrap();

    sessions.issue_otp(&id).await.unwrap();
    let first = h.bus.last_otp(1).await;
    h.clock.advance(Duration::from_secs(61));
    sessions.issue_otp(&id).await.unwrap();
    let second = h.bus.last_otp(2).await;

    if first != second {
        let err = sessions.verify_otp(&id, &first).await.unwrap_err();
        assert_eq!(rule(&err), &RuleViolation::InvalidOtp);
    }
    sessions.verify_otp(&id, &second).await.unwrap();
}

#[tokio::test]
async fn wrong_and_expired_codes_are_rejected() {
    let h = Harness::new().await;
    let sessions = h.sessions();
    let id = sessions
        .create_session(payload("late@example.com", Role::Customer))
        .await
        .unwrap();

    let err = sessions.verify_otp(&id, "123456").await.unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::InvalidOtp, "no OTP issued yet");

    sessions.issue_otp(&id).await.unwrap();
    let otp = h.bus.last_otp(1).await;
    let wrong = if otp == "000000" { "111111" } else { "000000" };
    let err = sessions.verify_otp(&id, wrong).await.unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::InvalidOtp);

    h.clock.advance(Duration::from_secs(11 * 60));
    let err = sessions.verify_otp(&id, &otp).await.unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::OtpExpired);

    let err = sessions
        .complete_registration(&id, password("pw"))
        .await
        .unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::EmailNotVerified);
}

#[tokio::test]
async fn unknown_session_is_invalid() {
    let h = Harness::new().await;
    let sessions = h.sessions();

    let err = sessions.issue_otp("no-such-session").await.unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::InvalidSession);
    let err = sessions
        .verify_otp("no-such-session", "123456")
        .await
        .unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::InvalidSession);
}

#[tokio::test]
async fn password_reset_requires_verified_otp_and_revokes_refresh_token() {
    let h = Harness::new().await;
    let account_id = h.customer("reset@example.com").await;
    let cache: Arc<dyn Cache> = h.cache.clone();
    let tokens = RefreshTokens::new(cache);
    tokens.store(account_id, "refresh-abc").await.unwrap();

    let sessions = h.sessions();
    let id = sessions
        .start_password_reset("Reset@Example.com")
        .await
        .unwrap();

    let err = sessions
        .consume_for_password_reset(&id, password("new-pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    sessions.issue_otp(&id).await.unwrap();
    let sent = h.bus.wait_for(1).await;
    assert!(matches!(
        &sent[0].1,
        OutboundMessage::PasswordResetOtp { first_name, .. } if first_name == "Cus"
    ));
    let otp = h.bus.last_otp(1).await;

    // A reset session cannot be used to register.
    let err = sessions
        .complete_registration(&id, password("pw"))
        .await
        .unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::InvalidSession);

    sessions.verify_otp(&id, &otp).await.unwrap();
    sessions
        .consume_for_password_reset(&id, password("new-pw"))
        .await
        .unwrap();

    assert_eq!(
        h.identity.resets.lock().unwrap().clone(),
        vec![("reset@example.com".to_string(), "new-pw".to_string())]
    );
    assert_eq!(tokens.get(account_id).await.unwrap(), None);

    let err = sessions
        .consume_for_password_reset(&id, password("again"))
        .await
        .unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::InvalidSession);
}

#[tokio::test]
async fn password_reset_for_unknown_email_is_not_found() {
    let h = Harness::new().await;
    let err = h
        .sessions()
        .start_password_reset("ghost@example.com")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound {
            entity: Entity::Account,
            ..
        }
    ));
}

#[tokio::test]
async fn registration_session_cannot_reset_a_password() {
    let h = Harness::new().await;
    let sessions = h.sessions();
    let id = sessions
        .create_session(payload("mixup@example.com", Role::Customer))
        .await
        .unwrap();

    let err = sessions
        .consume_for_password_reset(&id, password("pw"))
        .await
        .unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::InvalidSession);
}

#[tokio::test]
async fn identity_failure_rolls_back_the_account() {
    let h = Harness::new().await;
    let sessions = h.sessions();
    let id = sessions
        .create_session(payload("idp@example.com", Role::Expert))
        .await
        .unwrap();
    sessions.issue_otp(&id).await.unwrap();
    let otp = h.bus.last_otp(1).await;
    sessions.verify_otp(&id, &otp).await.unwrap();

    h.identity.fail_next.store(true, Ordering::SeqCst);
    let err = sessions
        .complete_registration(&id, password("pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Collaborator(_)), "got {err:?}");
    assert_eq!(
        h.store.find_account_by_email("idp@example.com").await.unwrap(),
        None
    );
    assert!(h.identity.users.lock().unwrap().is_empty());

    // The session survives, so the same registration can be retried.
    let account = sessions
        .complete_registration(&id, password("pw"))
        .await
        .unwrap();
    assert_eq!(account.email, "idp@example.com");
    assert!(
        h.store
            .get_expert_by_account(account.id)
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(h.identity.users.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn otp_must_match_exactly() {
    let h = Harness::new().await;
    let sessions = h.sessions();
    let id = sessions
        .create_session(payload("exact@example.com", Role::Customer))
        .await
        .unwrap();
    sessions.issue_otp(&id).await.unwrap();
    let otp = h.bus.last_otp(1).await;

    let err = sessions
        .verify_otp(&id, &format!(" {otp} "))
        .await
        .unwrap_err();
    assert_eq!(rule(&err), &RuleViolation::InvalidOtp);
    sessions.verify_otp(&id, &otp).await.unwrap();
}
