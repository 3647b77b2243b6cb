//! Onboarding step state machine. Tracks how far each actor has got.
//!
//! Each actor type has its own ordered step enumeration ending in a
//! terminal `ProfileComplete`. Steps only move forward: a request for an
//! earlier or equal step leaves the recorded step alone, and an `Edit`
//! request never touches it.

use serde::{Deserialize, Serialize};

use crate::profile::model::Account;

/// Behaviour shared by the per-actor step enumerations.
pub trait OnboardingStep:
    Copy + Ord + Default + std::fmt::Debug + std::fmt::Display + Send + Sync + 'static
{
    /// The step that marks onboarding as finished.
    const TERMINAL: Self;

    fn is_terminal(&self) -> bool {
        *self == Self::TERMINAL
    }
}

/// Customer steps: Registered → PersonalDetails → Address → Languages →
/// ProfileComplete.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStep {
    #[default]
    Registered,
    PersonalDetails,
    Address,
    Languages,
    ProfileComplete,
}

/// Dealer steps: Registered → BusinessDetails → Brands → JobCategories →
/// Locations → ProfileComplete.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DealerStep {
    #[default]
    Registered,
    BusinessDetails,
    Brands,
    JobCategories,
    Locations,
    ProfileComplete,
}

/// Expert steps: Registered → PersonalDetails → Skills → Languages →
/// ProfileComplete.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExpertStep {
    #[default]
    Registered,
    PersonalDetails,
    Skills,
    Languages,
    ProfileComplete,
}

impl OnboardingStep for CustomerStep {
    const TERMINAL: Self = Self::ProfileComplete;
}

impl OnboardingStep for DealerStep {
    const TERMINAL: Self = Self::ProfileComplete;
}

impl OnboardingStep for ExpertStep {
    const TERMINAL: Self = Self::ProfileComplete;
}

impl std::fmt::Display for CustomerStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Registered => "registered",
            Self::PersonalDetails => "personal_details",
            Self::Address => "address",
            Self::Languages => "languages",
            Self::ProfileComplete => "profile_complete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for DealerStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Registered => "registered",
            Self::BusinessDetails => "business_details",
            Self::Brands => "brands",
            Self::JobCategories => "job_categories",
            Self::Locations => "locations",
            Self::ProfileComplete => "profile_complete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ExpertStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Registered => "registered",
            Self::PersonalDetails => "personal_details",
            Self::Skills => "skills",
            Self::Languages => "languages",
            Self::ProfileComplete => "profile_complete",
        };
        write!(f, "{s}")
    }
}

/// What the caller wants to happen to the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "step", rename_all = "snake_case")]
pub enum StepRequest<S> {
    /// Patch fields only; the step is not touched.
    Edit,
    /// Record `S` as completed if it is ahead of the current step.
    Advance(S),
}

/// Outcome of applying a step request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome<S> {
    pub step: S,
    /// Whether the recorded step moved.
    pub advanced: bool,
    /// Whether onboarding became complete with this request (edge).
    pub completed_now: bool,
}

/// Apply `request` to `current`, never moving backwards.
pub fn next_step<S: OnboardingStep>(current: S, request: StepRequest<S>) -> S {
    match request {
        StepRequest::Advance(requested) if requested > current => requested,
        _ => current,
    }
}

/// Apply a step request to an actor's step and recompute the account's
/// completion flag. `completed_now` is only true on the false → true flip.
pub fn apply_step<S: OnboardingStep>(
    step: &mut S,
    account: &mut Account,
    request: StepRequest<S>,
) -> StepOutcome<S> {
    let before = *step;
    *step = next_step(before, request);

    let was_complete = account.onboarding_complete;
    account.onboarding_complete = step.is_terminal();

    StepOutcome {
        step: *step,
        advanced: *step != before,
        completed_now: !was_complete && account.onboarding_complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::model::Role;

    fn account() -> Account {
        Account::new("Dee", "Ler", "dealer@example.com", Role::Dealer)
    }

    #[test]
    fn steps_are_ordered_by_declaration() {
        use DealerStep::*;
        let ordered = [
            Registered,
            BusinessDetails,
            Brands,
            JobCategories,
            Locations,
            ProfileComplete,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{} should precede {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_steps() {
        assert!(CustomerStep::ProfileComplete.is_terminal());
        assert!(DealerStep::ProfileComplete.is_terminal());
        assert!(ExpertStep::ProfileComplete.is_terminal());
        assert!(!DealerStep::Locations.is_terminal());
        assert!(!ExpertStep::Registered.is_terminal());
    }

    #[test]
    fn advance_moves_forward_only() {
        use ExpertStep::*;
        assert_eq!(next_step(Registered, StepRequest::Advance(Skills)), Skills);
        assert_eq!(next_step(Skills, StepRequest::Advance(PersonalDetails)), Skills);
        assert_eq!(next_step(Skills, StepRequest::Advance(Skills)), Skills);
        assert_eq!(next_step(Skills, StepRequest::Edit), Skills);
    }

    #[test]
    fn non_decreasing_requests_never_regress() {
        use CustomerStep::*;
        let requests = [
            StepRequest::Advance(PersonalDetails),
            StepRequest::Advance(Registered),
            StepRequest::Edit,
            StepRequest::Advance(Languages),
            StepRequest::Advance(Address),
            StepRequest::Advance(Languages),
        ];
        let mut current = CustomerStep::default();
        for request in requests {
            let next = next_step(current, request);
            assert!(next >= current);
            current = next;
        }
        assert_eq!(current, Languages);
    }

    #[test]
    fn completion_is_edge_triggered() {
        let mut account = account();
        let mut step = DealerStep::Locations;

        let first = apply_step(
            &mut step,
            &mut account,
            StepRequest::Advance(DealerStep::ProfileComplete),
        );
        assert!(first.advanced);
        assert!(first.completed_now);
        assert!(account.onboarding_complete);

        for request in [
            StepRequest::Advance(DealerStep::ProfileComplete),
            StepRequest::Edit,
            StepRequest::Advance(DealerStep::Brands),
        ] {
            let again = apply_step(&mut step, &mut account, request);
            assert!(!again.completed_now);
            assert!(account.onboarding_complete);
            assert_eq!(step, DealerStep::ProfileComplete);
        }
    }

    #[test]
    fn edit_keeps_step_and_completion() {
        let mut account = account();
        let mut step = DealerStep::Brands;
        let outcome = apply_step(&mut step, &mut account, StepRequest::Edit);
        assert_eq!(outcome.step, DealerStep::Brands);
        assert!(!outcome.advanced);
        assert!(!account.onboarding_complete);
    }

    #[test]
    fn display_matches_serde() {
        use DealerStep::*;
        for step in [
            Registered,
            BusinessDetails,
            Brands,
            JobCategories,
            Locations,
            ProfileComplete,
        ] {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json, "mismatch for {step:?}");
        }
    }

    #[test]
    fn step_request_serde() {
        let edit: StepRequest<CustomerStep> = serde_json::from_str(r#"{"mode":"edit"}"#).unwrap();
        assert_eq!(edit, StepRequest::Edit);

        let advance: StepRequest<CustomerStep> =
            serde_json::from_str(r#"{"mode":"advance","step":"address"}"#).unwrap();
        assert_eq!(advance, StepRequest::Advance(CustomerStep::Address));
    }
}
