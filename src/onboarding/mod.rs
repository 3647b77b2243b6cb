//! Onboarding: step tracking and profile updates for customers, dealers
//! and experts.
//!
//! A request carries a step instruction and a partial patch. The manager
//! merges the patch into the actor, reconciles keyed collections, checks
//! locations against reference data and the work-order system, advances
//! the step and fires completion effects once.

pub mod manager;
pub mod patch;
pub mod state;

pub use manager::{OnboardingDeps, OnboardingManager};
pub use patch::{
    AccountPatch, AddressPatch, BusinessPatch, CustomerPatch, CustomerRequest, DealerPatch,
    DealerRequest, ExpertPatch, ExpertRequest, LocationPatch, OnboardingRequest,
};
pub use state::{
    CustomerStep, DealerStep, ExpertStep, OnboardingStep, StepOutcome, StepRequest, apply_step,
    next_step,
};
