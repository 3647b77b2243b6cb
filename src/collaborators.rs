//! External collaborator seams.
//!
//! The core never talks to another system directly; it goes through these
//! traits. Reference adapters live in `clients`, `messaging` and `cache`.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CollaboratorError;
use crate::profile::catalog::ReferenceState;
use crate::profile::model::{Account, Customer, Dealer, Expert, Role};

/// A zip code resolved to its county.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedZip {
    pub state: String,
    pub county: String,
}

/// Geography and brand reference data. Read-only.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All states with their counties and zip codes.
    async fn reference_states(&self) -> Result<Vec<ReferenceState>, CollaboratorError>;

    /// Resolve a zip code to its county, or `None` if unknown.
    async fn resolve_zip(&self, zip_code: &str) -> Result<Option<ResolvedZip>, CollaboratorError>;

    /// Brand codes a dealer may select.
    async fn brand_codes(&self) -> Result<Vec<String>, CollaboratorError>;
}

/// A work order referencing a business location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: String,
    pub business_location_id: Uuid,
    pub status: String,
}

/// Work-order system. Read-only, batched.
#[async_trait]
pub trait WorkOrderLookup: Send + Sync {
    /// Active work orders for any of the given locations, in one call.
    async fn active_work_orders(
        &self,
        location_ids: &[Uuid],
    ) -> Result<Vec<WorkOrder>, CollaboratorError>;
}

/// Credential store. Treated as opaque.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a login for a new account.
    async fn create_user(
        &self,
        account: &Account,
        password: &SecretString,
        role: Role,
    ) -> Result<(), CollaboratorError>;

    /// Replace the password of an existing login.
    async fn reset_password(
        &self,
        email: &str,
        new_password: &SecretString,
    ) -> Result<(), CollaboratorError>;
}

/// Side effects fired once when an actor completes onboarding.
#[async_trait]
pub trait CompletionEffects: Send + Sync {
    /// Create the customer's external financial account. Returns its id.
    async fn create_customer_financial_account(
        &self,
        customer: &Customer,
    ) -> Result<String, CollaboratorError>;

    /// Create the dealer's external financial (payout) account. Returns its id.
    async fn create_dealer_financial_account(
        &self,
        dealer: &Dealer,
    ) -> Result<String, CollaboratorError>;

    /// Seed the external reminder records for a newly onboarded expert.
    async fn seed_expert_reminders(&self, expert: &Expert) -> Result<(), CollaboratorError>;
}
