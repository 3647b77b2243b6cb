//! `ProfileStore`: the single async interface for profile persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::profile::model::{Account, Customer, Dealer, Expert, FavouriteDealer};

/// A freshly registered actor, written together with its account.
#[derive(Debug, Clone)]
pub enum NewActor {
    Customer(Customer),
    Dealer(Dealer),
    Expert(Expert),
}

impl NewActor {
    pub fn account(&self) -> &Account {
        match self {
            Self::Customer(c) => &c.account,
            Self::Dealer(d) => &d.account,
            Self::Expert(e) => &e.account,
        }
    }

    /// Id of the actor row (not the account).
    pub fn actor_id(&self) -> Uuid {
        match self {
            Self::Customer(c) => c.id,
            Self::Dealer(d) => d.id,
            Self::Expert(e) => e.id,
        }
    }
}

/// Backend-agnostic persistence for accounts, actors, businesses and
/// favourites.
///
/// Every `save_*` writes the whole aggregate in one transaction. Keyed
/// children and locations are synced by id: rows whose id is no longer
/// present are deleted, the rest are upserted.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Accounts ────────────────────────────────────────────────────

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, DatabaseError>;

    /// Case-insensitive lookup.
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, DatabaseError>;

    /// Insert an account and its actor. A taken email fails with
    /// `DatabaseError::Constraint`.
    async fn create_actor(&self, actor: &NewActor) -> Result<(), DatabaseError>;

    /// Remove a freshly created account and its actor row. Returns whether
    /// an account was deleted.
    async fn delete_actor(&self, account_id: Uuid) -> Result<bool, DatabaseError>;

    // ── Actors ──────────────────────────────────────────────────────

    async fn get_customer_by_account(
        &self,
        account_id: Uuid,
    ) -> Result<Option<Customer>, DatabaseError>;

    async fn save_customer(&self, customer: &Customer) -> Result<(), DatabaseError>;

    async fn get_dealer_by_account(&self, account_id: Uuid)
    -> Result<Option<Dealer>, DatabaseError>;

    async fn save_dealer(&self, dealer: &Dealer) -> Result<(), DatabaseError>;

    async fn get_expert_by_account(&self, account_id: Uuid)
    -> Result<Option<Expert>, DatabaseError>;

    async fn save_expert(&self, expert: &Expert) -> Result<(), DatabaseError>;

    // ── Matching ────────────────────────────────────────────────────

    /// Ids of locations whose serviceable counties include `county`.
    async fn locations_serving_county(&self, county: &str) -> Result<Vec<Uuid>, DatabaseError>;

    /// Distinct dealers owning any of `location_ids`.
    async fn dealers_for_locations(
        &self,
        location_ids: &[Uuid],
        only_complete: bool,
    ) -> Result<Vec<Dealer>, DatabaseError>;

    /// The dealer owning a location, if any.
    async fn dealer_by_location(&self, location_id: Uuid)
    -> Result<Option<Dealer>, DatabaseError>;

    // ── Favourites ──────────────────────────────────────────────────

    async fn get_favourite(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<FavouriteDealer>, DatabaseError>;

    /// Insert or replace the customer's single favourite.
    async fn upsert_favourite(&self, favourite: &FavouriteDealer) -> Result<(), DatabaseError>;
}
