//! OnboardingManager: applies onboarding requests to customers, dealers
//! and experts.
//!
//! Each request is applied to a working copy of the actor: field patches,
//! collection reconciliation, catalog validation and the location deletion
//! guard all run before anything is written. Completion effects run after
//! the save, for any complete actor whose effect has not yet succeeded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{self, Cache};
use crate::collaborators::{Catalog, CompletionEffects, WorkOrderLookup};
use crate::error::{Entity, Error, Result, RuleViolation};
use crate::matching::SEARCH_CACHE_PATTERN;
use crate::messaging::{self, DEALER_SIGNUP_TOPIC, MessageBus, OutboundMessage, Route};
use crate::profile::catalog::{LocationCheck, validate_codes, validate_location};
use crate::profile::guard::{deletion_candidates, guard_deletion};
use crate::profile::model::{
    Account, Address, Business, BusinessLocation, ChildKind, Customer, Dealer, Expert, KeyedChild,
};
use crate::profile::reconcile::{KeyedSelection, reconcile, removed_codes};
use crate::store::ProfileStore;

use super::patch::{
    BusinessPatch, CustomerRequest, DealerRequest, ExpertRequest, LocationPatch, merge_opt_text,
    merge_text,
};
use super::state::apply_step;

/// Collaborators the manager needs.
#[derive(Clone)]
pub struct OnboardingDeps {
    pub store: Arc<dyn ProfileStore>,
    pub catalog: Arc<dyn Catalog>,
    pub work_orders: Arc<dyn WorkOrderLookup>,
    pub effects: Arc<dyn CompletionEffects>,
    pub bus: Arc<dyn MessageBus>,
    pub cache: Arc<dyn Cache>,
}

/// Coordinates onboarding for all three actor types.
pub struct OnboardingManager {
    store: Arc<dyn ProfileStore>,
    catalog: Arc<dyn Catalog>,
    work_orders: Arc<dyn WorkOrderLookup>,
    effects: Arc<dyn CompletionEffects>,
    bus: Arc<dyn MessageBus>,
    cache: Arc<dyn Cache>,
}

/// Reconcile one keyed collection in place, logging what was dropped.
fn reconcile_field(
    kind: ChildKind,
    owner_id: Uuid,
    field: &mut Vec<KeyedChild>,
    incoming: Option<&KeyedSelection>,
) {
    if incoming.is_none() {
        return;
    }
    let before = std::mem::take(field);
    let removed: Vec<String> = {
        let after = reconcile(kind, before.clone(), incoming);
        let removed = removed_codes(&before, &after)
            .into_iter()
            .map(str::to_string)
            .collect();
        *field = after;
        removed
    };
    if !removed.is_empty() {
        debug!(%owner_id, kind = kind.as_str(), ?removed, "Keyed children removed");
    }
}

impl OnboardingManager {
    pub fn new(deps: OnboardingDeps) -> Self {
        Self {
            store: deps.store,
            catalog: deps.catalog,
            work_orders: deps.work_orders,
            effects: deps.effects,
            bus: deps.bus,
            cache: deps.cache,
        }
    }

    /// The caller must be a known account.
    async fn require_account(&self, account_id: Uuid) -> Result<Account> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| Error::Unauthorized(format!("unknown account {account_id}")))
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub async fn customer(&self, account_id: Uuid) -> Result<Customer> {
        self.require_account(account_id).await?;
        self.store
            .get_customer_by_account(account_id)
            .await?
            .ok_or_else(|| Error::not_found(Entity::Customer, account_id))
    }

    pub async fn dealer(&self, account_id: Uuid) -> Result<Dealer> {
        self.require_account(account_id).await?;
        self.store
            .get_dealer_by_account(account_id)
            .await?
            .ok_or_else(|| Error::not_found(Entity::Dealer, account_id))
    }

    pub async fn expert(&self, account_id: Uuid) -> Result<Expert> {
        self.require_account(account_id).await?;
        self.store
            .get_expert_by_account(account_id)
            .await?
            .ok_or_else(|| Error::not_found(Entity::Expert, account_id))
    }

    // ── Customer ────────────────────────────────────────────────────

    pub async fn advance_customer(
        &self,
        account_id: Uuid,
        request: CustomerRequest,
    ) -> Result<Customer> {
        let mut customer = self.customer(account_id).await?;
        let CustomerRequest { step, patch } = request;

        patch.account.apply(&mut customer.account);
        if let Some(address) = &patch.address {
            address.apply_to(&mut customer.address);
        }
        reconcile_field(
            ChildKind::Language,
            customer.id,
            &mut customer.languages,
            patch.languages.as_ref(),
        );

        let outcome = apply_step(
            &mut customer.last_completed_step,
            &mut customer.account,
            step,
        );
        self.store.save_customer(&customer).await?;
        info!(
            customer_id = %customer.id,
            step = %outcome.step,
            advanced = outcome.advanced,
            "Customer onboarding updated"
        );

        // Keyed on stored state so a failed effect is retried on the next save.
        if customer.account.onboarding_complete && customer.financial_account_id.is_none() {
            let financial_id = self
                .effects
                .create_customer_financial_account(&customer)
                .await?;
            customer.financial_account_id = Some(financial_id);
            self.store.save_customer(&customer).await?;
            info!(
                customer_id = %customer.id,
                completed_now = outcome.completed_now,
                "Customer onboarding complete"
            );
        }
        Ok(customer)
    }

    // ── Expert ──────────────────────────────────────────────────────

    pub async fn advance_expert(&self, account_id: Uuid, request: ExpertRequest) -> Result<Expert> {
        let mut expert = self.expert(account_id).await?;
        let ExpertRequest { step, patch } = request;

        patch.account.apply(&mut expert.account);
        merge_opt_text(&mut expert.bio, patch.bio.as_deref());
        if let Some(years) = patch.years_of_experience {
            expert.years_of_experience = Some(years);
        }
        if let Some(address) = &patch.address {
            address.apply_to(&mut expert.address);
        }
        reconcile_field(
            ChildKind::Skill,
            expert.id,
            &mut expert.skills,
            patch.skills.as_ref(),
        );
        reconcile_field(
            ChildKind::Language,
            expert.id,
            &mut expert.languages,
            patch.languages.as_ref(),
        );

        let outcome = apply_step(&mut expert.last_completed_step, &mut expert.account, step);
        self.store.save_expert(&expert).await?;
        info!(
            expert_id = %expert.id,
            step = %outcome.step,
            advanced = outcome.advanced,
            "Expert onboarding updated"
        );

        if expert.account.onboarding_complete && !expert.reminders_seeded {
            self.effects.seed_expert_reminders(&expert).await?;
            expert.reminders_seeded = true;
            self.store.save_expert(&expert).await?;
            info!(
                expert_id = %expert.id,
                completed_now = outcome.completed_now,
                "Expert onboarding complete"
            );
        }
        Ok(expert)
    }

    // ── Dealer ──────────────────────────────────────────────────────

    pub async fn advance_dealer(&self, account_id: Uuid, request: DealerRequest) -> Result<Dealer> {
        let mut dealer = self.dealer(account_id).await?;
        let before = dealer.clone();
        let DealerRequest { step, patch } = request;

        patch.account.apply(&mut dealer.account);
        if let Some(business) = &patch.business {
            self.apply_business(&mut dealer, business).await?;
        }

        let outcome = apply_step(&mut dealer.last_completed_step, &mut dealer.account, step);
        self.store.save_dealer(&dealer).await?;
        info!(
            dealer_id = %dealer.id,
            step = %outcome.step,
            advanced = outcome.advanced,
            "Dealer onboarding updated"
        );

        // Any stored change may alter what a cached search returns.
        if dealer != before {
            self.invalidate_search_cache().await?;
        }

        if dealer.account.onboarding_complete && dealer.financial_account_id.is_none() {
            let financial_id = self
                .effects
                .create_dealer_financial_account(&dealer)
                .await?;
            dealer.financial_account_id = Some(financial_id);
            self.store.save_dealer(&dealer).await?;

            let business_name = dealer
                .business
                .as_ref()
                .map(|b| b.name.clone())
                .unwrap_or_default();
            messaging::dispatch(
                Arc::clone(&self.bus),
                Route::Topic(DEALER_SIGNUP_TOPIC),
                OutboundMessage::DealerSignup {
                    business_name,
                    dealer_name: dealer.account.full_name(),
                    dealer_email: dealer.account.email.clone(),
                    phone_number: dealer.account.phone_number.clone(),
                },
            );
            self.invalidate_search_cache().await?;
            info!(
                dealer_id = %dealer.id,
                completed_now = outcome.completed_now,
                "Dealer onboarding complete"
            );
        }
        Ok(dealer)
    }

    async fn invalidate_search_cache(&self) -> Result<()> {
        cache::remove_matching(self.cache.as_ref(), SEARCH_CACHE_PATTERN).await?;
        Ok(())
    }

    /// Apply a business patch to the working copy.
    async fn apply_business(&self, dealer: &mut Dealer, patch: &BusinessPatch) -> Result<()> {
        let mut business = match dealer.business.take() {
            Some(business) => business,
            None if patch.is_empty() => return Ok(()),
            None => {
                let name = patch
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or(RuleViolation::RequiredBusinessName)?;
                info!(dealer_id = %dealer.id, business = name, "Creating business");
                Business::new(name)
            }
        };

        merge_text(&mut business.name, patch.name.as_deref());
        merge_opt_text(&mut business.phone_number, patch.phone_number.as_deref());
        merge_opt_text(&mut business.website, patch.website.as_deref());
        merge_opt_text(&mut business.description, patch.description.as_deref());

        if let Some(brands) = &patch.brands {
            let allowed = self.catalog.brand_codes().await?;
            validate_codes(ChildKind::Brand, brands, &allowed)?;
        }
        reconcile_field(
            ChildKind::Brand,
            business.id,
            &mut business.brands,
            patch.brands.as_ref(),
        );
        reconcile_field(
            ChildKind::JobCategory,
            business.id,
            &mut business.job_categories,
            patch.job_categories.as_ref(),
        );

        if let Some(locations) = &patch.locations {
            let existing = std::mem::take(&mut business.locations);
            business.locations = self.reconcile_locations(existing, locations).await?;
        }

        dealer.business = Some(business);
        Ok(())
    }

    /// Replace a business's locations with `incoming`.
    ///
    /// Known ids are updated in place, entries without an id are created,
    /// and existing locations left out are removed once the work-order
    /// system confirms none of them has active work.
    async fn reconcile_locations(
        &self,
        existing: Vec<BusinessLocation>,
        incoming: &[LocationPatch],
    ) -> Result<Vec<BusinessLocation>> {
        let incoming_ids: HashSet<Uuid> = incoming.iter().filter_map(|l| l.id).collect();
        let known: HashSet<Uuid> = existing.iter().map(|l| l.id).collect();
        if let Some(unknown) = incoming_ids.iter().find(|id| !known.contains(id)) {
            return Err(Error::not_found(Entity::Location, unknown));
        }
        let candidates = deletion_candidates(&existing, &incoming_ids);

        let mut by_id: HashMap<Uuid, BusinessLocation> =
            existing.into_iter().map(|l| (l.id, l)).collect();
        let mut result: Vec<BusinessLocation> = Vec::with_capacity(incoming.len());
        let mut position: HashMap<Uuid, usize> = HashMap::new();

        for patch in incoming {
            let index = match patch.id.and_then(|id| position.get(&id).copied()) {
                // The same id listed twice patches one location.
                Some(index) => index,
                None => {
                    let location = patch
                        .id
                        .and_then(|id| by_id.remove(&id))
                        .unwrap_or_else(|| BusinessLocation::new(Address::default()));
                    position.insert(location.id, result.len());
                    result.push(location);
                    result.len() - 1
                }
            };
            let location = &mut result[index];
            merge_opt_text(&mut location.name, patch.name.as_deref());
            patch.address.apply(&mut location.address);
            reconcile_field(
                ChildKind::ServiceableCounty,
                location.id,
                &mut location.serviceable_counties,
                patch.serviceable_counties.as_ref(),
            );
        }

        if !result.is_empty() {
            let states = self.catalog.reference_states().await?;
            for location in &result {
                let counties: Vec<&str> = location
                    .serviceable_counties
                    .iter()
                    .map(|c| c.code.as_str())
                    .collect();
                let check = LocationCheck {
                    state: &location.address.state,
                    zip_code: &location.address.zip_code,
                    serviceable_counties: &counties,
                };
                validate_location(&check, &states)?;
            }
        }

        guard_deletion(&candidates, self.work_orders.as_ref()).await?;
        if !candidates.is_empty() {
            info!(removed = ?candidates, "Business locations removed");
        }
        Ok(result)
    }
}
