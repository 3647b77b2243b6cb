//! Dealer search by customer zip code, plus favourite-dealer bookkeeping.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{self, Cache};
use crate::collaborators::Catalog;
use crate::config::SearchConfig;
use crate::error::{Entity, Error, Result, RuleViolation};
use crate::profile::model::{Dealer, FavouriteDealer};
use crate::store::ProfileStore;

/// Every cached search result lives under this prefix.
pub const SEARCH_CACHE_PATTERN: &str = "dealer_search:*";

/// Cache key for one search. Category order does not matter.
pub fn search_cache_key(zip_code: &str, categories: &[String], only_complete: bool) -> String {
    let mut sorted: Vec<&str> = categories.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    format!(
        "dealer_search:{}:{}:{}",
        zip_code.trim(),
        if only_complete { "complete" } else { "all" },
        sorted.join(",")
    )
}

/// Whether the dealer's business offers every requested category.
pub fn offers_all(dealer: &Dealer, categories: &[String]) -> bool {
    let offered: HashSet<&str> = dealer.job_category_codes().collect();
    categories.iter().all(|c| offered.contains(c.as_str()))
}

pub struct DealerMatcher {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn ProfileStore>,
    cache: Arc<dyn Cache>,
    config: SearchConfig,
}

impl DealerMatcher {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn ProfileStore>,
        cache: Arc<dyn Cache>,
        config: SearchConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            cache,
            config,
        }
    }

    /// `match_by_zip` with the configured completeness filter.
    pub async fn search(&self, zip_code: &str, categories: &[String]) -> Result<Vec<Dealer>> {
        self.match_by_zip(zip_code, categories, self.config.only_complete)
            .await
    }

    /// Dealers with a location serving the county of `zip_code`.
    ///
    /// A non-empty `categories` keeps only dealers offering all of them.
    /// Results carry no ordering guarantee.
    pub async fn match_by_zip(
        &self,
        zip_code: &str,
        categories: &[String],
        only_complete: bool,
    ) -> Result<Vec<Dealer>> {
        let key = search_cache_key(zip_code, categories, only_complete);
        if let Some(bytes) = self.cache.get(&key).await? {
            debug!(%key, "Dealer search served from cache");
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let resolved = self
            .catalog
            .resolve_zip(zip_code.trim())
            .await?
            .ok_or_else(|| RuleViolation::InvalidZipCode {
                zip_code: zip_code.to_string(),
            })?;

        let location_ids = self.store.locations_serving_county(&resolved.county).await?;
        let mut dealers = self
            .store
            .dealers_for_locations(&location_ids, only_complete)
            .await?;
        if !categories.is_empty() {
            dealers.retain(|d| offers_all(d, categories));
        }

        self.cache
            .set(&key, serde_json::to_vec(&dealers)?, Some(self.config.cache_ttl))
            .await?;
        info!(
            zip_code,
            county = %resolved.county,
            locations = location_ids.len(),
            matched = dealers.len(),
            "Dealer search"
        );
        Ok(dealers)
    }

    /// The dealer owning a business location.
    pub async fn dealer_for_location(&self, location_id: Uuid) -> Result<Dealer> {
        self.store
            .dealer_by_location(location_id)
            .await?
            .ok_or_else(|| Error::not_found(Entity::BusinessLocation, location_id))
    }

    /// Point the customer's single favourite at `location_id`.
    pub async fn set_favourite_dealer(
        &self,
        account_id: Uuid,
        location_id: Uuid,
    ) -> Result<FavouriteDealer> {
        if self.store.get_account(account_id).await?.is_none() {
            return Err(Error::Unauthorized(format!("unknown account {account_id}")));
        }
        let customer = self
            .store
            .get_customer_by_account(account_id)
            .await?
            .ok_or_else(|| Error::not_found(Entity::Customer, account_id))?;
        self.dealer_for_location(location_id).await?;

        let favourite = FavouriteDealer {
            customer_id: customer.id,
            business_location_id: location_id,
            updated_at: Utc::now(),
        };
        self.store.upsert_favourite(&favourite).await?;
        info!(customer_id = %customer.id, %location_id, "Favourite dealer updated");
        Ok(favourite)
    }

    /// The dealer behind the customer's favourite, if one is set and the
    /// location still exists.
    pub async fn favourite_dealer(&self, account_id: Uuid) -> Result<Option<Dealer>> {
        let customer = self
            .store
            .get_customer_by_account(account_id)
            .await?
            .ok_or_else(|| Error::not_found(Entity::Customer, account_id))?;
        let Some(favourite) = self.store.get_favourite(customer.id).await? else {
            return Ok(None);
        };
        Ok(self
            .store
            .dealer_by_location(favourite.business_location_id)
            .await?)
    }

    /// Drop every cached search result.
    pub async fn invalidate_search_cache(&self) -> Result<usize> {
        Ok(cache::remove_matching(self.cache.as_ref(), SEARCH_CACHE_PATTERN).await?)
    }
}
