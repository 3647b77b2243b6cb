//! Onboarding requests and partial-update merging.
//!
//! Every field of a patch is optional. A field that is absent, or a string
//! that is blank, leaves the stored value untouched.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::model::{Account, Address};
use crate::profile::reconcile::KeyedSelection;

use super::state::{CustomerStep, DealerStep, ExpertStep, StepRequest};

/// A step request plus the fields to patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingRequest<S, P> {
    pub step: StepRequest<S>,
    #[serde(default)]
    pub patch: P,
}

impl<S, P: Default> OnboardingRequest<S, P> {
    pub fn edit(patch: P) -> Self {
        Self {
            step: StepRequest::Edit,
            patch,
        }
    }

    pub fn advance(step: S, patch: P) -> Self {
        Self {
            step: StepRequest::Advance(step),
            patch,
        }
    }
}

pub type CustomerRequest = OnboardingRequest<CustomerStep, CustomerPatch>;
pub type DealerRequest = OnboardingRequest<DealerStep, DealerPatch>;
pub type ExpertRequest = OnboardingRequest<ExpertStep, ExpertPatch>;

/// Account fields any actor may patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
}

impl AccountPatch {
    pub fn apply(&self, account: &mut Account) {
        merge_text(&mut account.first_name, self.first_name.as_deref());
        merge_text(&mut account.last_name, self.last_name.as_deref());
        merge_opt_text(&mut account.phone_number, self.phone_number.as_deref());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPatch {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

impl AddressPatch {
    pub fn apply(&self, address: &mut Address) {
        merge_text(&mut address.line1, self.line1.as_deref());
        merge_opt_text(&mut address.line2, self.line2.as_deref());
        merge_text(&mut address.city, self.city.as_deref());
        merge_text(&mut address.state, self.state.as_deref());
        merge_text(&mut address.zip_code, self.zip_code.as_deref());
    }

    /// Patch an optional address, creating it when absent.
    pub fn apply_to(&self, address: &mut Option<Address>) {
        self.apply(address.get_or_insert_with(Address::default));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerPatch {
    #[serde(default, flatten)]
    pub account: AccountPatch,
    pub address: Option<AddressPatch>,
    pub languages: Option<KeyedSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpertPatch {
    #[serde(default, flatten)]
    pub account: AccountPatch,
    pub bio: Option<String>,
    pub years_of_experience: Option<u32>,
    pub address: Option<AddressPatch>,
    pub skills: Option<KeyedSelection>,
    pub languages: Option<KeyedSelection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealerPatch {
    #[serde(default, flatten)]
    pub account: AccountPatch,
    pub business: Option<BusinessPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessPatch {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub brands: Option<KeyedSelection>,
    pub job_categories: Option<KeyedSelection>,
    /// The full list of locations the business should have. Existing
    /// locations left out of the list are removed.
    pub locations: Option<Vec<LocationPatch>>,
}

impl BusinessPatch {
    /// Whether any business-level field is present.
    pub fn is_empty(&self) -> bool {
        is_blank(self.name.as_deref())
            && is_blank(self.phone_number.as_deref())
            && is_blank(self.website.as_deref())
            && is_blank(self.description.as_deref())
            && self.brands.is_none()
            && self.job_categories.is_none()
            && self.locations.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationPatch {
    /// Existing location to update; `None` creates a new one.
    pub id: Option<Uuid>,
    pub name: Option<String>,
    #[serde(default)]
    pub address: AddressPatch,
    pub serviceable_counties: Option<KeyedSelection>,
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Overwrite `target` when `value` is present and not blank.
pub fn merge_text(target: &mut String, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
        *target = v.trim().to_string();
    }
}

/// Like `merge_text` for optional fields.
pub fn merge_opt_text(target: &mut Option<String>, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
        *target = Some(v.trim().to_string());
    }
}
