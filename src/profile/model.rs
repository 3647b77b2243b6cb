//! Account, actor, business and keyed-child data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::onboarding::state::{CustomerStep, DealerStep, ExpertStep};

/// Which actor an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Dealer,
    Expert,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Dealer => "dealer",
            Self::Expert => "expert",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "dealer" => Ok(Self::Dealer),
            "expert" => Ok(Self::Expert),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Identity record shared by all actor types. `email` is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub role: Role,
    pub onboarding_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            phone_number: None,
            role,
            onboarding_complete: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// The collections that hold keyed children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    Brand,
    Skill,
    Language,
    JobCategory,
    ServiceableCounty,
}

/// Reserved code whose entity may carry free text.
pub const OTHER_CODE: &str = "other";

impl ChildKind {
    /// The "other" sentinel for this collection, if it has one.
    pub fn others_sentinel(&self) -> Option<&'static str> {
        match self {
            Self::ServiceableCounty => None,
            _ => Some(OTHER_CODE),
        }
    }

    pub fn is_sentinel(&self, code: &str) -> bool {
        self.others_sentinel() == Some(code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Skill => "skill",
            Self::Language => "language",
            Self::JobCategory => "job_category",
            Self::ServiceableCounty => "serviceable_county",
        }
    }
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChildKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brand" => Ok(Self::Brand),
            "skill" => Ok(Self::Skill),
            "language" => Ok(Self::Language),
            "job_category" => Ok(Self::JobCategory),
            "serviceable_county" => Ok(Self::ServiceableCounty),
            other => Err(format!("unknown child kind: {other}")),
        }
    }
}

/// A code-identified child attached to a parent (brand, skill, language,
/// job category, serviceable county).
///
/// `id` is the persistent identity; the store uses it to decide between
/// update and insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedChild {
    pub id: Uuid,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub others_text: Option<String>,
}

impl KeyedChild {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            others_text: None,
        }
    }
}

/// Postal address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

/// A customer and their onboarding progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub account: Account,
    pub last_completed_step: CustomerStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub languages: Vec<KeyedChild>,
    /// Set once the external financial account has been created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_account_id: Option<String>,
}

impl Customer {
    pub fn new(account: Account) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            last_completed_step: CustomerStep::default(),
            address: None,
            languages: Vec::new(),
            financial_account_id: None,
        }
    }
}

/// An expert (independent technician) and their onboarding progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expert {
    pub id: Uuid,
    pub account: Account,
    pub last_completed_step: ExpertStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_of_experience: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub skills: Vec<KeyedChild>,
    pub languages: Vec<KeyedChild>,
    /// Set once the external reminder records exist.
    #[serde(default)]
    pub reminders_seeded: bool,
}

impl Expert {
    pub fn new(account: Account) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            last_completed_step: ExpertStep::default(),
            bio: None,
            years_of_experience: None,
            address: None,
            skills: Vec::new(),
            languages: Vec::new(),
            reminders_seeded: false,
        }
    }
}

/// A dealer. The business is created during onboarding, not at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dealer {
    pub id: Uuid,
    pub account: Account,
    pub last_completed_step: DealerStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business: Option<Business>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_account_id: Option<String>,
}

impl Dealer {
    pub fn new(account: Account) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            last_completed_step: DealerStep::default(),
            business: None,
            financial_account_id: None,
        }
    }

    /// Job-category codes of the dealer's business (empty without one).
    pub fn job_category_codes(&self) -> impl Iterator<Item = &str> {
        self.business
            .iter()
            .flat_map(|b| b.job_categories.iter().map(|c| c.code.as_str()))
    }

    pub fn owns_location(&self, location_id: Uuid) -> bool {
        self.business
            .as_ref()
            .is_some_and(|b| b.locations.iter().any(|l| l.id == location_id))
    }
}

/// A dealer's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub locations: Vec<BusinessLocation>,
    pub brands: Vec<KeyedChild>,
    pub job_categories: Vec<KeyedChild>,
}

impl Business {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            phone_number: None,
            website: None,
            description: None,
            locations: Vec::new(),
            brands: Vec::new(),
            job_categories: Vec::new(),
        }
    }
}

/// A physical location of a business and the counties it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessLocation {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: Address,
    pub serviceable_counties: Vec<KeyedChild>,
}

impl BusinessLocation {
    pub fn new(address: Address) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            address,
            serviceable_counties: Vec::new(),
        }
    }

    pub fn serves_county(&self, county: &str) -> bool {
        self.serviceable_counties.iter().any(|c| c.code == county)
    }
}

/// A customer's favourite dealer location (one per customer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavouriteDealer {
    pub customer_id: Uuid,
    pub business_location_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counties_have_no_sentinel() {
        assert_eq!(ChildKind::ServiceableCounty.others_sentinel(), None);
        assert!(!ChildKind::ServiceableCounty.is_sentinel(OTHER_CODE));
        assert!(ChildKind::Brand.is_sentinel("other"));
        assert!(!ChildKind::Brand.is_sentinel("Other"));
    }

    #[test]
    fn child_kind_display_matches_serde() {
        let kinds = [
            ChildKind::Brand,
            ChildKind::Skill,
            ChildKind::Language,
            ChildKind::JobCategory,
            ChildKind::ServiceableCounty,
        ];
        for kind in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(format!("\"{kind}\""), json);
            assert_eq!(kind.as_str().parse::<ChildKind>().unwrap(), kind);
        }
    }

    #[test]
    fn role_roundtrips_through_str() {
        for role in [Role::Customer, Role::Dealer, Role::Expert] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn dealer_without_business_has_no_categories() {
        let dealer = Dealer::new(Account::new("Dee", "Ler", "d@example.com", Role::Dealer));
        assert_eq!(dealer.job_category_codes().count(), 0);
        assert!(!dealer.owns_location(Uuid::new_v4()));
    }

    #[test]
    fn full_name_trims_missing_parts() {
        let account = Account::new("Ada", "", "ada@example.com", Role::Customer);
        assert_eq!(account.full_name(), "Ada");
    }
}
