//! Profile data model and the pure building blocks used by onboarding:
//! keyed-collection reconciliation, catalog validation and the location
//! deletion guard.

pub mod catalog;
pub mod guard;
pub mod model;
pub mod reconcile;

pub use catalog::{LocationCheck, ReferenceCounty, ReferenceState, validate_code, validate_codes, validate_location};
pub use guard::{deletion_candidates, guard_deletion};
pub use model::{
    Account, Address, Business, BusinessLocation, ChildKind, Customer, Dealer, Expert,
    FavouriteDealer, KeyedChild, OTHER_CODE, Role,
};
pub use reconcile::{KeyedSelection, reconcile};
