//! Validation of incoming codes and locations against reference data.
//!
//! Reference data is fetched by the caller (see `collaborators::Catalog`)
//! and passed in; nothing here performs I/O.

use serde::{Deserialize, Serialize};

use crate::error::RuleViolation;

use super::model::ChildKind;
use super::reconcile::KeyedSelection;

/// A state with its counties, as supplied by the geography catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceState {
    pub name: String,
    pub counties: Vec<ReferenceCounty>,
}

/// A county and the zip codes that fall inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCounty {
    pub name: String,
    pub zip_codes: Vec<String>,
}

impl ReferenceState {
    fn county(&self, name: &str) -> Option<&ReferenceCounty> {
        self.counties.iter().find(|c| c.name == name)
    }

    fn has_zip(&self, zip_code: &str) -> bool {
        self.counties
            .iter()
            .any(|c| c.zip_codes.iter().any(|z| z == zip_code))
    }
}

/// The parts of a location that are checked against the catalog.
#[derive(Debug, Clone, Copy)]
pub struct LocationCheck<'a> {
    pub state: &'a str,
    pub zip_code: &'a str,
    pub serviceable_counties: &'a [&'a str],
}

/// Fail with `InvalidCode` unless `code` is allowed. The collection's
/// "other" sentinel is always allowed.
pub fn validate_code(kind: ChildKind, code: &str, allowed: &[String]) -> Result<(), RuleViolation> {
    if kind.is_sentinel(code) || allowed.iter().any(|a| a == code) {
        Ok(())
    } else {
        Err(RuleViolation::InvalidCode {
            kind,
            code: code.to_string(),
        })
    }
}

/// Validate every distinct code of a selection.
pub fn validate_codes(
    kind: ChildKind,
    selection: &KeyedSelection,
    allowed: &[String],
) -> Result<(), RuleViolation> {
    selection
        .distinct_codes()
        .into_iter()
        .try_for_each(|code| validate_code(kind, code, allowed))
}

/// Check a location's state, serviceable counties and zip code, in that
/// order. The first failing check is returned.
pub fn validate_location(
    location: &LocationCheck<'_>,
    reference_states: &[ReferenceState],
) -> Result<(), RuleViolation> {
    let state = reference_states
        .iter()
        .find(|s| s.name == location.state)
        .ok_or_else(|| RuleViolation::InvalidState {
            state: location.state.to_string(),
        })?;

    let invalid: Vec<String> = location
        .serviceable_counties
        .iter()
        .filter(|county| state.county(county).is_none())
        .map(|county| county.to_string())
        .collect();
    if !invalid.is_empty() {
        return Err(RuleViolation::InvalidCounties {
            state: state.name.clone(),
            counties: invalid,
        });
    }

    if !state.has_zip(location.zip_code) {
        return Err(RuleViolation::InvalidZipCode {
            zip_code: location.zip_code.to_string(),
        });
    }

    Ok(())
}
