//! Keyed-collection reconciliation.
//!
//! Turns a caller-supplied set of codes into the new authoritative list of
//! children for a parent. Existing children are reused by code, so their
//! ids survive and the store updates rather than re-inserts them; codes
//! that disappear are dropped, which the store turns into deletes.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::model::{ChildKind, KeyedChild, OTHER_CODE};

/// The codes a caller wants a collection to contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedSelection {
    pub codes: Vec<String>,
    /// Free text keyed by code. Only the collection's sentinel entry is used.
    #[serde(default)]
    pub others_by_code: BTreeMap<String, String>,
}

impl KeyedSelection {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
            others_by_code: BTreeMap::new(),
        }
    }

    /// Attach free text to the "other" code.
    pub fn with_others(mut self, text: impl Into<String>) -> Self {
        self.others_by_code.insert(OTHER_CODE.to_string(), text.into());
        self
    }

    /// Codes with duplicates removed, in order of first appearance.
    pub fn distinct_codes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.codes
            .iter()
            .map(String::as_str)
            .filter(|code| seen.insert(*code))
            .collect()
    }
}

/// Reconcile `existing` against `incoming`.
///
/// `None` means the caller did not ask to change this collection and the
/// existing list is returned as-is. `Some` with no codes empties it.
pub fn reconcile(
    kind: ChildKind,
    existing: Vec<KeyedChild>,
    incoming: Option<&KeyedSelection>,
) -> Vec<KeyedChild> {
    let Some(selection) = incoming else {
        return existing;
    };

    let mut by_code: BTreeMap<String, KeyedChild> = existing
        .into_iter()
        .map(|child| (child.code.clone(), child))
        .collect();

    selection
        .distinct_codes()
        .into_iter()
        .map(|code| {
            let mut child = by_code
                .remove(code)
                .unwrap_or_else(|| KeyedChild::new(code));
            child.others_text = if kind.is_sentinel(code) {
                selection.others_by_code.get(code).cloned()
            } else {
                None
            };
            child
        })
        .collect()
}

/// Codes present in `before` but not in `after`.
pub fn removed_codes<'a>(before: &'a [KeyedChild], after: &[KeyedChild]) -> Vec<&'a str> {
    let kept: HashSet<&str> = after.iter().map(|c| c.code.as_str()).collect();
    before
        .iter()
        .map(|c| c.code.as_str())
        .filter(|code| !kept.contains(code))
        .collect()
}
