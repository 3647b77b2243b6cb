//! Deletion guard for business locations with active work.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::collaborators::WorkOrderLookup;
use crate::error::{Result, RuleViolation};

use super::model::BusinessLocation;

/// Ids of existing locations that the incoming request no longer lists.
pub fn deletion_candidates(existing: &[BusinessLocation], incoming_ids: &HashSet<Uuid>) -> Vec<Uuid> {
    existing
        .iter()
        .map(|l| l.id)
        .filter(|id| !incoming_ids.contains(id))
        .collect()
}

/// Veto removal of any candidate location that has active work orders.
///
/// With no candidates the work-order system is not called at all.
pub async fn guard_deletion(candidates: &[Uuid], lookup: &dyn WorkOrderLookup) -> Result<()> {
    if candidates.is_empty() {
        return Ok(());
    }

    let orders = lookup.active_work_orders(candidates).await?;
    if orders.is_empty() {
        debug!(count = candidates.len(), "Location removal cleared by work-order check");
        return Ok(());
    }

    let offending: BTreeSet<Uuid> = orders.iter().map(|o| o.business_location_id).collect();
    let location_ids: Vec<Uuid> = offending.into_iter().collect();
    warn!(
        locations = ?location_ids,
        orders = orders.len(),
        "Location removal blocked by active work orders"
    );
    Err(RuleViolation::ConflictingActiveWork { location_ids }.into())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::collaborators::WorkOrder;
    use crate::error::{CollaboratorError, Error};
    use crate::profile::model::Address;

    /// Work-order stub recording every call it receives.
    struct RecordingLookup {
        active: Vec<Uuid>,
        calls: Mutex<Vec<Vec<Uuid>>>,
    }

    impl RecordingLookup {
        fn new(active: Vec<Uuid>) -> Self {
            Self {
                active,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl WorkOrderLookup for RecordingLookup {
        async fn active_work_orders(
            &self,
            location_ids: &[Uuid],
        ) -> std::result::Result<Vec<WorkOrder>, CollaboratorError> {
            self.calls.lock().unwrap().push(location_ids.to_vec());
            Ok(location_ids
                .iter()
                .filter(|id| self.active.contains(id))
                .map(|id| WorkOrder {
                    id: format!("wo-{id}"),
                    business_location_id: *id,
                    status: "in_progress".into(),
                })
                .collect())
        }
    }

    fn location() -> BusinessLocation {
        BusinessLocation::new(Address::default())
    }

    #[test]
    fn candidates_are_set_difference_by_id() {
        let (l1, l2, l3) = (location(), location(), location());
        let incoming: HashSet<Uuid> = [l1.id, l3.id].into_iter().collect();
        let candidates = deletion_candidates(&[l1, l2.clone(), l3], &incoming);
        assert_eq!(candidates, vec![l2.id]);
    }

    #[tokio::test]
    async fn no_candidates_skips_lookup() {
        let lookup = RecordingLookup::new(vec![]);
        guard_deletion(&[], &lookup).await.unwrap();
        assert!(lookup.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn active_work_blocks_removal() {
        let blocked = Uuid::new_v4();
        let free = Uuid::new_v4();
        let lookup = RecordingLookup::new(vec![blocked]);

        let err = guard_deletion(&[blocked, free], &lookup).await.unwrap_err();
        match err {
            Error::Rule(RuleViolation::ConflictingActiveWork { location_ids }) => {
                assert_eq!(location_ids, vec![blocked]);
            }
            other => panic!("expected ConflictingActiveWork, got {other:?}"),
        }

        let calls = lookup.calls.lock().unwrap();
        assert_eq!(calls.len(), 1, "lookup must be batched into one call");
        assert_eq!(calls[0], vec![blocked, free]);
    }

    #[tokio::test]
    async fn idle_locations_may_be_removed() {
        let lookup = RecordingLookup::new(vec![]);
        guard_deletion(&[Uuid::new_v4()], &lookup).await.unwrap();
        assert_eq!(lookup.calls.lock().unwrap().len(), 1);
    }
}
