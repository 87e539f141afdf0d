//! Resolution workflow for flagged overlaps.
//!
//! ```text
//!            archive(target)  ──► Archived
//!   Open ──► delete(target)   ──► Deleted      (terminal)
//!            ignore           ──► Ignored
//! ```
//!
//! Each transition is one serialized transaction: check, mutate the parcel
//! store, append the audit entry, then record the new state. If the audit
//! append fails the store mutation is reverted. Attempts that lose a race
//! (pair no longer open, parcel already gone or archived) are answered with
//! `AlreadyResolved` and recorded as `RESOLUTION_CONFLICT`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::error::{OverlapError, Result, StoreError};
use crate::model::{
    AuditActionType, AuditLogEntry, OverlapId, OverlapRecord, ParcelId, ParcelStatus,
    ResolutionAction, ResolutionKind, ResolutionState,
};
use crate::store::ParcelStore;

/// Resolution state per overlap pair, derived from the audit log.
#[derive(Debug, Clone, Default)]
pub struct ResolutionLedger {
    actions: BTreeMap<OverlapId, ResolutionAction>,
}

impl ResolutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from audit entries (oldest first). The first resolution of a
    /// pair wins; later ones cannot exist because transitions are terminal.
    ///
    /// An entry whose embedded resolution does not decode is an error: a
    /// skipped entry would reopen a pair that is already closed.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a AuditLogEntry>,
    ) -> std::result::Result<Self, StoreError> {
        let mut ledger = Self::new();
        for entry in entries {
            if let Some(action) = entry.resolution()? {
                ledger.record(action);
            }
        }
        Ok(ledger)
    }

    pub fn state(&self, id: &OverlapId) -> ResolutionState {
        self.actions
            .get(id)
            .map(|a| ResolutionState::from(a.action))
            .unwrap_or(ResolutionState::Open)
    }

    pub fn action(&self, id: &OverlapId) -> Option<&ResolutionAction> {
        self.actions.get(id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn record(&mut self, action: ResolutionAction) {
        self.actions
            .entry(action.overlap_record_id.clone())
            .or_insert(action);
    }
}

/// Applies resolution decisions against the parcel store and the audit log.
pub struct ResolutionWorkflow {
    store: Arc<dyn ParcelStore>,
    audit: Arc<dyn AuditLog>,
    ledger: Mutex<ResolutionLedger>,
}

impl ResolutionWorkflow {
    /// Replays the audit log into the ledger.
    pub fn new(store: Arc<dyn ParcelStore>, audit: Arc<dyn AuditLog>) -> Result<Self> {
        let ledger = ResolutionLedger::from_entries(audit.entries()?.iter())?;
        tracing::debug!(resolved = ledger.len(), "resolution ledger rebuilt");
        Ok(Self {
            store,
            audit,
            ledger: Mutex::new(ledger),
        })
    }

    pub fn state(&self, id: &OverlapId) -> ResolutionState {
        self.ledger.lock().state(id)
    }

    pub fn ledger(&self) -> ResolutionLedger {
        self.ledger.lock().clone()
    }

    /// Archive `target`, one side of `record`. Reason may be empty.
    pub fn archive(
        &self,
        actor_id: &str,
        record: &OverlapRecord,
        target: &ParcelId,
        reason: &str,
    ) -> Result<ResolutionAction> {
        check_target(record, target)?;
        self.transition(actor_id, record, Some(target), ResolutionKind::Archive, reason)
    }

    /// Hard-delete `target` and its dependent records. Irreversible.
    pub fn delete(
        &self,
        actor_id: &str,
        record: &OverlapRecord,
        target: &ParcelId,
        reason: &str,
    ) -> Result<ResolutionAction> {
        check_target(record, target)?;
        if reason.trim().is_empty() {
            return Err(OverlapError::MissingReason);
        }
        self.transition(actor_id, record, Some(target), ResolutionKind::Delete, reason)
    }

    /// Accept the overlap as legitimate; neither parcel is touched.
    pub fn ignore(
        &self,
        actor_id: &str,
        record: &OverlapRecord,
        reason: &str,
    ) -> Result<ResolutionAction> {
        self.transition(actor_id, record, None, ResolutionKind::Resolve, reason)
    }

    fn transition(
        &self,
        actor_id: &str,
        record: &OverlapRecord,
        target: Option<&ParcelId>,
        kind: ResolutionKind,
        reason: &str,
    ) -> Result<ResolutionAction> {
        let mut ledger = self.ledger.lock();

        if let Some(detail) = self.conflict(&ledger, record, target)? {
            self.record_conflict(actor_id, record, target, kind, &detail);
            return Err(OverlapError::AlreadyResolved {
                overlap_id: record.id.clone(),
                detail,
            });
        }

        let action = ResolutionAction {
            id: Uuid::new_v4(),
            overlap_record_id: record.id.clone(),
            action: kind,
            target_parcel_id: target.cloned(),
            actor_id: actor_id.to_string(),
            reason: reason.to_string(),
            acted_at: Utc::now(),
        };

        let undo = match target {
            Some(target) => self.mutate(kind, target)?,
            None => Undo::Nothing,
        };

        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            action_type: AuditActionType::for_resolution(kind),
            actor_id: actor_id.to_string(),
            subject_ids: subject_ids(record, target),
            details: json!({
                "resolution": action,
                "overlap_percentage": record.overlap_percentage,
                "overlap_area_m2": record.overlap_area_m2,
                "severity": record.severity,
                "same_owner": record.same_owner,
            }),
            created_at: action.acted_at,
        };

        if let Err(err) = self.audit.append(&entry) {
            tracing::error!(overlap_id = %record.id, error = %err, "audit append failed, reverting");
            self.revert(undo);
            return Err(err.into());
        }

        tracing::info!(
            overlap_id = %record.id,
            action = ?kind,
            target = ?target.map(ParcelId::as_str),
            actor = %actor_id,
            "overlap resolved"
        );
        ledger.record(action.clone());
        Ok(action)
    }

    /// Why this transition can no longer happen, if it can't.
    fn conflict(
        &self,
        ledger: &ResolutionLedger,
        record: &OverlapRecord,
        target: Option<&ParcelId>,
    ) -> Result<Option<String>> {
        let state = ledger.state(&record.id);
        if state.is_terminal() {
            return Ok(Some(format!("overlap is already {state:?}").to_lowercase()));
        }
        let Some(target) = target else {
            return Ok(None);
        };
        Ok(match self.store.get_parcel(target)? {
            None => Some(format!("parcel {target} no longer exists")),
            Some(parcel) if parcel.status == ParcelStatus::Archived => {
                Some(format!("parcel {target} is already archived"))
            }
            Some(_) => None,
        })
    }

    fn mutate(&self, kind: ResolutionKind, target: &ParcelId) -> Result<Undo> {
        match kind {
            ResolutionKind::Archive => {
                let previous = self
                    .store
                    .set_status(target, ParcelStatus::Archived)?
                    .ok_or_else(|| OverlapError::ParcelNotFound(target.clone()))?;
                Ok(Undo::Status(target.clone(), previous))
            }
            ResolutionKind::Delete => {
                let removed = self
                    .store
                    .remove_parcel(target)?
                    .ok_or_else(|| OverlapError::ParcelNotFound(target.clone()))?;
                Ok(Undo::Reinsert(Box::new(removed)))
            }
            ResolutionKind::Resolve => Ok(Undo::Nothing),
        }
    }

    fn revert(&self, undo: Undo) {
        let outcome: std::result::Result<(), StoreError> = match undo {
            Undo::Nothing => Ok(()),
            Undo::Status(id, previous) => self.store.set_status(&id, previous).map(|_| ()),
            Undo::Reinsert(removed) => self.store.restore_parcel(*removed),
        };
        if let Err(err) = outcome {
            tracing::error!(error = %err, "failed to revert parcel mutation");
        }
    }

    fn record_conflict(
        &self,
        actor_id: &str,
        record: &OverlapRecord,
        target: Option<&ParcelId>,
        kind: ResolutionKind,
        detail: &str,
    ) {
        tracing::warn!(overlap_id = %record.id, actor = %actor_id, %detail, "resolution conflict");
        let entry = AuditLogEntry::new(
            AuditActionType::ResolutionConflict,
            actor_id,
            subject_ids(record, target),
            json!({
                "overlap_record_id": record.id,
                "attempted": kind,
                "target_parcel_id": target,
                "detail": detail,
            }),
        );
        if let Err(err) = self.audit.append(&entry) {
            tracing::warn!(overlap_id = %record.id, error = %err, "could not record resolution conflict");
        }
    }
}

enum Undo {
    Nothing,
    Status(ParcelId, ParcelStatus),
    Reinsert(Box<crate::store::RemovedParcel>),
}

fn check_target(record: &OverlapRecord, target: &ParcelId) -> Result<()> {
    if record.id.contains(target) {
        Ok(())
    } else {
        Err(OverlapError::TargetNotInOverlap {
            overlap_id: record.id.clone(),
            parcel_id: target.clone(),
        })
    }
}

/// Target first, then the other side of the pair.
fn subject_ids(record: &OverlapRecord, target: Option<&ParcelId>) -> Vec<String> {
    match target.and_then(|t| record.id.other(t).map(|o| (t, o))) {
        Some((target, other)) => vec![target.to_string(), other.to_string()],
        None => vec![record.id.low().to_string(), record.id.high().to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::classify::Severity;
    use crate::model::{PairKey, Parcel};
    use crate::store::InMemoryParcelStore;
    use parcelguard_geometry::Boundary;

    struct Fixture {
        store: Arc<InMemoryParcelStore>,
        audit: Arc<MemoryAuditLog>,
        workflow: ResolutionWorkflow,
        record: OverlapRecord,
    }

    fn parcel(id: &str) -> Parcel {
        Parcel::new(
            id,
            "owner",
            ParcelStatus::Published,
            Boundary::from_ring(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]),
        )
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryParcelStore::new());
        store.insert_parcel(parcel("p1")).unwrap();
        store.insert_parcel(parcel("p2")).unwrap();
        store.attach_media(&ParcelId::from("p2"), "photo");
        let audit = Arc::new(MemoryAuditLog::new());
        let workflow = ResolutionWorkflow::new(store.clone(), audit.clone()).unwrap();
        let id = PairKey::new(&ParcelId::from("p1"), &ParcelId::from("p2")).unwrap();
        let record = OverlapRecord {
            parcel_a_id: id.low().clone(),
            parcel_b_id: id.high().clone(),
            id,
            overlap_percentage: 100.0,
            overlap_area_m2: 10_000.0,
            intersection_geometry: None,
            same_owner: true,
            severity: Severity::Blocked,
            discovered_at: Utc::now(),
        };
        Fixture {
            store,
            audit,
            workflow,
            record,
        }
    }

    fn types(audit: &MemoryAuditLog) -> Vec<AuditActionType> {
        audit.entries().unwrap().iter().map(|e| e.action_type).collect()
    }

    #[test]
    fn archive_then_archive_again_is_already_resolved() {
        let f = fixture();
        let p2 = ParcelId::from("p2");

        let action = f.workflow.archive("admin", &f.record, &p2, "").unwrap();
        assert_eq!(action.action, ResolutionKind::Archive);
        assert_eq!(
            f.store.get_parcel(&p2).unwrap().unwrap().status,
            ParcelStatus::Archived
        );
        assert_eq!(f.workflow.state(&f.record.id), ResolutionState::Archived);

        let err = f.workflow.archive("admin", &f.record, &p2, "").unwrap_err();
        assert!(matches!(err, OverlapError::AlreadyResolved { .. }));
        assert!(err.is_conflict());
        assert_eq!(
            types(&f.audit),
            vec![
                AuditActionType::ArchiveDuplicateListing,
                AuditActionType::ResolutionConflict
            ]
        );
    }

    #[test]
    fn delete_requires_a_reason_before_touching_anything() {
        let f = fixture();
        let err = f
            .workflow
            .delete("admin", &f.record, &ParcelId::from("p2"), "   ")
            .unwrap_err();
        assert!(matches!(err, OverlapError::MissingReason));
        assert!(f.store.get_parcel(&ParcelId::from("p2")).unwrap().is_some());
        assert!(f.audit.is_empty());
    }

    #[test]
    fn delete_removes_parcel_and_media() {
        let f = fixture();
        let p2 = ParcelId::from("p2");
        f.workflow
            .delete("admin", &f.record, &p2, "duplicate of p1")
            .unwrap();
        assert!(f.store.get_parcel(&p2).unwrap().is_none());
        assert!(f.store.media_for(&p2).is_empty());

        let entry = &f.audit.entries().unwrap()[0];
        assert_eq!(entry.action_type, AuditActionType::DeleteDuplicateListing);
        assert_eq!(entry.subject_ids, vec!["p2".to_string(), "p1".to_string()]);
        assert_eq!(entry.resolution().unwrap().unwrap().reason, "duplicate of p1");
    }

    #[test]
    fn target_outside_the_pair_is_rejected() {
        let f = fixture();
        let err = f
            .workflow
            .archive("admin", &f.record, &ParcelId::from("p9"), "")
            .unwrap_err();
        assert!(matches!(err, OverlapError::TargetNotInOverlap { .. }));
    }

    #[test]
    fn failed_audit_append_reverts_archive() {
        let f = fixture();
        let p2 = ParcelId::from("p2");
        f.audit.set_available(false);

        let err = f.workflow.archive("admin", &f.record, &p2, "").unwrap_err();
        assert!(matches!(err, OverlapError::StoreUnavailable(_)));
        assert_eq!(
            f.store.get_parcel(&p2).unwrap().unwrap().status,
            ParcelStatus::Published
        );
        assert_eq!(f.workflow.state(&f.record.id), ResolutionState::Open);
    }

    #[test]
    fn failed_audit_append_reinserts_deleted_parcel() {
        let f = fixture();
        let p2 = ParcelId::from("p2");
        f.audit.set_available(false);

        assert!(f.workflow.delete("admin", &f.record, &p2, "dup").is_err());
        assert!(f.store.get_parcel(&p2).unwrap().is_some());
        assert_eq!(f.store.media_for(&p2), vec!["photo".to_string()]);
    }

    #[test]
    fn ignore_leaves_parcels_alone_and_closes_the_pair() {
        let f = fixture();
        f.workflow
            .ignore("analyst", &f.record, "same owner subdivision")
            .unwrap();
        assert_eq!(f.workflow.state(&f.record.id), ResolutionState::Ignored);
        assert_eq!(
            f.store.get_parcel(&ParcelId::from("p1")).unwrap().unwrap().status,
            ParcelStatus::Published
        );
        assert!(f
            .workflow
            .archive("admin", &f.record, &ParcelId::from("p1"), "")
            .is_err());
    }

    #[test]
    fn undecodable_resolution_fails_the_replay() {
        let f = fixture();
        f.audit
            .append(&AuditLogEntry::new(
                AuditActionType::ResolveOverlap,
                "admin",
                vec!["p1".to_string(), "p2".to_string()],
                json!({"resolution": {"overlap_record_id": "p1|p2", "action": "resolve"}}),
            ))
            .unwrap();
        let err = ResolutionWorkflow::new(f.store.clone(), f.audit.clone())
            .err()
            .expect("replay should fail");
        assert!(matches!(
            err,
            OverlapError::StoreUnavailable(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn ledger_is_rebuilt_from_the_audit_log() {
        let f = fixture();
        f.workflow
            .archive("admin", &f.record, &ParcelId::from("p1"), "")
            .unwrap();

        let rebuilt = ResolutionWorkflow::new(f.store.clone(), f.audit.clone()).unwrap();
        assert_eq!(rebuilt.state(&f.record.id), ResolutionState::Archived);
        assert_eq!(
            rebuilt.ledger().action(&f.record.id).unwrap().target_parcel_id,
            Some(ParcelId::from("p1"))
        );
    }
}
