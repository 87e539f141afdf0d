//! Creation-time overlap check for newly submitted parcels.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::AuditLog;
use crate::classify::{policy_action, PolicyAction, PolicyContext};
use crate::error::Result;
use crate::model::{AuditActionType, AuditLogEntry, OverlapRecord, Parcel, ParcelId, SYSTEM_ACTOR};
use crate::notify::{NotificationEvent, Notifier};
use crate::scanner::{OverlapScanner, ScanWarning};
use crate::store::{ParcelStore, UserDirectory};

/// Collaborators the intake check works against.
pub struct Intake<'a> {
    pub store: &'a dyn ParcelStore,
    pub directory: &'a dyn UserDirectory,
    pub audit: &'a dyn AuditLog,
    pub notifier: &'a dyn Notifier,
    pub scanner: &'a OverlapScanner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub parcel_id: ParcelId,
    /// `Allow`: stored. `Warn`: stored and flagged. `AutoReject`: deleted.
    pub decision: PolicyAction,
    /// Reportable overlaps with live parcels, worst first.
    pub overlaps: Vec<OverlapRecord>,
    pub warnings: Vec<ScanWarning>,
}

impl SubmissionOutcome {
    pub fn worst(&self) -> Option<&OverlapRecord> {
        self.overlaps.first()
    }

    pub fn is_rejected(&self) -> bool {
        self.decision == PolicyAction::AutoReject
    }
}

impl Intake<'_> {
    /// Store `parcel` and apply the submission policy to its worst overlap.
    ///
    /// A blocked submission is hard-deleted, audited as
    /// `AUTO_DELETE_OVERLAP` and announced to the submitter and every admin.
    /// If that audit write fails the parcel stays deleted and the error is
    /// returned.
    pub fn submit(&self, submitter_id: &str, parcel: Parcel) -> Result<SubmissionOutcome> {
        let existing = self.store.list_eligible_parcels()?;
        let report = self.scanner.scan_candidate(&parcel, &existing)?;
        let parcel_id = parcel.id.clone();

        let decision = report
            .records
            .first()
            .map(|worst| policy_action(worst.severity, PolicyContext::Submission))
            .unwrap_or(PolicyAction::Allow);

        let previous = self.store.get_parcel(&parcel_id)?;
        self.store.insert_parcel(parcel)?;

        let outcome = SubmissionOutcome {
            parcel_id,
            decision,
            overlaps: report.records,
            warnings: report.warnings,
        };

        match decision {
            PolicyAction::Allow => {
                tracing::info!(parcel_id = %outcome.parcel_id, "submission accepted");
            }
            PolicyAction::Warn => self.flag_for_review(submitter_id, &outcome, previous)?,
            PolicyAction::AutoReject => self.auto_reject(submitter_id, &outcome, previous)?,
        }
        Ok(outcome)
    }

    fn flag_for_review(
        &self,
        submitter_id: &str,
        outcome: &SubmissionOutcome,
        previous: Option<Parcel>,
    ) -> Result<()> {
        let entry = AuditLogEntry::new(
            AuditActionType::OverlapFlaggedForReview,
            SYSTEM_ACTOR,
            subjects(outcome),
            json!({
                "submitter_id": submitter_id,
                "overlap_ids": outcome.overlaps.iter().map(|r| &r.id).collect::<Vec<_>>(),
                "max_overlap_percentage": outcome.worst().map(|r| r.overlap_percentage),
            }),
        );
        if let Err(err) = self.audit.append(&entry) {
            // Undo the insert so the store never holds an unaudited flag.
            self.undo_insert(&outcome.parcel_id, previous);
            return Err(err.into());
        }
        tracing::info!(
            parcel_id = %outcome.parcel_id,
            overlaps = outcome.overlaps.len(),
            "submission accepted and flagged for review"
        );
        Ok(())
    }

    fn auto_reject(
        &self,
        submitter_id: &str,
        outcome: &SubmissionOutcome,
        previous: Option<Parcel>,
    ) -> Result<()> {
        let Some(worst) = outcome.worst() else {
            return Ok(());
        };
        let conflicting = worst
            .id
            .other(&outcome.parcel_id)
            .cloned()
            .unwrap_or_else(|| worst.parcel_b_id.clone());

        self.undo_insert(&outcome.parcel_id, previous);

        let entry = AuditLogEntry::new(
            AuditActionType::AutoDeleteOverlap,
            SYSTEM_ACTOR,
            subjects(outcome),
            json!({
                "submitter_id": submitter_id,
                "rejected_parcel_id": outcome.parcel_id,
                "conflicting_parcel_id": conflicting,
                "overlap_percentage": worst.overlap_percentage,
                "overlap_area_m2": worst.overlap_area_m2,
                "severity": worst.severity,
                "same_owner": worst.same_owner,
            }),
        );
        self.audit.append(&entry)?;
        tracing::warn!(
            parcel_id = %outcome.parcel_id,
            conflicting_parcel_id = %conflicting,
            overlap_percentage = worst.overlap_percentage,
            "submission auto-rejected"
        );

        let admin_ids = match self.directory.admin_ids() {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(error = %err, "admin lookup failed, notifying submitter only");
                Vec::new()
            }
        };
        let event = NotificationEvent::OverlapAutoRejected {
            submitter_id: submitter_id.to_string(),
            admin_ids,
            overlap_percentage: worst.overlap_percentage,
            rejected_parcel_id: outcome.parcel_id.clone(),
            conflicting_parcel_id: conflicting,
        };
        if let Err(err) = self.notifier.notify(&event) {
            tracing::warn!(parcel_id = %outcome.parcel_id, error = %err, "notification dropped");
        }
        Ok(())
    }

    /// Remove the submitted parcel, putting back what it replaced, if anything.
    fn undo_insert(&self, parcel_id: &ParcelId, previous: Option<Parcel>) {
        let outcome = match previous {
            Some(previous) => self.store.insert_parcel(previous),
            None => self.store.remove_parcel(parcel_id).map(|_| ()),
        };
        if let Err(err) = outcome {
            tracing::error!(parcel_id = %parcel_id, error = %err, "failed to remove submitted parcel");
        }
    }
}

/// The submitted parcel first, then every parcel it overlaps.
fn subjects(outcome: &SubmissionOutcome) -> Vec<String> {
    std::iter::once(outcome.parcel_id.to_string())
        .chain(
            outcome
                .overlaps
                .iter()
                .filter_map(|r| r.id.other(&outcome.parcel_id))
                .map(ToString::to_string),
        )
        .collect()
}
