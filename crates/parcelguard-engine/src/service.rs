//! Admin-facing surface: scans, the review queue and resolution actions.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::audit::AuditLog;
use crate::auth::{Actor, Authorizer, Permission, RoleAuthorizer};
use crate::classify::PolicyAction;
use crate::config::EngineConfig;
use crate::error::{OverlapError, Result};
use crate::intake::{Intake, SubmissionOutcome};
use crate::model::{
    AuditActionType, AuditLogEntry, OverlapId, OverlapRecord, Parcel, ParcelId,
    ResolutionAction, ResolutionState,
};
use crate::notify::{Notifier, TracingNotifier};
use crate::report::{filter_overlaps, OverlapFilter, OverlapStats, ReportContext};
use crate::resolution::{ResolutionLedger, ResolutionWorkflow};
use crate::scanner::{sort_records, OverlapScanner, ScanReport};
use crate::store::{ParcelStore, UserDirectory};

pub struct OverlapService {
    store: Arc<dyn ParcelStore>,
    directory: Arc<dyn UserDirectory>,
    audit: Arc<dyn AuditLog>,
    notifier: Arc<dyn Notifier>,
    authorizer: Arc<dyn Authorizer>,
    scanner: OverlapScanner,
    workflow: ResolutionWorkflow,
    /// Output of the latest scan plus flagged submissions since.
    current: RwLock<Vec<OverlapRecord>>,
}

impl OverlapService {
    /// Validates `config` and rebuilds resolution state from `audit`.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ParcelStore>,
        directory: Arc<dyn UserDirectory>,
        audit: Arc<dyn AuditLog>,
    ) -> Result<Self> {
        config.validate()?;
        let workflow = ResolutionWorkflow::new(store.clone(), audit.clone())?;
        Ok(Self {
            store,
            directory,
            audit,
            notifier: Arc::new(TracingNotifier),
            authorizer: Arc::new(RoleAuthorizer::default()),
            scanner: OverlapScanner::new(config),
            workflow,
            current: RwLock::new(Vec::new()),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        self.scanner.config()
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    /// Scan every eligible parcel and replace the current overlap set.
    pub fn run_scan(&self, actor: &Actor) -> Result<ScanReport> {
        self.authorizer.authorize(actor, Permission::RunScan)?;
        let parcels = self.store.list_eligible_parcels()?;
        let report = self.scanner.scan(&parcels);
        *self.current.write() = report.records.clone();
        Ok(report)
    }

    /// Creation-time check for a new parcel.
    pub fn submit_parcel(&self, submitter_id: &str, parcel: Parcel) -> Result<SubmissionOutcome> {
        let outcome = Intake {
            store: self.store.as_ref(),
            directory: self.directory.as_ref(),
            audit: self.audit.as_ref(),
            notifier: self.notifier.as_ref(),
            scanner: &self.scanner,
        }
        .submit(submitter_id, parcel)?;

        if outcome.decision == PolicyAction::Warn {
            let mut current = self.current.write();
            current.retain(|r| !outcome.overlaps.iter().any(|o| o.id == r.id));
            current.extend(outcome.overlaps.iter().cloned());
            sort_records(&mut current);
        }
        Ok(outcome)
    }

    // ========================================================================
    // Review queue
    // ========================================================================

    pub fn list_overlaps(&self, filter: &OverlapFilter) -> Result<Vec<OverlapRecord>> {
        let current = self.current.read();
        let context = if filter.needs_context() {
            ReportContext::build(self.store.as_ref(), &current)?
        } else {
            ReportContext::empty()
        };
        Ok(filter_overlaps(
            &current,
            filter,
            &context,
            &self.workflow.ledger(),
        ))
    }

    /// Display data (titles, owners) for the parcels in `records`.
    pub fn report_context(&self, records: &[OverlapRecord]) -> Result<ReportContext> {
        ReportContext::build(self.store.as_ref(), records)
    }

    pub fn overlap(&self, id: &OverlapId) -> Option<OverlapRecord> {
        self.current.read().iter().find(|r| &r.id == id).cloned()
    }

    pub fn stats(&self) -> OverlapStats {
        OverlapStats::compute(
            &self.current.read(),
            &self.config().thresholds,
            &self.workflow.ledger(),
        )
    }

    pub fn resolution_state(&self, id: &OverlapId) -> ResolutionState {
        self.workflow.state(id)
    }

    pub fn ledger(&self) -> ResolutionLedger {
        self.workflow.ledger()
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    pub fn archive(
        &self,
        actor: &Actor,
        overlap_id: &OverlapId,
        target: &ParcelId,
        reason: &str,
    ) -> Result<ResolutionAction> {
        let record = self.authorized_record(actor, overlap_id)?;
        self.workflow.archive(&actor.id, &record, target, reason)
    }

    pub fn delete(
        &self,
        actor: &Actor,
        overlap_id: &OverlapId,
        target: &ParcelId,
        reason: &str,
    ) -> Result<ResolutionAction> {
        let record = self.authorized_record(actor, overlap_id)?;
        self.workflow.delete(&actor.id, &record, target, reason)
    }

    /// Accept an overlap as legitimate without touching either parcel.
    pub fn ignore(
        &self,
        actor: &Actor,
        overlap_id: &OverlapId,
        reason: &str,
    ) -> Result<ResolutionAction> {
        let record = self.authorized_record(actor, overlap_id)?;
        self.workflow.ignore(&actor.id, &record, reason)
    }

    fn authorized_record(&self, actor: &Actor, overlap_id: &OverlapId) -> Result<OverlapRecord> {
        self.authorizer.authorize(actor, Permission::ResolveOverlap)?;
        self.overlap(overlap_id)
            .ok_or_else(|| OverlapError::OverlapNotFound(overlap_id.clone()))
    }

    // ========================================================================
    // Audit
    // ========================================================================

    /// Newest first; all types when `action_types` is empty.
    pub fn get_audit_history(
        &self,
        action_types: &[AuditActionType],
        limit: Option<usize>,
    ) -> Result<Vec<AuditLogEntry>> {
        Ok(self.audit.history(action_types, limit)?)
    }
}
