//! Parcelguard Overlap Engine
//!
//! Finds land parcels whose boundaries overlap, classifies how bad each
//! overlap is and drives what happens next:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         OVERLAP ENGINE                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌──────────────┐   snapshot   ┌─────────────┐   records            │
//! │  │ ParcelStore  │─────────────►│   Scanner   │──────────┐           │
//! │  └──────────────┘              │(rstar+rayon)│          │           │
//! │         ▲                      └─────────────┘          ▼           │
//! │         │ archive / delete                      ┌──────────────┐    │
//! │  ┌──────┴───────┐   decisions  ┌─────────────┐  │  Classifier  │    │
//! │  │  Resolution  │◄─────────────│  Service    │◄─│  (severity,  │    │
//! │  │  Workflow    │              │ (review     │  │   policy)    │    │
//! │  └──────┬───────┘              │  queue)     │  └──────────────┘    │
//! │         │ append               └──────┬──────┘                      │
//! │         ▼                             │ filters / stats             │
//! │  ┌──────────────┐                     ▼                             │
//! │  │  Audit Log   │              ┌─────────────┐                      │
//! │  │ (ledger src) │              │  Reporting  │                      │
//! │  └──────────────┘              └─────────────┘                      │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Pruned scanning**: R-tree candidate pairs, bounding-box reject, exact
//!   intersection only where boxes meet
//! - **Deterministic**: parallel and serial scans return identical, sorted output
//! - **Audited**: every automatic and manual decision is an append-only entry,
//!   and resolution state is replayed from those entries
//! - **Recoverable**: bad parcels and failed pairs become warnings, never
//!   aborted scans

pub mod audit;
pub mod auth;
pub mod classify;
pub mod config;
pub mod error;
pub mod intake;
pub mod model;
pub mod notify;
pub mod report;
pub mod resolution;
pub mod scanner;
pub mod service;
pub mod store;

mod spatial;


pub use audit::{AuditLog, JsonlAuditLog, MemoryAuditLog};
pub use auth::{Actor, Authorizer, Permission, RoleAuthorizer};
pub use classify::{
    classify, policy_action, PolicyAction, PolicyContext, Severity, SeverityThresholds,
};
pub use config::{CandidateStrategy, EngineConfig};
pub use error::{OverlapError, Result, StoreError};
pub use intake::SubmissionOutcome;
pub use model::{
    AuditActionType, AuditLogEntry, OverlapId, OverlapRecord, OwnerInfo, PairKey, Parcel,
    ParcelId, ParcelStatus, ResolutionAction, ResolutionKind, ResolutionState, UserId,
    SYSTEM_ACTOR,
};
pub use notify::{MemoryNotifier, NotificationEvent, Notifier, TracingNotifier};
pub use report::{OverlapFilter, OverlapStats, Ownership, ParcelSummary, ReportContext, SortKey};
pub use resolution::{ResolutionLedger, ResolutionWorkflow};
pub use scanner::{OverlapScanner, ScanReport, ScanStats, ScanWarning, ScanWarningKind};
pub use service::OverlapService;
pub use store::{InMemoryParcelStore, ParcelStore, StoreSnapshot, UserDirectory};

pub use parcelguard_geometry::{Boundary, CoordinateSpace};
