//! Verification-step audit trail for provider credentialing applications.
//!
//! Every step transition is appended to a remote audit log through a [`VerificationBackend`];
//! the [`StepStateStore`] keeps a local projection of the latest status per step, and the
//! [`VerificationClient`] is the surface the rest of the system drives.

pub mod audit_log;
pub mod backend;
pub mod domain;
pub mod export;
pub mod facade;
pub mod http;
pub mod ledger;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod summary;
pub mod views;

#[cfg(test)]
mod tests;

pub use audit_log::{AuditAppend, AuditLogWriter};
pub use backend::{CompleteStepRequest, NetworkError, StartStepRequest, VerificationBackend};
pub use domain::{
    ApplicationAuditState, ApplicationId, AuditTrailEntry, AuditTrailSummary, OverallStatus,
    StepData, StepDetail, StepKey, StepPriority, StepStatus, StepStatusRecord, StepType,
    VerificationResult,
};
pub use export::{AuditExportError, AuditTrailExporter};
pub use facade::{ClientConfig, ClientError, ClientOperation, ClientStatus, VerificationClient};
pub use http::HttpVerificationBackend;
pub use ledger::AuditLedger;
pub use registry::{StepRegistry, VerificationStepDefinition};
pub use router::verification_router;
pub use scheduler::{SchedulerError, SyncPhase, SyncScheduler, SyncTarget};
pub use store::{
    CompleteStepOptions, MergeOutcome, StartStepOptions, StepStateStore, StoreOptions,
    ValidationError, VerificationError,
};
pub use views::{StepOverviewRow, TimelineEntryView};
