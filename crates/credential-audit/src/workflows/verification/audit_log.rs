use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::backend::{CompleteStepRequest, NetworkError, StartStepRequest, VerificationBackend};
use super::domain::{ApplicationId, AuditTrailEntry, StepKey, StepStatus};

/// A transition waiting to be appended to the remote audit log.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditAppend {
    Start(StartStepRequest),
    Complete(CompleteStepRequest),
}

impl AuditAppend {
    pub fn application_id(&self) -> ApplicationId {
        match self {
            AuditAppend::Start(request) => request.application_id,
            AuditAppend::Complete(request) => request.application_id,
        }
    }

    pub fn step_key(&self) -> &StepKey {
        match self {
            AuditAppend::Start(request) => &request.step_name,
            AuditAppend::Complete(request) => &request.step_name,
        }
    }

    pub fn expected_status(&self) -> StepStatus {
        match self {
            AuditAppend::Start(_) => StepStatus::InProgress,
            AuditAppend::Complete(request) => request.status,
        }
    }
}

/// Single writer of verification history.
///
/// Only appends exist; an acknowledged entry is never revisited.
pub struct AuditLogWriter<B> {
    backend: Arc<B>,
    appended: AtomicU64,
}

impl<B> AuditLogWriter<B>
where
    B: VerificationBackend,
{
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            appended: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Number of entries acknowledged by the remote since this writer was created.
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// Append a transition and return the entry the remote acknowledged.
    pub async fn append(&self, append: AuditAppend) -> Result<AuditTrailEntry, NetworkError> {
        let application_id = append.application_id();
        let step_key = append.step_key().clone();
        let expected_status = append.expected_status();

        let entry = match append {
            AuditAppend::Start(request) => self.backend.start_step(request).await?,
            AuditAppend::Complete(request) => self.backend.complete_step(request).await?,
        };

        if entry.application_id != application_id
            || entry.step_key != step_key
            || entry.status != expected_status
        {
            warn!(
                %application_id,
                %step_key,
                expected = %expected_status,
                received = %entry.status,
                "remote acknowledged a different transition"
            );
            return Err(NetworkError::InvalidResponse(format!(
                "expected {expected_status} for {application_id}/{step_key}, received {} for {}/{}",
                entry.status, entry.application_id, entry.step_key
            )));
        }

        self.appended.fetch_add(1, Ordering::Relaxed);
        debug!(%application_id, %step_key, status = %entry.status, "audit entry appended");
        Ok(entry)
    }
}
