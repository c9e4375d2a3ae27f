use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::backend::{CompleteStepRequest, NetworkError, StartStepRequest, VerificationBackend};
use super::domain::{ApplicationId, AuditTrailEntry, StepData, StepKey, StepStatus};

const SYSTEM_ACTOR: &str = "system";

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// In-memory append-only audit store implementing the remote contract.
///
/// Timestamps are strictly increasing per application even when the clock stalls or steps
/// backwards, so entries for a step are always totally ordered.
#[derive(Clone)]
pub struct AuditLedger {
    entries: Arc<Mutex<HashMap<ApplicationId, Vec<AuditTrailEntry>>>>,
    clock: Clock,
}

impl Default for AuditLedger {
    fn default() -> Self {
        Self::with_clock(Utc::now)
    }
}

impl std::fmt::Debug for AuditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLedger")
            .field("applications", &self.lock().len())
            .finish()
    }
}

impl AuditLedger {
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(clock),
        }
    }

    /// Number of entries recorded for an application.
    pub fn entry_count(&self, application_id: ApplicationId) -> usize {
        self.lock()
            .get(&application_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn entries(&self, application_id: ApplicationId) -> Vec<AuditTrailEntry> {
        self.lock()
            .get(&application_id)
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ApplicationId, Vec<AuditTrailEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(
        &self,
        application_id: ApplicationId,
        step_key: StepKey,
        status: StepStatus,
        changed_by: Option<String>,
        notes: Option<String>,
        data: StepData,
    ) -> AuditTrailEntry {
        let mut guard = self.lock();
        let log = guard.entry(application_id).or_default();

        let mut timestamp = (self.clock)();
        if let Some(last) = log.last() {
            if timestamp <= last.timestamp {
                timestamp = last.timestamp + Duration::microseconds(1);
            }
        }

        let previous_status = log
            .iter()
            .rev()
            .find(|entry| entry.step_key == step_key)
            .map(|entry| entry.status);

        let entry = AuditTrailEntry {
            application_id,
            step_key,
            timestamp,
            status,
            previous_status,
            changed_by: changed_by.unwrap_or_else(|| SYSTEM_ACTOR.to_string()),
            notes,
            data,
        };
        log.push(entry.clone());
        entry
    }
}

fn reject(message: impl Into<String>) -> NetworkError {
    NetworkError::Rejected {
        status: 422,
        message: message.into(),
    }
}

fn validate_step_name(step_name: &StepKey) -> Result<(), NetworkError> {
    if step_name.as_str().trim().is_empty() {
        return Err(reject("step_name is required"));
    }
    Ok(())
}

#[async_trait]
impl VerificationBackend for AuditLedger {
    async fn start_step(&self, request: StartStepRequest) -> Result<AuditTrailEntry, NetworkError> {
        validate_step_name(&request.step_name)?;

        let data = StepData {
            step_type: request.step_type,
            priority: request.priority,
            request: request.request_data,
            ..StepData::default()
        };

        Ok(self.append(
            request.application_id,
            request.step_name,
            StepStatus::InProgress,
            request.processed_by,
            request.reasoning,
            data,
        ))
    }

    async fn complete_step(
        &self,
        request: CompleteStepRequest,
    ) -> Result<AuditTrailEntry, NetworkError> {
        validate_step_name(&request.step_name)?;
        if !request.status.is_terminal() {
            return Err(reject(format!(
                "status {} cannot complete a step",
                request.status
            )));
        }
        if let Some(score) = request.confidence_score {
            if score > 100 {
                return Err(reject(format!("confidence_score {score} exceeds 100")));
            }
        }

        let data = StepData {
            step_type: request.step_type,
            verification_result: request.verification_result,
            confidence_score: request.confidence_score,
            processing_duration_ms: request.processing_duration_ms,
            risk_flags: request.risk_flags,
            compliance_checks: request.compliance_checks,
            error_code: request.error_code,
            error_message: request.error_message,
            processing_method: request.processing_method,
            detail: request.response_data,
            ..StepData::default()
        };

        Ok(self.append(
            request.application_id,
            request.step_name,
            request.status,
            request.processed_by,
            request.reasoning,
            data,
        ))
    }

    async fn list_audit_trail(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<AuditTrailEntry>, NetworkError> {
        Ok(self.entries(application_id))
    }

    async fn current_step_statuses(
        &self,
        application_id: ApplicationId,
    ) -> Result<BTreeMap<StepKey, StepStatus>, NetworkError> {
        let statuses = self
            .lock()
            .get(&application_id)
            .map(|log| {
                log.iter()
                    .map(|entry| (entry.step_key.clone(), entry.status))
                    .collect()
            })
            .unwrap_or_default();
        Ok(statuses)
    }
}
