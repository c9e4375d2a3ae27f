use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::audit_log::{AuditAppend, AuditLogWriter};
use super::backend::{CompleteStepRequest, NetworkError, StartStepRequest, VerificationBackend};
use super::domain::{
    ApplicationAuditState, ApplicationId, AuditTrailEntry, AuditTrailSummary, StepDetail,
    StepKey, StepPriority, StepStatus, StepStatusRecord, StepType, VerificationResult,
};
use super::registry::StepRegistry;

/// Caller supplied context for starting a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartStepOptions {
    pub reasoning: Option<String>,
    pub request_data: Option<Value>,
    pub processed_by: Option<String>,
    pub priority: Option<StepPriority>,
    /// Overrides the step type declared in the registry.
    pub step_type: Option<StepType>,
}

/// Caller supplied outcome for completing a step.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteStepOptions {
    pub status: StepStatus,
    pub reasoning: Option<String>,
    pub detail: Option<StepDetail>,
    pub verification_result: Option<VerificationResult>,
    pub confidence_score: Option<u8>,
    pub processing_duration_ms: Option<u64>,
    pub risk_flags: Vec<String>,
    pub compliance_checks: BTreeMap<String, bool>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub processing_method: Option<String>,
    pub processed_by: Option<String>,
    pub step_type: Option<StepType>,
}

impl CompleteStepOptions {
    pub fn new(status: StepStatus) -> Self {
        Self {
            status,
            reasoning: None,
            detail: None,
            verification_result: None,
            confidence_score: None,
            processing_duration_ms: None,
            risk_flags: Vec::new(),
            compliance_checks: BTreeMap::new(),
            error_code: None,
            error_message: None,
            processing_method: None,
            processed_by: None,
            step_type: None,
        }
    }
}

/// Behavior switches for the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Recompute the summary after every local write.
    pub auto_sync: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { auto_sync: true }
    }
}

/// Malformed input rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("status {0} cannot complete a step (expected completed, failed, cancelled or requires_review)")]
    NonTerminalStatus(StepStatus),
    #[error("unknown step status '{0}'")]
    UnknownStatus(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("confidence score {0} is outside 0-100")]
    ConfidenceOutOfRange(u8),
    #[error("{detail} detail does not belong to a {step_type:?} step")]
    DetailMismatch { detail: String, step_type: StepType },
}

/// Error surfaced to callers of the store and facade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Counts describing how a remote read changed the projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub appended: usize,
    pub replaced: usize,
}

type StepLock = Arc<tokio::sync::Mutex<()>>;

/// Projection of the latest status per step per application.
///
/// Local writes go through the [`AuditLogWriter`] and only touch the projection once the remote
/// acknowledges them. Remote reads are merged with last-write-wins by entry timestamp. Both paths
/// replace whole records under the projection lock, which is never held across an await.
pub struct StepStateStore<B> {
    writer: AuditLogWriter<B>,
    registry: Arc<StepRegistry>,
    projection: RwLock<HashMap<ApplicationId, ApplicationAuditState>>,
    step_locks: Mutex<HashMap<(ApplicationId, StepKey), StepLock>>,
    auto_sync: AtomicBool,
}

impl<B> StepStateStore<B>
where
    B: VerificationBackend,
{
    pub fn new(backend: Arc<B>, registry: Arc<StepRegistry>, options: StoreOptions) -> Self {
        Self {
            writer: AuditLogWriter::new(backend),
            registry,
            projection: RwLock::new(HashMap::new()),
            step_locks: Mutex::new(HashMap::new()),
            auto_sync: AtomicBool::new(options.auto_sync),
        }
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    pub fn writer(&self) -> &AuditLogWriter<B> {
        &self.writer
    }

    pub fn auto_sync(&self) -> bool {
        self.auto_sync.load(Ordering::Acquire)
    }

    pub fn set_auto_sync(&self, enabled: bool) {
        self.auto_sync.store(enabled, Ordering::Release);
    }

    /// Record a new attempt at a step. Dependency gating is not consulted.
    pub async fn start_step(
        &self,
        application_id: ApplicationId,
        step_key: &str,
        options: StartStepOptions,
    ) -> Result<StepStatusRecord, VerificationError> {
        let step_key = require_step_key(step_key)?;

        let lock = self.step_lock(application_id, &step_key);
        let _serialized = lock.lock().await;

        let request = StartStepRequest {
            application_id,
            step_name: step_key.clone(),
            reasoning: options.reasoning,
            request_data: options.request_data,
            processed_by: options.processed_by,
            priority: options.priority,
            step_type: Some(
                options
                    .step_type
                    .unwrap_or_else(|| self.registry.step_type_of(step_key.as_str())),
            ),
        };

        let entry = self.writer.append(AuditAppend::Start(request)).await?;
        info!(%application_id, %step_key, "verification step started");
        Ok(self.apply_local(entry))
    }

    /// Record the terminal outcome of a step.
    pub async fn complete_step(
        &self,
        application_id: ApplicationId,
        step_key: &str,
        options: CompleteStepOptions,
    ) -> Result<StepStatusRecord, VerificationError> {
        let step_key = require_step_key(step_key)?;
        if !options.status.is_terminal() {
            return Err(ValidationError::NonTerminalStatus(options.status).into());
        }
        if let Some(score) = options.confidence_score {
            if score > 100 {
                return Err(ValidationError::ConfidenceOutOfRange(score).into());
            }
        }

        let step_type = options
            .step_type
            .unwrap_or_else(|| self.registry.step_type_of(step_key.as_str()));
        if let Some(detail) = &options.detail {
            if !detail.matches(step_type) {
                return Err(ValidationError::DetailMismatch {
                    detail: detail_kind(detail).to_string(),
                    step_type,
                }
                .into());
            }
        }

        let lock = self.step_lock(application_id, &step_key);
        let _serialized = lock.lock().await;

        let request = CompleteStepRequest {
            application_id,
            step_name: step_key.clone(),
            status: options.status,
            reasoning: options.reasoning,
            response_data: options.detail,
            verification_result: options.verification_result,
            confidence_score: options.confidence_score,
            processing_duration_ms: options.processing_duration_ms,
            risk_flags: options.risk_flags,
            compliance_checks: options.compliance_checks,
            error_code: options.error_code,
            error_message: options.error_message,
            processing_method: options.processing_method,
            processed_by: options.processed_by,
            step_type: Some(step_type),
        };

        let entry = self.writer.append(AuditAppend::Complete(request)).await?;
        info!(%application_id, %step_key, status = %entry.status, "verification step completed");
        Ok(self.apply_local(entry))
    }

    pub fn get_step_status(
        &self,
        application_id: ApplicationId,
        step_key: &str,
    ) -> Option<StepStatusRecord> {
        self.read()
            .get(&application_id)
            .and_then(|state| state.steps.get(&StepKey::from(step_key)).cloned())
    }

    /// True when every dependency is currently `completed`. Advisory only.
    pub fn can_start_step(&self, application_id: ApplicationId, dependencies: &[StepKey]) -> bool {
        if dependencies.is_empty() {
            return true;
        }

        let guard = self.read();
        let Some(state) = guard.get(&application_id) else {
            return false;
        };
        dependencies
            .iter()
            .all(|dependency| state.status_of(dependency) == Some(StepStatus::Completed))
    }

    /// Read the remote audit trail without touching the projection.
    pub async fn fetch_remote(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<AuditTrailEntry>, NetworkError> {
        let entries = self
            .writer
            .backend()
            .list_audit_trail(application_id)
            .await?;

        let (owned, foreign): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|entry| entry.application_id == application_id);
        if !foreign.is_empty() {
            warn!(
                %application_id,
                ignored = foreign.len(),
                "remote returned entries for other applications"
            );
        }
        Ok(owned)
    }

    pub async fn fetch_remote_statuses(
        &self,
        application_id: ApplicationId,
    ) -> Result<BTreeMap<StepKey, StepStatus>, NetworkError> {
        self.writer
            .backend()
            .current_step_statuses(application_id)
            .await
    }

    /// Merge remote entries into the projection with last-write-wins by timestamp.
    pub fn merge_remote(
        &self,
        application_id: ApplicationId,
        mut entries: Vec<AuditTrailEntry>,
    ) -> MergeOutcome {
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let mut outcome = MergeOutcome::default();
        let mut guard = self.write();
        let state = guard
            .entry(application_id)
            .or_insert_with(|| ApplicationAuditState::new(application_id));

        for entry in entries {
            let step_key = entry.step_key.clone();
            let before = state.steps.get(&step_key).map(|record| record.updated_at);
            if state.apply(entry) {
                outcome.appended += 1;
            }
            let after = state.steps.get(&step_key).map(|record| record.updated_at);
            if before.is_some() && before != after {
                outcome.replaced += 1;
            }
        }
        state.recompute_summary();

        debug!(
            %application_id,
            appended = outcome.appended,
            replaced = outcome.replaced,
            "merged remote audit trail"
        );
        outcome
    }

    /// Pull the full remote audit trail and merge it. The projection is untouched on failure.
    pub async fn refresh(
        &self,
        application_id: ApplicationId,
    ) -> Result<ApplicationAuditState, VerificationError> {
        let entries = self.fetch_remote(application_id).await?;
        self.merge_remote(application_id, entries);
        Ok(self.state(application_id))
    }

    /// Snapshot of an application's projection, created on first access.
    pub fn state(&self, application_id: ApplicationId) -> ApplicationAuditState {
        if let Some(state) = self.read().get(&application_id) {
            return state.clone();
        }

        self.write()
            .entry(application_id)
            .or_insert_with(|| ApplicationAuditState::new(application_id))
            .clone()
    }

    /// Re-run the aggregator over the current projection.
    pub fn summarize(&self, application_id: ApplicationId) -> AuditTrailSummary {
        let mut guard = self.write();
        let state = guard
            .entry(application_id)
            .or_insert_with(|| ApplicationAuditState::new(application_id));
        state.recompute_summary();
        state.summary.clone()
    }

    pub fn summary(&self, application_id: ApplicationId) -> Option<AuditTrailSummary> {
        self.read()
            .get(&application_id)
            .map(|state| state.summary.clone())
    }

    /// Audit entries newest first, as timeline renderers expect.
    pub fn timeline(&self, application_id: ApplicationId) -> Vec<AuditTrailEntry> {
        self.read()
            .get(&application_id)
            .map(|state| state.entries.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn applications(&self) -> Vec<ApplicationId> {
        let mut ids: Vec<ApplicationId> = self.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Drop every cached projection. Remote history is unaffected.
    pub fn reset(&self) {
        self.write().clear();
        self.step_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn apply_local(&self, entry: AuditTrailEntry) -> StepStatusRecord {
        let record = StepStatusRecord::from(entry.clone());
        let application_id = entry.application_id;
        let auto_sync = self.auto_sync();

        let mut guard = self.write();
        let state = guard
            .entry(application_id)
            .or_insert_with(|| ApplicationAuditState::new(application_id));
        state.apply(entry);
        if auto_sync {
            state.recompute_summary();
        }
        record
    }

    fn step_lock(&self, application_id: ApplicationId, step_key: &StepKey) -> StepLock {
        self.step_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((application_id, step_key.clone()))
            .or_default()
            .clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ApplicationId, ApplicationAuditState>> {
        self.projection.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ApplicationId, ApplicationAuditState>> {
        self.projection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn require_step_key(step_key: &str) -> Result<StepKey, ValidationError> {
    let trimmed = step_key.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField("step_key"));
    }
    Ok(StepKey::from(trimmed))
}

fn detail_kind(detail: &StepDetail) -> &'static str {
    match detail {
        StepDetail::License { .. } => "license",
        StepDetail::Sanctions { .. } => "sanctions",
        StepDetail::Malpractice { .. } => "malpractice",
        StepDetail::Education { .. } => "education",
        StepDetail::Generic { .. } => "generic",
    }
}
