use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use super::backend::{NetworkError, VerificationBackend};
use super::domain::{
    ApplicationAuditState, ApplicationId, AuditTrailEntry, AuditTrailSummary, StepKey,
    StepStatus, StepStatusRecord,
};
use super::registry::StepRegistry;
use super::scheduler::{SchedulerError, SyncPhase, SyncScheduler, SyncTarget};
use super::store::{
    CompleteStepOptions, StartStepOptions, StepStateStore, StoreOptions, VerificationError,
};
use super::views::{StepOverviewRow, TimelineEntryView};

/// Client-side settings for the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub auto_sync: bool,
    pub sync_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval: Duration::from_secs(30),
        }
    }
}

/// Operation whose failure populated the facade's error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientOperation {
    StartStep,
    CompleteStep,
    RefreshSteps,
}

/// User-visible failure with enough context for a retry action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientError {
    pub operation: ClientOperation,
    pub application_id: ApplicationId,
    pub message: String,
}

/// Loading and error flags exposed to renderers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    pub loading: bool,
    pub error: Option<ClientError>,
}

type PollResult = (
    Result<Vec<AuditTrailEntry>, NetworkError>,
    Result<BTreeMap<StepKey, StepStatus>, NetworkError>,
);

struct ClientCore<B> {
    store: StepStateStore<B>,
    refreshing: AtomicUsize,
    error: Mutex<Option<ClientError>>,
}

struct RefreshGuard<'a>(&'a AtomicUsize);

impl<'a> RefreshGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<B> ClientCore<B>
where
    B: VerificationBackend,
{
    fn error(&self) -> MutexGuard<'_, Option<ClientError>> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(
        &self,
        operation: ClientOperation,
        application_id: ApplicationId,
        error: &VerificationError,
    ) {
        *self.error() = Some(ClientError {
            operation,
            application_id,
            message: error.to_string(),
        });
    }

    fn clear_refresh_error(&self, application_id: ApplicationId) {
        let mut guard = self.error();
        if matches!(
            guard.as_ref(),
            Some(error) if error.operation == ClientOperation::RefreshSteps
                && error.application_id == application_id
        ) {
            *guard = None;
        }
    }

    /// Compare the remote's status map with the local projection and recompute the summary.
    fn reconcile_summary(
        &self,
        application_id: ApplicationId,
        remote: Result<BTreeMap<StepKey, StepStatus>, NetworkError>,
    ) -> AuditTrailSummary {
        let summary = self.store.summarize(application_id);
        match remote {
            Ok(remote) => {
                let drift: Vec<String> = remote
                    .iter()
                    .filter(|(key, status)| summary.current_step_statuses.get(*key) != Some(*status))
                    .map(|(key, status)| format!("{key}={status}"))
                    .collect();
                if !drift.is_empty() {
                    warn!(
                        %application_id,
                        drift = %drift.join(","),
                        "remote step statuses differ from local projection"
                    );
                }
            }
            Err(error) => {
                warn!(%application_id, %error, "summary refresh failed; keeping local summary");
            }
        }
        summary
    }
}

#[async_trait]
impl<B> SyncTarget for ClientCore<B>
where
    B: VerificationBackend,
{
    type Poll = PollResult;

    async fn poll(&self, application_id: ApplicationId) -> PollResult {
        let _loading = RefreshGuard::enter(&self.refreshing);
        let entries = self.store.fetch_remote(application_id).await;
        let statuses = self.store.fetch_remote_statuses(application_id).await;
        (entries, statuses)
    }

    fn apply(&self, application_id: ApplicationId, (entries, statuses): PollResult) {
        match entries {
            Ok(entries) => {
                self.store.merge_remote(application_id, entries);
                self.clear_refresh_error(application_id);
            }
            Err(error) => {
                warn!(%application_id, %error, "background refresh failed");
                self.record_error(
                    ClientOperation::RefreshSteps,
                    application_id,
                    &VerificationError::Network(error),
                );
            }
        }
        self.reconcile_summary(application_id, statuses);
    }
}

/// The surface other subsystems use to read and drive verification steps.
pub struct VerificationClient<B> {
    core: Arc<ClientCore<B>>,
    scheduler: SyncScheduler,
    sync_interval: Duration,
    watched: Mutex<Option<ApplicationId>>,
}

impl<B> VerificationClient<B>
where
    B: VerificationBackend,
{
    pub fn new(backend: Arc<B>, registry: Arc<StepRegistry>, config: ClientConfig) -> Self {
        let store = StepStateStore::new(
            backend,
            registry,
            StoreOptions {
                auto_sync: config.auto_sync,
            },
        );

        Self {
            core: Arc::new(ClientCore {
                store,
                refreshing: AtomicUsize::new(0),
                error: Mutex::new(None),
            }),
            scheduler: SyncScheduler::new(),
            sync_interval: config.sync_interval,
            watched: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &StepStateStore<B> {
        &self.core.store
    }

    pub fn registry(&self) -> &StepRegistry {
        self.core.store.registry()
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    pub fn auto_sync(&self) -> bool {
        self.core.store.auto_sync()
    }

    pub async fn start_step(
        &self,
        application_id: ApplicationId,
        step_key: &str,
        options: StartStepOptions,
    ) -> Result<StepStatusRecord, VerificationError> {
        self.clear_error();
        self.core
            .store
            .start_step(application_id, step_key, options)
            .await
            .inspect_err(|error| {
                self.core
                    .record_error(ClientOperation::StartStep, application_id, error)
            })
    }

    pub async fn complete_step(
        &self,
        application_id: ApplicationId,
        step_key: &str,
        options: CompleteStepOptions,
    ) -> Result<StepStatusRecord, VerificationError> {
        self.clear_error();
        self.core
            .store
            .complete_step(application_id, step_key, options)
            .await
            .inspect_err(|error| {
                self.core
                    .record_error(ClientOperation::CompleteStep, application_id, error)
            })
    }

    /// Pull the remote audit trail into the projection.
    ///
    /// On failure the error state is populated and the last known-good projection is kept.
    pub async fn refresh_steps(
        &self,
        application_id: ApplicationId,
    ) -> Result<ApplicationAuditState, VerificationError> {
        self.clear_error();
        let _loading = RefreshGuard::enter(&self.core.refreshing);
        self.core
            .store
            .refresh(application_id)
            .await
            .inspect_err(|error| {
                warn!(%application_id, %error, "refresh failed");
                self.core
                    .record_error(ClientOperation::RefreshSteps, application_id, error)
            })
    }

    /// Recompute the summary, cross-checking the remote status map. Failures are only logged.
    pub async fn refresh_summary(&self, application_id: ApplicationId) -> AuditTrailSummary {
        let remote = self.core.store.fetch_remote_statuses(application_id).await;
        self.core.reconcile_summary(application_id, remote)
    }

    pub fn get_step_status(
        &self,
        application_id: ApplicationId,
        step_key: &str,
    ) -> Option<StepStatusRecord> {
        self.core.store.get_step_status(application_id, step_key)
    }

    pub fn is_step_completed(&self, application_id: ApplicationId, step_key: &str) -> bool {
        self.status_is(application_id, step_key, StepStatus::Completed)
    }

    pub fn is_step_in_progress(&self, application_id: ApplicationId, step_key: &str) -> bool {
        self.status_is(application_id, step_key, StepStatus::InProgress)
    }

    /// Advisory gate using the registry's declared dependencies.
    pub fn can_start_step(&self, application_id: ApplicationId, step_key: &str) -> bool {
        let dependencies = self.registry().dependencies_of(step_key);
        self.core.store.can_start_step(application_id, &dependencies)
    }

    /// Advisory gate against an explicit dependency list.
    pub fn can_start_step_with(
        &self,
        application_id: ApplicationId,
        dependencies: &[StepKey],
    ) -> bool {
        self.core.store.can_start_step(application_id, dependencies)
    }

    pub fn summary(&self, application_id: ApplicationId) -> Option<AuditTrailSummary> {
        self.core.store.summary(application_id)
    }

    pub fn state(&self, application_id: ApplicationId) -> ApplicationAuditState {
        self.core.store.state(application_id)
    }

    /// Entries newest first.
    pub fn timeline(&self, application_id: ApplicationId) -> Vec<AuditTrailEntry> {
        self.core.store.timeline(application_id)
    }

    pub fn timeline_views(&self, application_id: ApplicationId) -> Vec<TimelineEntryView> {
        let registry = self.registry();
        self.timeline(application_id)
            .iter()
            .map(|entry| TimelineEntryView::from_entry(entry, registry))
            .collect()
    }

    /// One row per registered step with its current status and advisory gate.
    pub fn step_overview(&self, application_id: ApplicationId) -> Vec<StepOverviewRow> {
        let state = self.state(application_id);
        self.registry()
            .definitions()
            .iter()
            .map(|definition| {
                let record = state.steps.get(&StepKey::from(definition.key));
                StepOverviewRow::new(
                    definition,
                    record,
                    self.can_start_step(application_id, definition.key),
                )
            })
            .collect()
    }

    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            loading: self.core.refreshing.load(Ordering::Acquire) > 0,
            error: self.core.error().clone(),
        }
    }

    pub fn clear_error(&self) {
        *self.core.error() = None;
    }

    /// Track an application; polls it in the background while auto-sync is enabled.
    pub fn watch(&self, application_id: ApplicationId) -> Result<(), SchedulerError> {
        *self.lock_watched() = Some(application_id);
        if self.core.store.auto_sync() {
            self.scheduler
                .start(Arc::clone(&self.core), application_id, self.sync_interval)?;
        }
        Ok(())
    }

    /// Toggle auto-sync; turning it off cancels polling synchronously.
    pub fn set_auto_sync(&self, enabled: bool) -> Result<(), SchedulerError> {
        if !enabled {
            self.disable_auto_sync();
            return Ok(());
        }

        self.core.store.set_auto_sync(true);
        let watched = *self.lock_watched();
        match watched {
            Some(application_id) => self.scheduler.start(
                Arc::clone(&self.core),
                application_id,
                self.sync_interval,
            ),
            None => Ok(()),
        }
    }

    pub fn enable_auto_sync(&self) -> Result<(), SchedulerError> {
        self.set_auto_sync(true)
    }

    pub fn disable_auto_sync(&self) {
        self.core.store.set_auto_sync(false);
        self.scheduler.stop();
    }

    pub fn sync_phase(&self) -> SyncPhase {
        self.scheduler.phase()
    }

    /// Stop polling for good and drop cached projections.
    pub fn teardown(&self) {
        self.scheduler.shutdown();
        *self.lock_watched() = None;
        self.core.store.reset();
        self.clear_error();
    }

    fn status_is(&self, application_id: ApplicationId, step_key: &str, status: StepStatus) -> bool {
        self.get_step_status(application_id, step_key)
            .map(|record| record.status == status)
            .unwrap_or(false)
    }

    fn lock_watched(&self) -> MutexGuard<'_, Option<ApplicationId>> {
        self.watched.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
