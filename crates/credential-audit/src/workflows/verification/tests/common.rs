use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use crate::workflows::verification::{
    ApplicationAuditState, ApplicationId, AuditLedger, AuditTrailEntry, ClientConfig,
    CompleteStepRequest, NetworkError, StartStepRequest, StepData, StepKey, StepRegistry,
    StepStatus, StepStateStore, StoreOptions, VerificationBackend, VerificationClient,
};

pub(super) const APPLICATION: ApplicationId = ApplicationId(12345);

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
}

/// Ledger whose clock advances one minute per entry, starting at [`base_time`].
pub(super) fn ticking_ledger() -> AuditLedger {
    let minutes = Arc::new(AtomicI64::new(0));
    AuditLedger::with_clock(move || {
        let offset = minutes.fetch_add(1, Ordering::SeqCst);
        base_time() + chrono::Duration::minutes(offset)
    })
}

/// Lets a test hold a remote read open until it decides to release it.
#[derive(Default)]
pub(super) struct ReadGate {
    pub(super) entered: Notify,
    pub(super) release: Notify,
}

/// Backend double: writes land in a real ledger, reads can be scripted, failed or gated.
pub(super) struct ScriptedBackend {
    pub(super) ledger: AuditLedger,
    remote_only: Mutex<Vec<AuditTrailEntry>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    gate: Option<Arc<ReadGate>>,
    reads: AtomicUsize,
}

impl ScriptedBackend {
    pub(super) fn new() -> Self {
        Self {
            ledger: ticking_ledger(),
            remote_only: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            gate: None,
            reads: AtomicUsize::new(0),
        }
    }

    pub(super) fn gated(gate: Arc<ReadGate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    /// Make the remote report an entry that was never written through this client.
    pub(super) fn push_remote(&self, entry: AuditTrailEntry) {
        self.remote_only.lock().unwrap().push(entry);
    }

    pub(super) fn fail_reads(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    pub(super) fn fail_writes(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub(super) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn remote_entries(&self, application_id: ApplicationId) -> Vec<AuditTrailEntry> {
        let mut entries = self.ledger.entries(application_id);
        entries.extend(
            self.remote_only
                .lock()
                .unwrap()
                .iter()
                .filter(|entry| entry.application_id == application_id)
                .cloned(),
        );
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        entries
    }

    fn check_writes(&self) -> Result<(), NetworkError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NetworkError::Unavailable("ledger offline".to_string()));
        }
        Ok(())
    }

    fn check_reads(&self) -> Result<(), NetworkError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(NetworkError::Unavailable("ledger offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VerificationBackend for ScriptedBackend {
    async fn start_step(&self, request: StartStepRequest) -> Result<AuditTrailEntry, NetworkError> {
        self.check_writes()?;
        self.ledger.start_step(request).await
    }

    async fn complete_step(
        &self,
        request: CompleteStepRequest,
    ) -> Result<AuditTrailEntry, NetworkError> {
        self.check_writes()?;
        self.ledger.complete_step(request).await
    }

    async fn list_audit_trail(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<AuditTrailEntry>, NetworkError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.check_reads()?;
        Ok(self.remote_entries(application_id))
    }

    async fn current_step_statuses(
        &self,
        application_id: ApplicationId,
    ) -> Result<BTreeMap<StepKey, StepStatus>, NetworkError> {
        self.check_reads()?;
        let state = ApplicationAuditState::replay(application_id, self.remote_entries(application_id));
        Ok(state.summary.current_step_statuses)
    }
}

pub(super) fn entry_at(
    step_key: &str,
    status: StepStatus,
    timestamp: DateTime<Utc>,
) -> AuditTrailEntry {
    AuditTrailEntry {
        application_id: APPLICATION,
        step_key: StepKey::from(step_key),
        timestamp,
        status,
        previous_status: None,
        changed_by: "remote-reviewer".to_string(),
        notes: None,
        data: StepData::default(),
    }
}

pub(super) fn store(backend: Arc<ScriptedBackend>) -> StepStateStore<ScriptedBackend> {
    StepStateStore::new(
        backend,
        Arc::new(StepRegistry::standard()),
        StoreOptions::default(),
    )
}

pub(super) fn client(
    backend: Arc<ScriptedBackend>,
    auto_sync: bool,
) -> VerificationClient<ScriptedBackend> {
    VerificationClient::new(
        backend,
        Arc::new(StepRegistry::standard()),
        ClientConfig {
            auto_sync,
            sync_interval: Duration::from_secs(30),
        },
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
