use super::common::*;
use std::sync::Arc;

use crate::workflows::verification::registry::{
    COMMITTEE_REVIEW, EDUCATION_VERIFICATION, LICENSE_VERIFICATION,
};
use crate::workflows::verification::{
    ClientOperation, CompleteStepOptions, OverallStatus, SchedulerError, StartStepOptions,
    StepKey, StepStatus, SyncPhase, VerificationError, VerificationResult,
};

#[tokio::test]
async fn starting_a_step_marks_it_in_progress() {
    let client = client(Arc::new(ScriptedBackend::new()), false);

    let record = client
        .start_step(APPLICATION, LICENSE_VERIFICATION, StartStepOptions::default())
        .await
        .expect("start succeeds");

    assert_eq!(record.status, StepStatus::InProgress);
    assert!(client.is_step_in_progress(APPLICATION, LICENSE_VERIFICATION));
    assert!(!client.is_step_completed(APPLICATION, LICENSE_VERIFICATION));
    assert_eq!(
        client
            .get_step_status(APPLICATION, LICENSE_VERIFICATION)
            .map(|record| record.status),
        Some(StepStatus::InProgress)
    );
}

#[tokio::test]
async fn completing_a_verified_step_recomputes_the_summary() {
    let client = client(Arc::new(ScriptedBackend::new()), true);
    client
        .start_step(APPLICATION, LICENSE_VERIFICATION, StartStepOptions::default())
        .await
        .expect("start");

    let mut options = CompleteStepOptions::new(StepStatus::Completed);
    options.verification_result = Some(VerificationResult::Verified);
    options.confidence_score = Some(98);
    client
        .complete_step(APPLICATION, LICENSE_VERIFICATION, options)
        .await
        .expect("complete");

    assert!(client.is_step_completed(APPLICATION, LICENSE_VERIFICATION));
    let summary = client.summary(APPLICATION).expect("summary available");
    assert_eq!(summary.total_entries, 2);
    assert_eq!(
        summary.current_step_statuses.get(&StepKey::from(LICENSE_VERIFICATION)),
        Some(&StepStatus::Completed)
    );
    assert_eq!(summary.overall_status, OverallStatus::Completed);
}

#[tokio::test]
async fn registry_dependencies_drive_can_start() {
    let client = client(Arc::new(ScriptedBackend::new()), false);

    assert!(client.can_start_step(APPLICATION, LICENSE_VERIFICATION));
    assert!(!client.can_start_step(APPLICATION, EDUCATION_VERIFICATION));
    assert!(client.can_start_step_with(APPLICATION, &[]));

    client
        .start_step(APPLICATION, LICENSE_VERIFICATION, StartStepOptions::default())
        .await
        .expect("start");
    client
        .complete_step(
            APPLICATION,
            LICENSE_VERIFICATION,
            CompleteStepOptions::new(StepStatus::Completed),
        )
        .await
        .expect("complete");

    assert!(client.can_start_step(APPLICATION, EDUCATION_VERIFICATION));
    assert!(!client.can_start_step(APPLICATION, COMMITTEE_REVIEW));
}

#[tokio::test]
async fn write_failure_sets_error_until_next_attempt() {
    let backend = Arc::new(ScriptedBackend::new());
    let client = client(Arc::clone(&backend), false);
    backend.fail_writes(true);

    let error = client
        .start_step(APPLICATION, LICENSE_VERIFICATION, StartStepOptions::default())
        .await
        .expect_err("remote offline");
    assert!(matches!(error, VerificationError::Network(_)));

    let status = client.status();
    let recorded = status.error.expect("error captured");
    assert_eq!(recorded.operation, ClientOperation::StartStep);
    assert_eq!(recorded.application_id, APPLICATION);
    assert!(!status.loading);

    backend.fail_writes(false);
    client
        .start_step(APPLICATION, LICENSE_VERIFICATION, StartStepOptions::default())
        .await
        .expect("retry succeeds");
    assert!(client.status().error.is_none());
}

#[tokio::test]
async fn validation_failure_is_reported_for_the_completing_operation() {
    let client = client(Arc::new(ScriptedBackend::new()), false);

    client
        .complete_step(
            APPLICATION,
            LICENSE_VERIFICATION,
            CompleteStepOptions::new(StepStatus::NotStarted),
        )
        .await
        .expect_err("not_started is not terminal");

    let recorded = client.status().error.expect("error captured");
    assert_eq!(recorded.operation, ClientOperation::CompleteStep);

    client.clear_error();
    assert!(client.status().error.is_none());
}

#[tokio::test]
async fn failed_refresh_keeps_last_known_projection() {
    let backend = Arc::new(ScriptedBackend::new());
    let client = client(Arc::clone(&backend), false);
    client
        .start_step(APPLICATION, LICENSE_VERIFICATION, StartStepOptions::default())
        .await
        .expect("start");

    backend.fail_reads(true);
    client
        .refresh_steps(APPLICATION)
        .await
        .expect_err("reads failing");

    let status = client.status();
    assert!(!status.loading);
    assert_eq!(
        status.error.map(|error| error.operation),
        Some(ClientOperation::RefreshSteps)
    );
    assert!(client.is_step_in_progress(APPLICATION, LICENSE_VERIFICATION));

    backend.fail_reads(false);
    let state = client.refresh_steps(APPLICATION).await.expect("recovered");
    assert_eq!(state.entries.len(), 1);
    assert!(client.status().error.is_none());
}

#[tokio::test]
async fn summary_refresh_failure_is_only_logged() {
    let backend = Arc::new(ScriptedBackend::new());
    let client = client(Arc::clone(&backend), true);
    client
        .start_step(APPLICATION, LICENSE_VERIFICATION, StartStepOptions::default())
        .await
        .expect("start");

    backend.fail_reads(true);
    let summary = client.refresh_summary(APPLICATION).await;

    assert_eq!(summary.total_entries, 1);
    assert_eq!(summary.overall_status, OverallStatus::InProgress);
    assert!(client.status().error.is_none());
}

#[tokio::test]
async fn refresh_pulls_entries_written_elsewhere() {
    let backend = Arc::new(ScriptedBackend::new());
    let client = client(Arc::clone(&backend), false);
    backend.push_remote(entry_at(
        "sanctions_screening",
        StepStatus::Failed,
        base_time(),
    ));

    client.refresh_steps(APPLICATION).await.expect("refresh");

    assert_eq!(
        client
            .get_step_status(APPLICATION, "sanctions_screening")
            .map(|record| record.status),
        Some(StepStatus::Failed)
    );
    assert_eq!(
        client.refresh_summary(APPLICATION).await.overall_status,
        OverallStatus::Failed
    );
}

#[tokio::test]
async fn overview_and_timeline_reflect_projection() {
    let client = client(Arc::new(ScriptedBackend::new()), true);
    client
        .start_step(APPLICATION, LICENSE_VERIFICATION, StartStepOptions::default())
        .await
        .expect("start");
    let mut options = CompleteStepOptions::new(StepStatus::Completed);
    options.processing_duration_ms = Some(2_500);
    client
        .complete_step(APPLICATION, LICENSE_VERIFICATION, options)
        .await
        .expect("complete");

    let overview = client.step_overview(APPLICATION);
    assert_eq!(overview.len(), client.registry().definitions().len());
    let license = overview
        .iter()
        .find(|row| row.key == LICENSE_VERIFICATION)
        .expect("license row");
    assert_eq!(license.status, StepStatus::Completed);
    let education = overview
        .iter()
        .find(|row| row.key == EDUCATION_VERIFICATION)
        .expect("education row");
    assert_eq!(education.status, StepStatus::NotStarted);
    assert!(education.can_start);
    assert!(education.updated_at.is_none());

    let views = client.timeline_views(APPLICATION);
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].status_label, "Completed");
    assert_eq!(views[0].previous_status_label, Some("In Progress"));
    assert_eq!(views[0].duration_label.as_deref(), Some("2.5 s"));
    assert_eq!(views[1].step_label, "State License Verification");
}

#[tokio::test]
async fn teardown_stops_scheduler_for_good() {
    let client = client(Arc::new(ScriptedBackend::new()), true);
    client
        .start_step(APPLICATION, LICENSE_VERIFICATION, StartStepOptions::default())
        .await
        .expect("start");
    client.watch(APPLICATION).expect("watch starts polling");
    assert_eq!(client.sync_phase(), SyncPhase::Polling);

    client.teardown();

    assert_eq!(client.sync_phase(), SyncPhase::Stopped);
    assert!(client.get_step_status(APPLICATION, LICENSE_VERIFICATION).is_none());
    assert_eq!(client.watch(APPLICATION), Err(SchedulerError::Stopped));
}

#[tokio::test]
async fn watching_without_auto_sync_does_not_poll() {
    let backend = Arc::new(ScriptedBackend::new());
    let client = client(Arc::clone(&backend), false);

    client.watch(APPLICATION).expect("watch");
    tokio::task::yield_now().await;

    assert_eq!(client.sync_phase(), SyncPhase::Idle);
    assert_eq!(backend.reads(), 0);

    client.enable_auto_sync().expect("polling resumes");
    assert_eq!(client.sync_phase(), SyncPhase::Polling);
    client.disable_auto_sync();
    assert_eq!(client.sync_phase(), SyncPhase::Idle);
}

#[tokio::test]
async fn loading_is_reported_while_a_refresh_is_in_flight() {
    let gate = Arc::new(ReadGate::default());
    let backend = Arc::new(ScriptedBackend::gated(Arc::clone(&gate)));
    let client = client(Arc::clone(&backend), false);
    assert!(!client.status().loading);

    let observe = async {
        gate.entered.notified().await;
        let during = client.status().loading;
        gate.release.notify_one();
        during
    };
    let (refreshed, loading_during) = tokio::join!(client.refresh_steps(APPLICATION), observe);

    refreshed.expect("refresh completes");
    assert!(loading_during);
    assert!(!client.status().loading);
    assert_eq!(backend.reads(), 1);
}
