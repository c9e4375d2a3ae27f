use std::collections::BTreeMap;

use super::domain::{
    ApplicationId, AuditTrailEntry, AuditTrailSummary, OverallStatus, StepKey, StepStatus,
    StepStatusRecord,
};

/// Roll up an application's projection. The same inputs always produce an equal summary.
pub fn summarize(
    application_id: ApplicationId,
    entries: &[AuditTrailEntry],
    steps: &BTreeMap<StepKey, StepStatusRecord>,
) -> AuditTrailSummary {
    let current_step_statuses: BTreeMap<StepKey, StepStatus> = steps
        .iter()
        .map(|(key, record)| (key.clone(), record.status))
        .collect();

    let latest_activity = entries
        .iter()
        .map(|entry| entry.timestamp)
        .chain(steps.values().map(|record| record.updated_at))
        .max();

    let overall_status = overall_status(&current_step_statuses);

    AuditTrailSummary {
        application_id,
        total_entries: entries.len(),
        unique_steps: current_step_statuses.len(),
        latest_activity,
        current_step_statuses,
        overall_status,
    }
}

/// `Failed` if any step failed, `Completed` if every present step completed, else `InProgress`.
///
/// An application with no recorded steps is `InProgress`.
pub fn overall_status(statuses: &BTreeMap<StepKey, StepStatus>) -> OverallStatus {
    if statuses.values().any(|status| *status == StepStatus::Failed) {
        return OverallStatus::Failed;
    }

    if !statuses.is_empty()
        && statuses
            .values()
            .all(|status| *status == StepStatus::Completed)
    {
        return OverallStatus::Completed;
    }

    OverallStatus::InProgress
}
