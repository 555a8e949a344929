use super::events::ReportEvent;
use super::states::ReportState;
use crate::models::Report;
use chrono::Utc;

/// Trait for implementing state transition actions.
///
/// Actions mutate the in-memory entity before it is saved, so a failed save leaves
/// the caller's copy untouched.
pub trait StateAction<T> {
    fn apply(&self, entity: &mut T, from: ReportState, to: ReportState, event: &ReportEvent);

    /// Get a description of this action for logging
    fn description(&self) -> &'static str;
}

/// Counts a new processing attempt on entering PROCESSING
pub struct IncrementAttemptsAction;

impl StateAction<Report> for IncrementAttemptsAction {
    fn apply(
        &self,
        report: &mut Report,
        _from: ReportState,
        to: ReportState,
        _event: &ReportEvent,
    ) {
        if to == ReportState::Processing {
            report.processing_attempts = report.processing_attempts.saturating_add(1);
        }
    }

    fn description(&self) -> &'static str {
        "Increment processing attempts"
    }
}

/// Writes the verdict fields on PROCESSED and clears them on FAILED
pub struct RecordVerdictAction;

impl StateAction<Report> for RecordVerdictAction {
    fn apply(&self, report: &mut Report, _from: ReportState, to: ReportState, event: &ReportEvent) {
        match (to, event) {
            (ReportState::Processed, ReportEvent::Complete(verdict)) => {
                report.severity_score = Some(verdict.severity_score);
                report.confidence_score = Some(verdict.overall_confidence);
                report.issue_label = verdict.primary_label.clone();
                report.processed_at = Some(Utc::now());
            }
            (ReportState::Failed, _) => {
                report.severity_score = None;
                report.confidence_score = None;
                report.issue_label = None;
                report.processed_at = Some(Utc::now());
            }
            _ => {}
        }
    }

    fn description(&self) -> &'static str {
        "Record or clear verdict fields"
    }
}

/// Moves the report to its new state and bumps `updated_at`
pub struct UpdateStatusAction;

impl StateAction<Report> for UpdateStatusAction {
    fn apply(
        &self,
        report: &mut Report,
        _from: ReportState,
        to: ReportState,
        _event: &ReportEvent,
    ) {
        report.status = to;
        report.updated_at = Utc::now();
    }

    fn description(&self) -> &'static str {
        "Update report status"
    }
}

pub fn report_actions() -> [&'static (dyn StateAction<Report> + Send + Sync); 3] {
    [&IncrementAttemptsAction, &RecordVerdictAction, &UpdateStatusAction]
}
