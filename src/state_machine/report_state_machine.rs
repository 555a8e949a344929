use super::{
    actions::report_actions,
    errors::{StateMachineError, StateMachineResult},
    events::ReportEvent,
    guards::{ProcessingAttemptsGuard, StateGuard},
    states::ReportState,
};
use crate::models::{NewReportTransition, Report};
use crate::persistence::ReportRepository;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Report state machine for lifecycle management.
///
/// The report row is the source of truth: a transition is only observable once the
/// report has been saved, and the save only succeeds while the stored status still
/// matches the state the transition started from. The transition audit record is
/// written afterwards and its failure does not undo the transition.
pub struct ReportStateMachine {
    repository: Arc<dyn ReportRepository>,
    attempts_guard: ProcessingAttemptsGuard,
}

impl ReportStateMachine {
    pub fn new(repository: Arc<dyn ReportRepository>, max_processing_attempts: u32) -> Self {
        Self {
            repository,
            attempts_guard: ProcessingAttemptsGuard::new(max_processing_attempts),
        }
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: ReportState,
        event: &ReportEvent,
    ) -> StateMachineResult<ReportState> {
        let target = match (current_state, event) {
            // Start transitions
            (ReportState::Pending, ReportEvent::Start)
            | (ReportState::Processed, ReportEvent::Start)
            | (ReportState::Failed, ReportEvent::Start) => ReportState::Processing,

            // Terminal transitions
            (ReportState::Processing, ReportEvent::Complete(_)) => ReportState::Processed,
            (ReportState::Processing, ReportEvent::Fail(_)) => ReportState::Failed,

            // Human review
            (ReportState::Processed, ReportEvent::Review) => ReportState::Reviewed,

            (from, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from,
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    pub fn can_transition(current_state: ReportState, event: &ReportEvent) -> bool {
        Self::determine_target_state(current_state, event).is_ok()
    }

    /// Apply `event` to `report`, persist it and record the transition.
    ///
    /// On error `report` is left exactly as it was.
    pub async fn transition(
        &self,
        report: &mut Report,
        event: ReportEvent,
    ) -> StateMachineResult<ReportState> {
        let from_state = report.status;
        let target_state = Self::determine_target_state(from_state, &event)?;

        self.attempts_guard.check(report, &event)?;

        let mut updated = report.clone();
        for action in report_actions() {
            action.apply(&mut updated, from_state, target_state, &event);
        }

        self.repository
            .update_report_if_status(&updated, from_state)
            .await?;
        *report = updated;

        debug!(
            report_id = %report.id,
            from_state = %from_state,
            to_state = %target_state,
            event = event.event_type(),
            "Report transitioned"
        );

        let record = NewReportTransition {
            report_id: report.id,
            from_state: Some(from_state),
            to_state: target_state,
            event: event.event_type().to_string(),
            attempt: report.processing_attempts,
            metadata: transition_metadata(&event),
        };
        if let Err(e) = self.repository.record_transition(record).await {
            warn!(
                report_id = %report.id,
                to_state = %target_state,
                error = %e,
                "Failed to record report transition"
            );
        }

        Ok(target_state)
    }

    pub fn repository(&self) -> &Arc<dyn ReportRepository> {
        &self.repository
    }
}

fn transition_metadata(event: &ReportEvent) -> Option<Value> {
    match event {
        ReportEvent::Complete(verdict) => Some(json!({
            "primary_label": verdict.primary_label,
            "severity_score": verdict.severity_score,
            "overall_confidence": verdict.overall_confidence,
            "succeeded_count": verdict.succeeded_count,
            "attempted_count": verdict.attempted_count,
        })),
        ReportEvent::Fail(reason) => Some(json!({ "reason": reason })),
        ReportEvent::Start | ReportEvent::Review => None,
    }
}
