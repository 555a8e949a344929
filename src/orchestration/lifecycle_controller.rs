//! # Report Lifecycle Controller
//!
//! Drives one processing attempt for a report:
//!
//! 1. Claim the report's single-flight key; a held key makes the call a no-op.
//! 2. Load the report; missing, already PROCESSING or REVIEWED reports are skipped.
//!    A PROCESSING report whose attempt is known to be dead (this controller failed to
//!    finalize it, or it has not been touched for longer than the stale window) is
//!    moved to FAILED first and then gets a fresh attempt.
//! 3. Transition to PROCESSING (counts an attempt, bounded by configuration).
//! 4. Select pipelines, fan out, aggregate.
//! 5. Transition to PROCESSED with the verdict, or FAILED when nothing succeeded.
//!
//! The report never stays PROCESSING after `process` returns: internal panics become a
//! FAILED transition, a failed terminal save is retried as FAILED, and a cancelled
//! attempt schedules its own FAILED transition. Every save is conditional on the
//! stored status, so a report that changed underneath an attempt is left alone.

use super::errors::LifecycleResult;
use super::fan_out_executor::{panic_message, FanOutExecutor};
use super::pipeline_selector::select_pipelines;
use super::result_aggregator::ResultAggregator;
use super::single_flight::SingleFlight;
use crate::capability::CapabilityClient;
use crate::config::{CivInsightConfig, ExecutionConfig};
use crate::constants::events;
use crate::logging::{log_error, log_report_operation};
use crate::models::{PipelineResult, Report, Verdict};
use crate::persistence::ReportRepository;
use crate::state_machine::{ReportEvent, ReportState, ReportStateMachine, StateMachineError};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Why `process` returned without running an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Another attempt for the same report holds the single-flight key
    AlreadyInFlight,
    NotFound,
    /// Stored as PROCESSING by an attempt this process does not own
    AlreadyProcessing,
    /// The report's state does not accept a new attempt
    NotEligible { state: ReportState },
    AttemptsExhausted { attempts: u32 },
    /// The stored report moved to another state while this call was working on it
    StateChanged,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInFlight => write!(f, "already in flight"),
            Self::NotFound => write!(f, "report not found"),
            Self::AlreadyProcessing => write!(f, "report already processing"),
            Self::NotEligible { state } => write!(f, "report in state {state}"),
            Self::AttemptsExhausted { attempts } => {
                write!(f, "processing attempts exhausted after {attempts}")
            }
            Self::StateChanged => write!(f, "report state changed concurrently"),
        }
    }
}

/// Result of one `process` call
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Skipped(SkipReason),
    Processed(Verdict),
    Failed(Verdict),
}

impl ProcessOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Processed(verdict) | Self::Failed(verdict) => Some(verdict),
            Self::Skipped(_) => None,
        }
    }
}

/// Anything that can run a processing attempt for a report id
#[async_trait]
pub trait ReportProcessor: Send + Sync {
    async fn process(&self, report_id: Uuid) -> LifecycleResult<ProcessOutcome>;
}

pub struct ReportLifecycleController {
    repository: Arc<dyn ReportRepository>,
    state_machine: Arc<ReportStateMachine>,
    executor: FanOutExecutor,
    aggregator: ResultAggregator,
    single_flight: SingleFlight,
    overall_deadline: Duration,
    /// Reports this controller left PROCESSING, keyed to the abandoned attempt number
    abandoned: Arc<DashMap<Uuid, u32>>,
    /// Age after which a PROCESSING report is treated as abandoned
    stale_after: Duration,
}

impl ReportLifecycleController {
    pub fn new(
        repository: Arc<dyn ReportRepository>,
        executor: FanOutExecutor,
        aggregator: ResultAggregator,
        overall_deadline: Duration,
        max_processing_attempts: u32,
    ) -> Self {
        let state_machine = Arc::new(ReportStateMachine::new(
            Arc::clone(&repository),
            max_processing_attempts,
        ));
        Self {
            repository,
            state_machine,
            executor,
            aggregator,
            single_flight: SingleFlight::new(),
            overall_deadline,
            abandoned: Arc::new(DashMap::new()),
            stale_after: overall_deadline + ExecutionConfig::default().stale_processing_grace(),
        }
    }

    /// Override how long a report may sit in PROCESSING before it counts as abandoned
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn from_config(
        config: &CivInsightConfig,
        repository: Arc<dyn ReportRepository>,
        client: Arc<dyn CapabilityClient>,
    ) -> Self {
        Self::new(
            repository,
            FanOutExecutor::from_config(client, config),
            ResultAggregator::from_config(&config.analysis),
            config.execution.overall_attempt_deadline(),
            config.execution.max_processing_attempts,
        )
        .with_stale_after(
            config.execution.overall_attempt_deadline()
                + config.execution.stale_processing_grace(),
        )
    }

    pub fn single_flight(&self) -> &SingleFlight {
        &self.single_flight
    }

    pub fn executor(&self) -> &FanOutExecutor {
        &self.executor
    }

    /// Whether an attempt for `report_id` was left PROCESSING by this controller
    pub fn has_abandoned_attempt(&self, report_id: Uuid) -> bool {
        self.abandoned.contains_key(&report_id)
    }

    /// Run one processing attempt for `report_id`.
    ///
    /// Only control-logic failures (persistence, state machine) are returned as errors;
    /// pipeline failures end up in the verdict.
    #[instrument(skip_all, fields(report_id = %report_id))]
    pub async fn process(&self, report_id: Uuid) -> LifecycleResult<ProcessOutcome> {
        let Some(_flight) = self.single_flight.try_acquire(report_id) else {
            return Ok(self.skipped(report_id, SkipReason::AlreadyInFlight, None));
        };

        let Some(mut report) = self.repository.load_report(report_id).await? else {
            return Ok(self.skipped(report_id, SkipReason::NotFound, None));
        };

        if report.status == ReportState::Processing {
            if !self.is_abandoned(&report) {
                return Ok(self.skipped(
                    report_id,
                    SkipReason::AlreadyProcessing,
                    Some(report.processing_attempts),
                ));
            }
            if let Some(reason) = self.recover_abandoned(&mut report).await? {
                return Ok(self.skipped(report_id, reason, Some(report.processing_attempts)));
            }
        } else {
            self.abandoned.remove(&report_id);
        }

        if !report.status.accepts_processing() {
            return Ok(self.skipped(
                report_id,
                SkipReason::NotEligible {
                    state: report.status,
                },
                Some(report.processing_attempts),
            ));
        }

        match self
            .state_machine
            .transition(&mut report, ReportEvent::Start)
            .await
        {
            Ok(_) => {}
            Err(StateMachineError::AttemptsExhausted { attempts, .. }) => {
                return Ok(self.skipped(
                    report_id,
                    SkipReason::AttemptsExhausted { attempts },
                    Some(attempts),
                ))
            }
            Err(e) if e.is_conflict() => {
                return Ok(self.skipped(
                    report_id,
                    SkipReason::StateChanged,
                    Some(report.processing_attempts),
                ))
            }
            Err(e) => return Err(e.into()),
        }

        let attempt = report.processing_attempts;
        log_report_operation(
            events::REPORT_PROCESSING_STARTED,
            report_id,
            ReportState::Processing.as_str(),
            Some(attempt),
            None,
        );

        let mut cancellation = CancellationGuard::new(
            Arc::clone(&self.state_machine),
            Arc::clone(&self.abandoned),
            &report,
        );
        let (event, verdict) = match AssertUnwindSafe(self.analyze(&report)).catch_unwind().await {
            Ok((results, verdict)) => {
                self.store_artifacts(report_id, attempt, &results).await;
                if verdict.is_failed() {
                    (ReportEvent::Fail(failure_reason(&verdict)), verdict)
                } else {
                    (ReportEvent::Complete(verdict.clone()), verdict)
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log_error(
                    "lifecycle_controller",
                    "analyze",
                    &message,
                    Some(&report_id.to_string()),
                );
                (
                    ReportEvent::Fail(format!("internal error: {message}")),
                    empty_verdict(),
                )
            }
        };

        let outcome = self.finish(&mut report, event, verdict).await;
        cancellation.disarm();
        outcome
    }

    fn is_abandoned(&self, report: &Report) -> bool {
        self.abandoned.contains_key(&report.id)
            || (Utc::now() - report.updated_at)
                .to_std()
                .is_ok_and(|age| age > self.stale_after)
    }

    /// Fail a PROCESSING report whose attempt is dead; `Some` when it moved on instead
    async fn recover_abandoned(&self, report: &mut Report) -> LifecycleResult<Option<SkipReason>> {
        let abandoned_attempt = report.processing_attempts;
        let event = ReportEvent::Fail("abandoned processing attempt".to_string());
        match self.state_machine.transition(report, event).await {
            Ok(_) => {
                self.abandoned.remove(&report.id);
                warn!(
                    report_id = %report.id,
                    attempt = abandoned_attempt,
                    "Recovered abandoned processing attempt"
                );
                Ok(None)
            }
            Err(e) if e.is_conflict() => {
                self.abandoned.remove(&report.id);
                Ok(Some(SkipReason::StateChanged))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Select, fan out and aggregate
    async fn analyze(&self, report: &Report) -> (Vec<PipelineResult>, Verdict) {
        let pipelines = select_pipelines(report);
        if pipelines.is_empty() {
            info!(report_id = %report.id, "No applicable pipelines");
        }
        let results = self
            .executor
            .run(&pipelines, report, self.overall_deadline)
            .await;
        let verdict = self.aggregator.aggregate(&results);
        (results, verdict)
    }

    async fn store_artifacts(&self, report_id: Uuid, attempt: u32, results: &[PipelineResult]) {
        if results.is_empty() {
            return;
        }
        if let Err(e) = self
            .repository
            .save_artifacts(report_id, attempt, results)
            .await
        {
            warn!(
                report_id = %report_id,
                attempt,
                error = %e,
                "Failed to store analysis artifacts"
            );
        }
    }

    /// Terminal transition; a failed save is retried as FAILED before surfacing
    async fn finish(
        &self,
        report: &mut Report,
        event: ReportEvent,
        verdict: Verdict,
    ) -> LifecycleResult<ProcessOutcome> {
        match self.state_machine.transition(report, event).await {
            Ok(ReportState::Processed) => {
                log_report_operation(
                    events::REPORT_PROCESSED,
                    report.id,
                    ReportState::Processed.as_str(),
                    Some(report.processing_attempts),
                    verdict.primary_label.as_deref(),
                );
                Ok(ProcessOutcome::Processed(verdict))
            }
            Ok(state) => {
                log_report_operation(
                    events::REPORT_FAILED,
                    report.id,
                    state.as_str(),
                    Some(report.processing_attempts),
                    None,
                );
                Ok(ProcessOutcome::Failed(verdict))
            }
            Err(e) if e.is_conflict() => {
                warn!(
                    report_id = %report.id,
                    error = %e,
                    "Report changed during processing, verdict discarded"
                );
                Ok(self.skipped(
                    report.id,
                    SkipReason::StateChanged,
                    Some(report.processing_attempts),
                ))
            }
            Err(e) => {
                error!(report_id = %report.id, error = %e, "Failed to persist terminal state");
                if report.status == ReportState::Processing {
                    let fallback = ReportEvent::Fail(format!("terminal save failed: {e}"));
                    let forced = self.state_machine.transition(report, fallback).await;
                    if let Err(fallback_error) = forced {
                        log_error(
                            "lifecycle_controller",
                            "force_failed",
                            &fallback_error.to_string(),
                            Some(&report.id.to_string()),
                        );
                        if !fallback_error.is_conflict() {
                            self.abandoned.insert(report.id, report.processing_attempts);
                        }
                    }
                }
                Err(e.into())
            }
        }
    }

    fn skipped(
        &self,
        report_id: Uuid,
        reason: SkipReason,
        attempts: Option<u32>,
    ) -> ProcessOutcome {
        log_report_operation(
            events::REPORT_SKIPPED,
            report_id,
            "skipped",
            attempts,
            Some(&reason.to_string()),
        );
        ProcessOutcome::Skipped(reason)
    }
}

#[async_trait]
impl ReportProcessor for ReportLifecycleController {
    async fn process(&self, report_id: Uuid) -> LifecycleResult<ProcessOutcome> {
        ReportLifecycleController::process(self, report_id).await
    }
}

fn failure_reason(verdict: &Verdict) -> String {
    if verdict.attempted_count == 0 {
        "no applicable pipelines".to_string()
    } else {
        format!("all {} attempted pipelines failed", verdict.attempted_count)
    }
}

fn empty_verdict() -> Verdict {
    Verdict {
        primary_label: None,
        severity_score: 0.0,
        overall_confidence: 0.0,
        per_pipeline_confidence: Default::default(),
        succeeded_count: 0,
        attempted_count: 0,
    }
}

/// Moves a PROCESSING report to FAILED if the attempt is dropped before finishing
struct CancellationGuard {
    state_machine: Arc<ReportStateMachine>,
    abandoned: Arc<DashMap<Uuid, u32>>,
    report_id: Option<Uuid>,
    attempt: u32,
}

impl CancellationGuard {
    fn new(
        state_machine: Arc<ReportStateMachine>,
        abandoned: Arc<DashMap<Uuid, u32>>,
        report: &Report,
    ) -> Self {
        Self {
            state_machine,
            abandoned,
            report_id: Some(report.id),
            attempt: report.processing_attempts,
        }
    }

    fn disarm(&mut self) {
        self.report_id = None;
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        let Some(report_id) = self.report_id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(report_id = %report_id, "Attempt cancelled outside a runtime");
            return;
        };
        let state_machine = Arc::clone(&self.state_machine);
        let abandoned = Arc::clone(&self.abandoned);
        let attempt = self.attempt;
        runtime.spawn(async move {
            if let Err(e) = fail_if_processing(&state_machine, report_id).await {
                log_error(
                    "lifecycle_controller",
                    "cancel_attempt",
                    &e.to_string(),
                    Some(&report_id.to_string()),
                );
                abandoned.insert(report_id, attempt);
            }
        });
    }
}

/// Reload and fail the report only if it is still PROCESSING
async fn fail_if_processing(
    state_machine: &ReportStateMachine,
    report_id: Uuid,
) -> LifecycleResult<()> {
    let Some(mut report) = state_machine.repository().load_report(report_id).await? else {
        return Ok(());
    };
    if report.status == ReportState::Processing {
        let event = ReportEvent::Fail("processing attempt cancelled".to_string());
        state_machine.transition(&mut report, event).await?;
    }
    Ok(())
}
