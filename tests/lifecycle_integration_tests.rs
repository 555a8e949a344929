mod common;

use common::*;
use civinsight_core::capability::{Capability, CapabilityError};
use civinsight_core::orchestration::{LifecycleError, ProcessOutcome, SkipReason};
use civinsight_core::state_machine::ReportState;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_text_only_pothole_is_processed() {
    let harness = HarnessBuilder::new(
        ScriptedCapabilityClient::new().with(
            Capability::TextClassification,
            Behavior::respond(classification("pothole", 0.85)),
        ),
    )
    .build();
    let id = harness.seed(text_report("There is a large pothole on Main St"));

    let outcome = harness.controller.process(id).await.unwrap();

    let ProcessOutcome::Processed(verdict) = outcome else {
        panic!("expected processed outcome, got {outcome:?}");
    };
    assert_eq!(verdict.primary_label.as_deref(), Some("pothole"));
    assert!((verdict.overall_confidence - 0.85).abs() < 1e-9);
    assert_eq!(verdict.attempted_count, 1);

    let stored = harness.repository.get(id).unwrap();
    assert_eq!(stored.status, ReportState::Processed);
    assert_eq!(stored.confidence_score, Some(0.85));
    assert!((stored.severity_score.unwrap() - 8.5).abs() < 1e-9);
    assert!(stored.processed_at.is_some());
    assert_eq!(harness.client.calls(Capability::ObjectDetection), 0);

    let states: Vec<ReportState> = harness
        .repository
        .transitions_for(id)
        .iter()
        .map(|t| t.to_state)
        .collect();
    assert_eq!(states, vec![ReportState::Processing, ReportState::Processed]);
}

#[tokio::test(start_paused = true)]
async fn test_media_only_with_every_pipeline_failing_is_failed() {
    let harness = HarnessBuilder::new(
        ScriptedCapabilityClient::new()
            .with(
                Capability::ObjectDetection,
                Behavior::fail(CapabilityError::Timeout(Duration::from_secs(30))),
            )
            .with(
                Capability::ImageCaption,
                Behavior::fail(CapabilityError::Timeout(Duration::from_secs(30))),
            )
            .with(
                Capability::VisualQuestionAnswering,
                Behavior::fail(CapabilityError::malformed("unexpected body")),
            ),
    )
    .build();
    let id = harness.seed(media_report());

    let outcome = harness.controller.process(id).await.unwrap();

    let ProcessOutcome::Failed(verdict) = outcome else {
        panic!("expected failed outcome, got {outcome:?}");
    };
    assert_eq!(verdict.succeeded_count, 0);
    assert_eq!(verdict.attempted_count, 3);

    let stored = harness.repository.get(id).unwrap();
    assert_eq!(stored.status, ReportState::Failed);
    assert!(stored.severity_score.is_none());
    assert!(stored.confidence_score.is_none());
    assert!(stored.processed_at.is_some());

    // transient failures retried, permanent failure not
    assert_eq!(harness.client.calls(Capability::ObjectDetection), 3);
    assert_eq!(harness.client.calls(Capability::VisualQuestionAnswering), 1);
}

#[tokio::test]
async fn test_report_without_content_is_failed() {
    let harness = HarnessBuilder::new(ScriptedCapabilityClient::new()).build();
    let id = harness.seed(civinsight_core::models::Report::new(None, None));

    let outcome = harness.controller.process(id).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Failed(ref v) if v.attempted_count == 0));
    assert_eq!(harness.client.total_calls(), 0);
    assert_eq!(harness.repository.get(id).unwrap().status, ReportState::Failed);

    let transitions = harness.repository.transitions_for(id);
    assert_eq!(
        transitions[1].metadata.as_ref().unwrap()["reason"],
        "no applicable pipelines"
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_process_calls_run_one_attempt() {
    let harness = HarnessBuilder::new(ScriptedCapabilityClient::new().with(
        Capability::TextClassification,
        Behavior::respond_after(Duration::from_secs(2), classification("flooding", 0.9)),
    ))
    .build();
    let id = harness.seed(text_report("Underpass flooded"));

    let first = {
        let controller = Arc::clone(&harness.controller);
        tokio::spawn(async move { controller.process(id).await })
    };
    let second = {
        let controller = Arc::clone(&harness.controller);
        tokio::spawn(async move { controller.process(id).await })
    };

    let mut outcomes = vec![
        first.await.unwrap().unwrap(),
        second.await.unwrap().unwrap(),
    ];
    outcomes.sort_by_key(|o| o.is_skipped());

    assert!(matches!(outcomes[0], ProcessOutcome::Processed(_)));
    assert_eq!(outcomes[1], ProcessOutcome::Skipped(SkipReason::AlreadyInFlight));
    assert_eq!(harness.client.calls(Capability::TextClassification), 1);
    assert_eq!(harness.repository.transitions_for(id).len(), 2);
    assert_eq!(harness.repository.get(id).unwrap().processing_attempts, 1);
    assert!(!harness.controller.single_flight().is_in_flight(id));
}

#[tokio::test]
async fn test_redelivery_after_completion_starts_fresh_attempt() {
    let harness = HarnessBuilder::new(ScriptedCapabilityClient::new().with(
        Capability::TextClassification,
        Behavior::respond(classification("graffiti", 0.8)),
    ))
    .build();
    let id = harness.seed(text_report("Graffiti on the library wall"));

    harness.controller.process(id).await.unwrap();
    let first_processed_at = harness.repository.get(id).unwrap().processed_at;
    let outcome = harness.controller.process(id).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Processed(_)));
    let stored = harness.repository.get(id).unwrap();
    assert_eq!(stored.status, ReportState::Processed);
    assert_eq!(stored.processing_attempts, 2);
    assert!(stored.processed_at >= first_processed_at);

    let transitions = harness.repository.transitions_for(id);
    let states: Vec<_> = transitions.iter().map(|t| (t.from_state, t.to_state)).collect();
    assert_eq!(
        states,
        vec![
            (Some(ReportState::Pending), ReportState::Processing),
            (Some(ReportState::Processing), ReportState::Processed),
            (Some(ReportState::Processed), ReportState::Processing),
            (Some(ReportState::Processing), ReportState::Processed),
        ]
    );
    assert_eq!(transitions[3].attempt, 2);
}

#[tokio::test]
async fn test_failed_report_can_recover_on_next_attempt() {
    let harness = HarnessBuilder::new(ScriptedCapabilityClient::new().with(
        Capability::TextClassification,
        Behavior::FailThenRespond {
            failures: 1,
            error: CapabilityError::malformed("model warming up"),
            payload: classification("debris", 0.95),
        },
    ))
    .build();
    let id = harness.seed(text_report("Tree branches across the road"));

    let first = harness.controller.process(id).await.unwrap();
    assert!(matches!(first, ProcessOutcome::Failed(_)));
    assert_eq!(harness.repository.get(id).unwrap().status, ReportState::Failed);

    let second = harness.controller.process(id).await.unwrap();
    assert!(matches!(second, ProcessOutcome::Processed(_)));
    let stored = harness.repository.get(id).unwrap();
    assert_eq!(stored.issue_label.as_deref(), Some("debris"));
    assert_eq!(stored.processing_attempts, 2);
}

#[tokio::test]
async fn test_attempt_bound_stops_reprocessing() {
    let harness = HarnessBuilder::new(ScriptedCapabilityClient::new())
        .max_processing_attempts(2)
        .build();
    let id = harness.seed(text_report("Unscripted classification always fails"));

    harness.controller.process(id).await.unwrap();
    harness.controller.process(id).await.unwrap();
    let third = harness.controller.process(id).await.unwrap();

    assert_eq!(
        third,
        ProcessOutcome::Skipped(SkipReason::AttemptsExhausted { attempts: 2 })
    );
    assert_eq!(harness.client.total_calls(), 2);
    assert_eq!(harness.repository.transitions_for(id).len(), 4);
}

#[tokio::test]
async fn test_processing_report_owned_elsewhere_is_skipped() {
    let harness = HarnessBuilder::new(ScriptedCapabilityClient::new()).build();
    let mut report = text_report("Owned by another worker");
    report.status = ReportState::Processing;
    let id = harness.seed(report);

    let outcome = harness.controller.process(id).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Skipped(SkipReason::AlreadyProcessing));
    assert_eq!(harness.client.total_calls(), 0);
}

#[tokio::test]
async fn test_long_untouched_processing_report_is_recovered() {
    let harness = HarnessBuilder::new(ScriptedCapabilityClient::new().with(
        Capability::TextClassification,
        Behavior::respond(classification("pothole", 0.85)),
    ))
    .build();
    let mut report = text_report("Claimed by a worker that crashed");
    report.status = ReportState::Processing;
    report.processing_attempts = 1;
    report.updated_at = Utc::now() - chrono::Duration::hours(1);
    let id = harness.seed(report);

    let outcome = harness.controller.process(id).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Processed(_)));
    let stored = harness.repository.get(id).unwrap();
    assert_eq!(stored.status, ReportState::Processed);
    assert_eq!(stored.processing_attempts, 2);
}

#[tokio::test]
async fn test_terminal_save_failure_is_recovered_on_redelivery() {
    let repository = Arc::new(civinsight_core::persistence::InMemoryReportRepository::new());
    let hook_repository = Arc::clone(&repository);
    let armed = AtomicBool::new(true);
    let client = ScriptedCapabilityClient::new()
        .with(
            Capability::TextClassification,
            Behavior::respond(classification("pothole", 0.9)),
        )
        .on_invoke(move |_| {
            if armed.swap(false, Ordering::SeqCst) {
                hook_repository.set_fail_saves(true);
            }
        });

    let harness = HarnessBuilder::new(client)
        .repository(Arc::clone(&repository))
        .build();
    let id = harness.seed(text_report("Pothole"));

    let result = harness.controller.process(id).await;

    assert!(matches!(result, Err(LifecycleError::StateMachine(_))));
    assert!(!harness.controller.single_flight().is_in_flight(id));
    assert_eq!(repository.get(id).unwrap().status, ReportState::Processing);
    assert!(harness.controller.has_abandoned_attempt(id));

    // storage comes back; redelivery fails the orphaned attempt and starts a new one
    repository.set_fail_saves(false);
    let outcome = harness.controller.process(id).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Processed(_)));
    assert!(!harness.controller.has_abandoned_attempt(id));
    let stored = repository.get(id).unwrap();
    assert_eq!(stored.status, ReportState::Processed);
    assert_eq!(stored.processing_attempts, 2);

    let states: Vec<_> = repository
        .transitions_for(id)
        .iter()
        .map(|t| (t.from_state, t.to_state))
        .collect();
    assert_eq!(
        states,
        vec![
            (Some(ReportState::Pending), ReportState::Processing),
            (Some(ReportState::Processing), ReportState::Failed),
            (Some(ReportState::Failed), ReportState::Processing),
            (Some(ReportState::Processing), ReportState::Processed),
        ]
    );
}

#[tokio::test]
async fn test_review_during_attempt_is_not_overwritten() {
    let repository = Arc::new(civinsight_core::persistence::InMemoryReportRepository::new());
    let hook_repository = Arc::clone(&repository);
    let report = text_report("Pothole");
    let report_id = report.id;
    let client = ScriptedCapabilityClient::new()
        .with(
            Capability::TextClassification,
            Behavior::respond(classification("pothole", 0.9)),
        )
        .on_invoke(move |_| {
            // a moderator closes the report while the pipeline is running
            if let Some(mut stored) = hook_repository.get(report_id) {
                stored.status = ReportState::Reviewed;
                hook_repository.insert(stored);
            }
        });

    let harness = HarnessBuilder::new(client)
        .repository(Arc::clone(&repository))
        .build();
    let id = harness.seed(report);

    let outcome = harness.controller.process(id).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Skipped(SkipReason::StateChanged));
    let stored = repository.get(id).unwrap();
    assert_eq!(stored.status, ReportState::Reviewed);
    assert_eq!(stored.issue_label, None);
    assert!(!harness.controller.has_abandoned_attempt(id));
    assert_eq!(repository.transitions_for(id).len(), 1);
}

#[tokio::test]
async fn test_artifact_failures_do_not_change_the_verdict() {
    let harness = HarnessBuilder::new(ScriptedCapabilityClient::new().with(
        Capability::TextClassification,
        Behavior::respond(classification("pothole", 0.85)),
    ))
    .build();
    harness.repository.set_fail_artifacts(true);
    let id = harness.seed(text_report("Pothole"));

    let outcome = harness.controller.process(id).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Processed(_)));
    assert!(harness.repository.artifacts_for(id).is_empty());
}

#[tokio::test]
async fn test_pipeline_panic_is_recorded_as_failure() {
    let harness = HarnessBuilder::new(
        ScriptedCapabilityClient::new()
            .with(
                Capability::TextClassification,
                Behavior::Panic("classifier crashed".to_string()),
            )
            .with(Capability::ImageCaption, Behavior::respond(caption("a hole in the road")))
            .with(
                Capability::ObjectDetection,
                Behavior::respond(detection("pothole", 0.9)),
            )
            .with(
                Capability::VisualQuestionAnswering,
                Behavior::respond(answer("a pothole", 0.7)),
            ),
    )
    .build();
    let id = harness.seed(full_report("Hole in the road"));

    let outcome = harness.controller.process(id).await.unwrap();

    let ProcessOutcome::Processed(verdict) = outcome else {
        panic!("expected processed outcome, got {outcome:?}");
    };
    assert_eq!(verdict.attempted_count, 4);
    assert_eq!(verdict.succeeded_count, 3);
    assert_eq!(verdict.primary_label.as_deref(), Some("pothole"));
    assert_eq!(verdict.per_pipeline_confidence[&Capability::TextClassification], 0.0);
}
