//! # Fan-Out Executor
//!
//! Runs the selected pipelines of one report concurrently and fans their results back
//! in under an overall deadline.
//!
//! ## Concurrency
//!
//! A semaphore shared by every executor clone bounds how many pipelines call out at
//! once across all in-flight reports; tasks beyond the bound wait for a permit. Each
//! pipeline task runs its capability call through its own [`RetryPolicy`] and catches
//! its own panics, so one pipeline never blocks, cancels or crashes another.
//!
//! ## Deadline
//!
//! When the overall deadline elapses, tasks still running (or still waiting for a
//! permit) are aborted and recorded as `Timeout` failures. Results collected before
//! the deadline are kept.

use super::retry_policy::RetryPolicy;
use crate::capability::{
    invoke_with_timeout, Capability, CapabilityClient, CapabilityError, CapabilityRequest,
};
use crate::config::CivInsightConfig;
use crate::constants::events;
use crate::logging::log_pipeline_operation;
use crate::models::{FailureReason, PipelineResult, Report};
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct FanOutExecutor {
    client: Arc<dyn CapabilityClient>,
    retry_policy: RetryPolicy,
    capability_timeout: Duration,
    permits: Arc<Semaphore>,
    max_concurrent_pipelines: usize,
    default_vqa_question: String,
}

impl std::fmt::Debug for FanOutExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutExecutor")
            .field("client", &self.client.client_name())
            .field("retry_policy", &self.retry_policy)
            .field("capability_timeout", &self.capability_timeout)
            .field("max_concurrent_pipelines", &self.max_concurrent_pipelines)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl FanOutExecutor {
    pub fn new(
        client: Arc<dyn CapabilityClient>,
        retry_policy: RetryPolicy,
        capability_timeout: Duration,
        max_concurrent_pipelines: usize,
    ) -> Self {
        let max_concurrent_pipelines = max_concurrent_pipelines.max(1);
        Self {
            client,
            retry_policy,
            capability_timeout,
            permits: Arc::new(Semaphore::new(max_concurrent_pipelines)),
            max_concurrent_pipelines,
            default_vqa_question: crate::constants::analysis::DEFAULT_VQA_QUESTION.to_string(),
        }
    }

    pub fn from_config(client: Arc<dyn CapabilityClient>, config: &CivInsightConfig) -> Self {
        Self::new(
            client,
            RetryPolicy::from_config(&config.retry),
            config.execution.capability_timeout(),
            config.execution.max_concurrent_pipelines,
        )
        .with_default_question(config.analysis.default_vqa_question.clone())
    }

    pub fn with_default_question(mut self, question: impl Into<String>) -> Self {
        self.default_vqa_question = question.into();
        self
    }

    /// Pipelines that could start right now
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_concurrent_pipelines(&self) -> usize {
        self.max_concurrent_pipelines
    }

    pub fn client(&self) -> &Arc<dyn CapabilityClient> {
        &self.client
    }

    /// Abstract capability request for one pipeline of `report`
    pub fn build_request(&self, pipeline: Capability, report: &Report) -> CapabilityRequest {
        let mut request = CapabilityRequest::new(pipeline);
        let text = report.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
        if let Some(text) = text {
            request = request.with_text(text);
        }
        if let Some(media) = report.media_reference.as_deref().filter(|_| report.has_media()) {
            request = request.with_media(media);
        }
        if pipeline == Capability::VisualQuestionAnswering {
            request = request.with_question(text.unwrap_or(&self.default_vqa_question));
        }
        request
    }

    /// Run `pipelines` for `report`, returning whatever completed before `overall_deadline`.
    ///
    /// Every selected pipeline is represented exactly once in the returned set.
    pub async fn run(
        &self,
        pipelines: &BTreeSet<Capability>,
        report: &Report,
        overall_deadline: Duration,
    ) -> Vec<PipelineResult> {
        if pipelines.is_empty() {
            return Vec::new();
        }

        let started = Instant::now();
        let deadline = started + overall_deadline;
        let mut pending: BTreeSet<Capability> = pipelines.clone();
        let mut results = Vec::with_capacity(pipelines.len());
        let mut tasks = JoinSet::new();

        for &pipeline in pipelines {
            let request = self.build_request(pipeline, report);
            let span = info_span!("pipeline", report_id = %report.id, pipeline = %pipeline);
            tasks.spawn(
                self.pipeline_task(report.id, pipeline, request)
                    .instrument(span),
            );
        }

        let mut deadline_exceeded = false;
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(result))) => {
                    pending.remove(&result.pipeline);
                    results.push(result);
                }
                Ok(Some(Err(join_error))) => {
                    warn!(
                        report_id = %report.id,
                        error = %join_error,
                        "Pipeline task ended without a result"
                    );
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_exceeded = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        for pipeline in pending {
            let latency = started.elapsed();
            let reason = if deadline_exceeded {
                log_pipeline_operation(
                    events::PIPELINE_DEADLINE_EXCEEDED,
                    report.id,
                    pipeline.as_str(),
                    "timeout",
                    Some(duration_ms(latency)),
                    None,
                );
                FailureReason::from(CapabilityError::Timeout(overall_deadline))
            } else {
                FailureReason::Aborted {
                    message: "pipeline task was cancelled".to_string(),
                }
            };
            results.push(PipelineResult::failed(pipeline, reason, latency));
        }

        results.sort_by_key(|r| r.pipeline);
        results
    }

    /// One pipeline: wait for a permit, call with retries, never panic outward
    fn pipeline_task(
        &self,
        report_id: Uuid,
        pipeline: Capability,
        request: CapabilityRequest,
    ) -> impl std::future::Future<Output = PipelineResult> + Send + 'static {
        let client = Arc::clone(&self.client);
        let retry_policy = self.retry_policy.clone();
        let capability_timeout = self.capability_timeout;
        let permits = Arc::clone(&self.permits);

        async move {
            let started = Instant::now();
            let call = async {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return PipelineResult::failed(
                            pipeline,
                            FailureReason::Aborted {
                                message: "pipeline permits closed".to_string(),
                            },
                            started.elapsed(),
                        )
                    }
                };

                log_pipeline_operation(
                    events::PIPELINE_STARTED,
                    report_id,
                    pipeline.as_str(),
                    "started",
                    None,
                    None,
                );

                let outcome = retry_policy
                    .execute(|_attempt| {
                        let client = Arc::clone(&client);
                        let request = request.clone();
                        async move {
                            invoke_with_timeout(client.as_ref(), &request, capability_timeout).await
                        }
                    })
                    .await;

                match outcome {
                    Ok(payload) => PipelineResult::success(pipeline, payload, started.elapsed()),
                    Err(error) => PipelineResult::failed(pipeline, error, started.elapsed()),
                }
            };

            let result = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => PipelineResult::failed(
                    pipeline,
                    FailureReason::Aborted {
                        message: panic_message(panic.as_ref()),
                    },
                    started.elapsed(),
                ),
            };

            let latency_ms = Some(duration_ms(result.latency));
            match result.failure() {
                None => log_pipeline_operation(
                    events::PIPELINE_SUCCEEDED,
                    report_id,
                    pipeline.as_str(),
                    "success",
                    latency_ms,
                    None,
                ),
                Some(reason) => log_pipeline_operation(
                    events::PIPELINE_FAILED,
                    report_id,
                    pipeline.as_str(),
                    "failed",
                    latency_ms,
                    Some(&reason.to_string()),
                ),
            }
            result
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityPayload;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    /// Each capability sleeps for its configured delay, then answers or fails
    struct DelayClient {
        delays: BTreeMap<Capability, Duration>,
        failing: BTreeSet<Capability>,
    }

    #[async_trait]
    impl CapabilityClient for DelayClient {
        async fn invoke(
            &self,
            request: &CapabilityRequest,
            _timeout: Duration,
        ) -> Result<CapabilityPayload, CapabilityError> {
            if let Some(delay) = self.delays.get(&request.capability) {
                tokio::time::sleep(*delay).await;
            }
            if self.failing.contains(&request.capability) {
                return Err(CapabilityError::malformed("unexpected body"));
            }
            if request.capability == Capability::ImageCaption
                && request.media_reference.as_deref() == Some("panic://")
            {
                panic!("caption decoder exploded");
            }
            Ok(CapabilityPayload::Caption {
                text: "ok".to_string(),
                confidence: 0.8,
            })
        }

        fn client_name(&self) -> &'static str {
            "delay"
        }
    }

    fn executor(client: DelayClient, max_concurrent: usize) -> FanOutExecutor {
        FanOutExecutor::new(
            Arc::new(client),
            RetryPolicy::new(1, Duration::from_millis(10), Duration::from_millis(10)),
            Duration::from_secs(60),
            max_concurrent,
        )
    }

    #[test]
    fn test_vqa_request_uses_report_text_or_default_question() {
        let exec = executor(
            DelayClient {
                delays: BTreeMap::new(),
                failing: BTreeSet::new(),
            },
            4,
        );

        let report = Report::new(
            Some("Is the road flooded?".to_string()),
            Some("https://media.example/a.jpg".to_string()),
        );
        let request = exec.build_request(Capability::VisualQuestionAnswering, &report);
        assert_eq!(request.question.as_deref(), Some("Is the road flooded?"));
        assert_eq!(request.media_reference.as_deref(), Some("https://media.example/a.jpg"));

        let report = Report::with_media("https://media.example/a.jpg");
        let request = exec.build_request(Capability::VisualQuestionAnswering, &report);
        assert_eq!(
            request.question.as_deref(),
            Some(crate::constants::analysis::DEFAULT_VQA_QUESTION)
        );

        let request = exec.build_request(Capability::ImageCaption, &report);
        assert!(request.question.is_none());
        assert!(request.text.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_pipeline_cancelled_at_deadline() {
        let exec = executor(
            DelayClient {
                delays: BTreeMap::from([
                    (Capability::ObjectDetection, Duration::from_secs(10)),
                    (Capability::ImageCaption, Duration::from_secs(1)),
                ]),
                failing: BTreeSet::new(),
            },
            4,
        );
        let report = Report::with_media("https://media.example/a.jpg");
        let pipelines = BTreeSet::from([Capability::ImageCaption, Capability::ObjectDetection]);

        let start = Instant::now();
        let results = exec.run(&pipelines, &report, Duration::from_secs(5)).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5_010));
        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert_eq!(results[0].pipeline, Capability::ImageCaption);
        assert_eq!(results[1].pipeline, Capability::ObjectDetection);
        assert!(results[1].failure().unwrap().is_timeout());
        assert_eq!(exec.available_permits(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_affect_other_pipelines() {
        let exec = executor(
            DelayClient {
                delays: BTreeMap::new(),
                failing: BTreeSet::from([
                    Capability::ObjectDetection,
                    Capability::VisualQuestionAnswering,
                ]),
            },
            4,
        );
        let report = Report::with_media("panic://");
        let pipelines = BTreeSet::from([
            Capability::ImageCaption,
            Capability::ObjectDetection,
            Capability::VisualQuestionAnswering,
        ]);

        let results = exec.run(&pipelines, &report, Duration::from_secs(5)).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.is_success()));
        assert!(matches!(
            results[0].failure(),
            Some(FailureReason::Aborted { message }) if message.contains("exploded")
        ));
        assert!(matches!(
            results[1].failure(),
            Some(FailureReason::Capability { error: CapabilityError::Malformed { .. } })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound_queues_excess_pipelines() {
        let exec = executor(
            DelayClient {
                delays: Capability::ALL
                    .into_iter()
                    .map(|c| (c, Duration::from_secs(1)))
                    .collect(),
                failing: BTreeSet::new(),
            },
            2,
        );
        let report = Report::new(
            Some("Broken streetlight".to_string()),
            Some("https://media.example/a.jpg".to_string()),
        );
        let pipelines: BTreeSet<_> = Capability::ALL.into_iter().collect();

        let start = Instant::now();
        let results = exec.run(&pipelines, &report, Duration::from_secs(30)).await;

        // four one-second calls through two permits
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2_010));
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(PipelineResult::is_success));
    }

    #[tokio::test]
    async fn test_no_pipelines_returns_empty_set() {
        let exec = executor(
            DelayClient {
                delays: BTreeMap::new(),
                failing: BTreeSet::new(),
            },
            4,
        );
        let results = exec
            .run(&BTreeSet::new(), &Report::new(None, None), Duration::from_secs(1))
            .await;
        assert!(results.is_empty());
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
