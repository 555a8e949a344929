//! Builders wiring the orchestration stack over in-memory collaborators

use super::mock_capability::ScriptedCapabilityClient;
use civinsight_core::models::Report;
use civinsight_core::orchestration::{
    FanOutExecutor, ReportLifecycleController, ResultAggregator, RetryPolicy,
};
use civinsight_core::persistence::InMemoryReportRepository;
use std::sync::Arc;
use std::time::Duration;

pub const MEDIA_URL: &str = "https://media.example/reports/1.jpg";

pub struct TestHarness {
    pub repository: Arc<InMemoryReportRepository>,
    pub client: Arc<ScriptedCapabilityClient>,
    pub controller: Arc<ReportLifecycleController>,
}

pub struct HarnessBuilder {
    client: ScriptedCapabilityClient,
    repository: Arc<InMemoryReportRepository>,
    retry_attempts: u32,
    capability_timeout: Duration,
    overall_deadline: Duration,
    max_concurrent_pipelines: usize,
    max_processing_attempts: u32,
}

impl HarnessBuilder {
    pub fn new(client: ScriptedCapabilityClient) -> Self {
        Self {
            client,
            repository: Arc::new(InMemoryReportRepository::new()),
            retry_attempts: 3,
            capability_timeout: Duration::from_secs(30),
            overall_deadline: Duration::from_secs(90),
            max_concurrent_pipelines: 4,
            max_processing_attempts: 5,
        }
    }

    pub fn repository(mut self, repository: Arc<InMemoryReportRepository>) -> Self {
        self.repository = repository;
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = timeout;
        self
    }

    pub fn overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = deadline;
        self
    }

    pub fn max_concurrent_pipelines(mut self, max: usize) -> Self {
        self.max_concurrent_pipelines = max;
        self
    }

    pub fn max_processing_attempts(mut self, max: u32) -> Self {
        self.max_processing_attempts = max;
        self
    }

    pub fn build(self) -> TestHarness {
        let client = Arc::new(self.client);
        let executor = FanOutExecutor::new(
            client.clone(),
            RetryPolicy::new(
                self.retry_attempts,
                Duration::from_millis(100),
                Duration::from_secs(2),
            ),
            self.capability_timeout,
            self.max_concurrent_pipelines,
        );
        let controller = Arc::new(ReportLifecycleController::new(
            self.repository.clone(),
            executor,
            ResultAggregator::default(),
            self.overall_deadline,
            self.max_processing_attempts,
        ));
        TestHarness {
            repository: self.repository,
            client,
            controller,
        }
    }
}

impl TestHarness {
    /// Store a report and return its id
    pub fn seed(&self, report: Report) -> uuid::Uuid {
        let id = report.id;
        self.repository.insert(report);
        id
    }
}

pub fn text_report(text: &str) -> Report {
    Report::with_text(text)
}

pub fn media_report() -> Report {
    Report::with_media(MEDIA_URL)
}

pub fn full_report(text: &str) -> Report {
    Report::new(Some(text.to_string()), Some(MEDIA_URL.to_string()))
}
