use super::{AnalysisArtifact, PersistenceError, PersistenceResult, ReportRepository};
use crate::models::{NewReportTransition, PipelineResult, Report, ReportTransition};
use crate::state_machine::ReportState;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Process-local repository.
///
/// Writes can be made to fail on demand so callers can exercise their storage
/// error paths.
#[derive(Debug, Default)]
pub struct InMemoryReportRepository {
    reports: DashMap<Uuid, Report>,
    transitions: Mutex<Vec<ReportTransition>>,
    artifacts: Mutex<Vec<AnalysisArtifact>>,
    fail_saves: AtomicBool,
    fail_transitions: AtomicBool,
    fail_artifacts: AtomicBool,
}

impl InMemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a report without going through `save_report`
    pub fn insert(&self, report: Report) {
        self.reports.insert(report.id, report);
    }

    pub fn get(&self, report_id: Uuid) -> Option<Report> {
        self.reports.get(&report_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn transitions_for(&self, report_id: Uuid) -> Vec<ReportTransition> {
        let mut transitions: Vec<_> = self
            .transitions
            .lock()
            .iter()
            .filter(|t| t.report_id == report_id)
            .cloned()
            .collect();
        transitions.sort_by_key(|t| t.sort_key);
        transitions
    }

    pub fn artifacts_for(&self, report_id: Uuid) -> Vec<AnalysisArtifact> {
        self.artifacts
            .lock()
            .iter()
            .filter(|a| a.report_id == report_id)
            .cloned()
            .collect()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_transitions(&self, fail: bool) {
        self.fail_transitions.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_artifacts(&self, fail: bool) {
        self.fail_artifacts.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, operation: &str) -> PersistenceResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(PersistenceError::Storage(format!(
                "{operation} rejected by in-memory store"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn load_report(&self, report_id: Uuid) -> PersistenceResult<Option<Report>> {
        Ok(self.get(report_id))
    }

    async fn save_report(&self, report: &Report) -> PersistenceResult<()> {
        Self::check(&self.fail_saves, "save_report")?;
        self.reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn update_report_if_status(
        &self,
        report: &Report,
        expected: ReportState,
    ) -> PersistenceResult<()> {
        Self::check(&self.fail_saves, "update_report_if_status")?;
        match self.reports.get_mut(&report.id) {
            Some(mut stored) if stored.status == expected => {
                *stored = report.clone();
                Ok(())
            }
            _ => Err(PersistenceError::Conflict {
                report_id: report.id,
                expected,
            }),
        }
    }

    async fn record_transition(
        &self,
        transition: NewReportTransition,
    ) -> PersistenceResult<ReportTransition> {
        Self::check(&self.fail_transitions, "record_transition")?;
        let mut transitions = self.transitions.lock();
        let sort_key = transitions
            .iter()
            .filter(|t| t.report_id == transition.report_id)
            .map(|t| t.sort_key)
            .max()
            .unwrap_or(0)
            + 1;
        let recorded = transition.into_transition(sort_key);
        transitions.push(recorded.clone());
        Ok(recorded)
    }

    async fn save_artifact(
        &self,
        report_id: Uuid,
        attempt: u32,
        result: &PipelineResult,
    ) -> PersistenceResult<()> {
        Self::check(&self.fail_artifacts, "save_artifact")?;
        self.artifacts
            .lock()
            .push(AnalysisArtifact::from_result(report_id, attempt, result));
        Ok(())
    }

    async fn list_reports_by_status(
        &self,
        status: ReportState,
        limit: usize,
    ) -> PersistenceResult<Vec<Report>> {
        let mut reports: Vec<Report> = self
            .reports
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.value().clone())
            .collect();
        reports.sort_by_key(|r| r.created_at);
        reports.truncate(limit);
        Ok(reports)
    }
}
