//! # Report Persistence
//!
//! The [`ReportRepository`] trait is the storage seam used by the state machine and
//! the lifecycle controller. Two implementations ship with the crate:
//!
//! - [`InMemoryReportRepository`]: `DashMap`-backed, used by tests and local runs
//! - [`PgReportRepository`]: PostgreSQL via `sqlx`, schema in `migrations/`
//!
//! Only the lifecycle controller writes through a repository.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryReportRepository;
#[cfg(feature = "postgres")]
pub use postgres::PgReportRepository;

use crate::capability::Capability;
use crate::models::{
    NewReportTransition, PipelineOutcome, PipelineResult, Report, ReportTransition,
};
use crate::state_machine::ReportState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value for {field}: {value}")]
    InvalidData { field: String, value: String },

    #[error("Storage error: {0}")]
    Storage(String),

    /// The stored report is missing or no longer in the status the write expected
    #[error("Report {report_id} is no longer {expected}")]
    Conflict {
        report_id: Uuid,
        expected: ReportState,
    },
}

impl PersistenceError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Raw pipeline output kept alongside the report for later inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    pub report_id: Uuid,
    pub attempt: u32,
    pub pipeline: Capability,
    pub outcome: PipelineOutcome,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl AnalysisArtifact {
    pub fn from_result(report_id: Uuid, attempt: u32, result: &PipelineResult) -> Self {
        Self {
            report_id,
            attempt,
            pipeline: result.pipeline,
            outcome: result.outcome.clone(),
            latency_ms: u64::try_from(result.latency.as_millis()).unwrap_or(u64::MAX),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn load_report(&self, report_id: Uuid) -> PersistenceResult<Option<Report>>;

    /// Insert or overwrite the report row
    async fn save_report(&self, report: &Report) -> PersistenceResult<()>;

    /// Overwrite the report only while its stored status is still `expected`.
    ///
    /// Fails with [`PersistenceError::Conflict`] when the row is missing or has moved
    /// to another status since it was loaded.
    async fn update_report_if_status(
        &self,
        report: &Report,
        expected: ReportState,
    ) -> PersistenceResult<()>;

    /// Append the transition to the report's audit trail, assigning its sort key
    async fn record_transition(
        &self,
        transition: NewReportTransition,
    ) -> PersistenceResult<ReportTransition>;

    /// Store the raw result of one pipeline for audit
    async fn save_artifact(
        &self,
        report_id: Uuid,
        attempt: u32,
        result: &PipelineResult,
    ) -> PersistenceResult<()>;

    /// Store every pipeline result of one attempt
    async fn save_artifacts(
        &self,
        report_id: Uuid,
        attempt: u32,
        results: &[PipelineResult],
    ) -> PersistenceResult<()> {
        for result in results {
            self.save_artifact(report_id, attempt, result).await?;
        }
        Ok(())
    }

    /// Oldest-first reports in `status`
    async fn list_reports_by_status(
        &self,
        status: ReportState,
        limit: usize,
    ) -> PersistenceResult<Vec<Report>>;
}
