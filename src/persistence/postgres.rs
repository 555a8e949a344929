use super::{AnalysisArtifact, PersistenceError, PersistenceResult, ReportRepository};
use crate::config::DatabaseConfig;
use crate::models::{NewReportTransition, PipelineResult, Report, ReportTransition};
use crate::state_machine::ReportState;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

const REPORT_COLUMNS: &str = "id, status, text, media_reference, severity_score, \
     confidence_score, issue_label, processing_attempts, created_at, processed_at, updated_at";

/// PostgreSQL-backed report repository
#[derive(Debug, Clone)]
pub struct PgReportRepository {
    pool: PgPool,
}

impl PgReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool from database configuration
    pub async fn connect(config: &DatabaseConfig) -> PersistenceResult<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            PersistenceError::Storage("database.url is not configured".to_string())
        })?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> PersistenceResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Report schema migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> PersistenceResult<bool> {
        let row = sqlx::query("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await?;
        let health: i32 = row.try_get("health")?;
        Ok(health == 1)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_state(field: &str, value: &str) -> PersistenceResult<ReportState> {
    ReportState::from_str(value).map_err(|_| PersistenceError::InvalidData {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn to_i32(field: &str, value: u32) -> PersistenceResult<i32> {
    i32::try_from(value).map_err(|_| PersistenceError::InvalidData {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn to_u32(field: &str, value: i32) -> PersistenceResult<u32> {
    u32::try_from(value).map_err(|_| PersistenceError::InvalidData {
        field: field.to_string(),
        value: value.to_string(),
    })
}

type PgQuery = sqlx::query::Query<'static, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn insert_artifact(artifact: &AnalysisArtifact) -> PersistenceResult<PgQuery> {
    Ok(sqlx::query(
        r#"
        INSERT INTO civinsight_analysis_artifacts
            (report_id, attempt, pipeline, outcome, latency_ms, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(artifact.report_id)
    .bind(to_i32("attempt", artifact.attempt)?)
    .bind(artifact.pipeline.as_str())
    .bind(serde_json::to_value(&artifact.outcome)?)
    .bind(i64::try_from(artifact.latency_ms).unwrap_or(i64::MAX))
    .bind(artifact.created_at))
}

fn report_from_row(row: &PgRow) -> PersistenceResult<Report> {
    let status: String = row.try_get("status")?;
    let attempts: i32 = row.try_get("processing_attempts")?;
    Ok(Report {
        id: row.try_get("id")?,
        status: parse_state("status", &status)?,
        text: row.try_get("text")?,
        media_reference: row.try_get("media_reference")?,
        severity_score: row.try_get("severity_score")?,
        confidence_score: row.try_get("confidence_score")?,
        issue_label: row.try_get("issue_label")?,
        processing_attempts: to_u32("processing_attempts", attempts)?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn load_report(&self, report_id: Uuid) -> PersistenceResult<Option<Report>> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM civinsight_reports WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(report_from_row).transpose()
    }

    async fn save_report(&self, report: &Report) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO civinsight_reports (
                id, status, text, media_reference, severity_score, confidence_score,
                issue_label, processing_attempts, created_at, processed_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                text = EXCLUDED.text,
                media_reference = EXCLUDED.media_reference,
                severity_score = EXCLUDED.severity_score,
                confidence_score = EXCLUDED.confidence_score,
                issue_label = EXCLUDED.issue_label,
                processing_attempts = EXCLUDED.processing_attempts,
                processed_at = EXCLUDED.processed_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(report.id)
        .bind(report.status.as_str())
        .bind(&report.text)
        .bind(&report.media_reference)
        .bind(report.severity_score)
        .bind(report.confidence_score)
        .bind(&report.issue_label)
        .bind(to_i32("processing_attempts", report.processing_attempts)?)
        .bind(report.created_at)
        .bind(report.processed_at)
        .bind(report.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_report_if_status(
        &self,
        report: &Report,
        expected: ReportState,
    ) -> PersistenceResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE civinsight_reports SET
                status = $2,
                severity_score = $3,
                confidence_score = $4,
                issue_label = $5,
                processing_attempts = $6,
                processed_at = $7,
                updated_at = $8
            WHERE id = $1 AND status = $9
            "#,
        )
        .bind(report.id)
        .bind(report.status.as_str())
        .bind(report.severity_score)
        .bind(report.confidence_score)
        .bind(&report.issue_label)
        .bind(to_i32("processing_attempts", report.processing_attempts)?)
        .bind(report.processed_at)
        .bind(report.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::Conflict {
                report_id: report.id,
                expected,
            });
        }
        Ok(())
    }

    async fn record_transition(
        &self,
        transition: NewReportTransition,
    ) -> PersistenceResult<ReportTransition> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE civinsight_report_transitions SET most_recent = FALSE \
             WHERE report_id = $1 AND most_recent",
        )
        .bind(transition.report_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            r#"
            INSERT INTO civinsight_report_transitions (
                report_id, from_state, to_state, event, attempt, sort_key, most_recent, metadata
            )
            SELECT $1, $2, $3, $4, $5,
                   COALESCE(MAX(sort_key), 0) + 1, TRUE, $6
            FROM civinsight_report_transitions
            WHERE report_id = $1
            RETURNING sort_key, created_at
            "#,
        )
        .bind(transition.report_id)
        .bind(transition.from_state.map(|s| s.as_str()))
        .bind(transition.to_state.as_str())
        .bind(&transition.event)
        .bind(to_i32("attempt", transition.attempt)?)
        .bind(&transition.metadata)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let sort_key: i32 = row.try_get("sort_key")?;
        let mut recorded = transition.into_transition(sort_key);
        recorded.created_at = row.try_get("created_at")?;
        Ok(recorded)
    }

    async fn save_artifact(
        &self,
        report_id: Uuid,
        attempt: u32,
        result: &PipelineResult,
    ) -> PersistenceResult<()> {
        let artifact = AnalysisArtifact::from_result(report_id, attempt, result);
        insert_artifact(&artifact)?.execute(&self.pool).await?;
        Ok(())
    }

    async fn save_artifacts(
        &self,
        report_id: Uuid,
        attempt: u32,
        results: &[PipelineResult],
    ) -> PersistenceResult<()> {
        let mut tx = self.pool.begin().await?;
        for result in results {
            let artifact = AnalysisArtifact::from_result(report_id, attempt, result);
            insert_artifact(&artifact)?.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_reports_by_status(
        &self,
        status: ReportState,
        limit: usize,
    ) -> PersistenceResult<Vec<Report>> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM civinsight_reports \
             WHERE status = $1 ORDER BY created_at ASC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(report_from_row).collect()
    }
}
