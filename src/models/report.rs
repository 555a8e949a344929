use crate::state_machine::ReportState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A civic issue report as seen by the analysis core.
///
/// Only the lifecycle controller writes reports; everything else reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub status: ReportState,
    /// Free-text description submitted with the report
    pub text: Option<String>,
    /// Fetchable location of the report's primary media
    pub media_reference: Option<String>,
    /// 0..=10, set by a successful verdict
    pub severity_score: Option<f64>,
    /// 0..=1, set by a successful verdict
    pub confidence_score: Option<f64>,
    pub issue_label: Option<String>,
    /// Processing attempts started so far
    pub processing_attempts: u32,
    pub created_at: DateTime<Utc>,
    /// Set when an attempt reaches a terminal state
    pub processed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// Create a new pending report
    pub fn new(text: Option<String>, media_reference: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: ReportState::Pending,
            text,
            media_reference,
            severity_score: None,
            confidence_score: None,
            issue_label: None,
            processing_attempts: 0,
            created_at: now,
            processed_at: None,
            updated_at: now,
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(Some(text.into()), None)
    }

    pub fn with_media(media_reference: impl Into<String>) -> Self {
        Self::new(None, Some(media_reference.into()))
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn has_media(&self) -> bool {
        self.media_reference
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty())
    }
}
