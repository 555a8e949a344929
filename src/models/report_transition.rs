//! # Report Transition Model
//!
//! Audit trail of report state changes. Each transition captures the state change,
//! the triggering event and the processing attempt it belongs to. `sort_key` orders a
//! report's transitions chronologically and is assigned by the repository.

use crate::state_machine::ReportState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recorded state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTransition {
    pub report_id: Uuid,
    pub from_state: Option<ReportState>,
    pub to_state: ReportState,
    pub event: String,
    pub attempt: u32,
    pub sort_key: i32,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A transition about to be recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReportTransition {
    pub report_id: Uuid,
    pub from_state: Option<ReportState>,
    pub to_state: ReportState,
    pub event: String,
    pub attempt: u32,
    pub metadata: Option<serde_json::Value>,
}

impl NewReportTransition {
    /// Stamp with a sort key and creation time
    pub fn into_transition(self, sort_key: i32) -> ReportTransition {
        ReportTransition {
            report_id: self.report_id,
            from_state: self.from_state,
            to_state: self.to_state,
            event: self.event,
            attempt: self.attempt,
            sort_key,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}
