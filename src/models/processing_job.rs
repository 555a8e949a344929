use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A "process report R" job carried by the dispatch queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub report_id: Uuid,
    /// Delivery number of this job, starting at 1
    pub attempt_number: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn new(report_id: Uuid) -> Self {
        Self {
            report_id,
            attempt_number: 1,
            enqueued_at: Utc::now(),
        }
    }

    /// The same job scheduled for another delivery
    pub fn redelivery(&self) -> Self {
        Self {
            report_id: self.report_id,
            attempt_number: self.attempt_number.saturating_add(1),
            enqueued_at: Utc::now(),
        }
    }
}
