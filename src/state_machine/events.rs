use crate::models::Verdict;
use serde::{Deserialize, Serialize};

/// Events that can trigger report state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReportEvent {
    /// Begin a processing attempt
    Start,
    /// Attempt produced a verdict
    Complete(Verdict),
    /// Attempt produced nothing usable
    Fail(String),
    /// Human review of a processed report
    Review,
}

impl ReportEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete(_) => "complete",
            Self::Fail(_) => "fail",
            Self::Review => "review",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
