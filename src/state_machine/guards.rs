use super::errors::{StateMachineError, StateMachineResult};
use super::events::ReportEvent;
use crate::models::Report;

/// Trait for implementing state transition guards
pub trait StateGuard<T> {
    /// Check if a transition triggered by `event` is allowed
    fn check(&self, entity: &T, event: &ReportEvent) -> StateMachineResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Refuses to start another attempt once the attempt bound is reached
pub struct ProcessingAttemptsGuard {
    max_attempts: u32,
}

impl ProcessingAttemptsGuard {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl StateGuard<Report> for ProcessingAttemptsGuard {
    fn check(&self, report: &Report, event: &ReportEvent) -> StateMachineResult<()> {
        if matches!(event, ReportEvent::Start) && report.processing_attempts >= self.max_attempts {
            return Err(StateMachineError::AttemptsExhausted {
                attempts: report.processing_attempts,
                max_attempts: self.max_attempts,
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Processing attempts must be below the configured bound"
    }
}
