use super::states::ReportState;
use crate::persistence::PersistenceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event '{event}'")]
    InvalidTransition { from: ReportState, event: String },

    #[error("Processing attempts exhausted ({attempts}/{max_attempts})")]
    AttemptsExhausted { attempts: u32, max_attempts: u32 },

    #[error("Persistence operation failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl StateMachineError {
    /// The stored report moved on since it was loaded
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Persistence(e) if e.is_conflict())
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
