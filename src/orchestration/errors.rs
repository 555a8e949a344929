use crate::persistence::PersistenceError;
use crate::state_machine::StateMachineError;
use thiserror::Error;

/// Failures of the control logic around a processing attempt.
///
/// Pipeline failures never surface here; they become failed pipeline results.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
