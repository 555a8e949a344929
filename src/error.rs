use crate::capability::CapabilityError;
use crate::config::ConfigurationError;
use crate::orchestration::dispatch_queue::DispatchError;
use crate::orchestration::errors::LifecycleError;
use crate::persistence::PersistenceError;
use crate::state_machine::StateMachineError;
use thiserror::Error;

/// Crate-wide error type unifying every subsystem error
#[derive(Error, Debug)]
pub enum CivInsightError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CivInsightError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_subsystem_errors_convert_into_crate_error() {
        let err: CivInsightError = CapabilityError::Timeout(Duration::from_secs(2)).into();
        assert!(matches!(err, CivInsightError::Capability(_)));
        assert!(err.to_string().starts_with("Capability error"));

        let err: CivInsightError = DispatchError::QueueClosed.into();
        assert!(matches!(err, CivInsightError::Dispatch(_)));
    }
}
