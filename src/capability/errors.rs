//! Capability failure taxonomy and retry classification.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Classified failure of a single capability invocation
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CapabilityError {
    /// The call did not complete within its budget
    #[error("Capability call timed out after {0:?}")]
    Timeout(Duration),

    /// The provider could not serve the request (5xx, 408, 429, connection failure)
    #[error("Capability unavailable (status {status:?}): {message}")]
    Unavailable { status: Option<u16>, message: String },

    /// The provider answered with something unusable (undecodable body, other 4xx)
    #[error("Malformed capability response: {body}")]
    Malformed { body: String },
}

/// Primary error categories for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// May succeed on retry
    Transient,
    /// Will never succeed if retried
    Permanent,
}

impl CapabilityError {
    pub fn unavailable(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            status,
            message: message.into(),
        }
    }

    pub fn malformed(body: impl Into<String>) -> Self {
        Self::Malformed { body: body.into() }
    }

    /// Map a non-success HTTP status to the taxonomy
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            408 | 429 | 500..=599 => Self::unavailable(Some(status), body),
            _ => Self::malformed(format!("HTTP {status}: {}", body.into())),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout(_) | Self::Unavailable { .. } => ErrorCategory::Transient,
            Self::Malformed { .. } => ErrorCategory::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
