use crate::capability::{Capability, CapabilityError, CapabilityPayload};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why a pipeline produced no payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    /// The capability failed permanently or exhausted its retries
    Capability { error: CapabilityError },
    /// The pipeline task itself died (panic or abort) before reporting
    Aborted { message: String },
}

impl FailureReason {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Capability { error } if error.is_timeout())
    }
}

impl From<CapabilityError> for FailureReason {
    fn from(error: CapabilityError) -> Self {
        Self::Capability { error }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capability { error } => write!(f, "{error}"),
            Self::Aborted { message } => write!(f, "pipeline aborted: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Success {
        payload: CapabilityPayload,
        confidence: f64,
    },
    Failed {
        reason: FailureReason,
    },
}

/// Outcome of one pipeline within one processing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub pipeline: Capability,
    pub outcome: PipelineOutcome,
    pub latency: Duration,
}

impl PipelineResult {
    pub fn success(pipeline: Capability, payload: CapabilityPayload, latency: Duration) -> Self {
        let confidence = payload.confidence();
        Self {
            pipeline,
            outcome: PipelineOutcome::Success {
                payload,
                confidence,
            },
            latency,
        }
    }

    pub fn failed(
        pipeline: Capability,
        reason: impl Into<FailureReason>,
        latency: Duration,
    ) -> Self {
        Self {
            pipeline,
            outcome: PipelineOutcome::Failed {
                reason: reason.into(),
            },
            latency,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::Success { .. })
    }

    /// Confidence of a successful result; 0 for failures
    pub fn confidence(&self) -> f64 {
        match &self.outcome {
            PipelineOutcome::Success { confidence, .. } => *confidence,
            PipelineOutcome::Failed { .. } => 0.0,
        }
    }

    pub fn payload(&self) -> Option<&CapabilityPayload> {
        match &self.outcome {
            PipelineOutcome::Success { payload, .. } => Some(payload),
            PipelineOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            PipelineOutcome::Success { .. } => None,
            PipelineOutcome::Failed { reason } => Some(reason),
        }
    }
}
