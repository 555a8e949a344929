use serde::{Deserialize, Serialize};
use std::fmt;

/// Report lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportState {
    /// Ingested, never processed
    #[default]
    Pending,
    /// A processing attempt is in flight
    Processing,
    /// Last attempt produced a verdict
    Processed,
    /// Last attempt produced no usable analysis
    Failed,
    /// Confirmed by a human reviewer (set outside the analysis core)
    Reviewed,
}

impl ReportState {
    /// Terminal for a processing attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    /// Check if an attempt is currently running
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Processing)
    }

    /// Whether a new processing attempt may start from this state
    pub fn accepts_processing(&self) -> bool {
        matches!(self, Self::Pending | Self::Processed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
            Self::Reviewed => "REVIEWED",
        }
    }
}

impl fmt::Display for ReportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "PROCESSED" => Ok(Self::Processed),
            "FAILED" => Ok(Self::Failed),
            "REVIEWED" => Ok(Self::Reviewed),
            _ => Err(format!("Invalid report state: {s}")),
        }
    }
}
