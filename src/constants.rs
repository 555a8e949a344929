//! # System Constants
//!
//! Operational constants for report analysis: default thresholds, the candidate issue
//! label set, and the lifecycle event names used in structured logs.

/// Report lifecycle events emitted through structured logging
pub mod events {
    pub const REPORT_ENQUEUED: &str = "report.enqueued";
    pub const REPORT_PROCESSING_STARTED: &str = "report.processing_started";
    pub const REPORT_PROCESSED: &str = "report.processed";
    pub const REPORT_FAILED: &str = "report.failed";
    pub const REPORT_SKIPPED: &str = "report.skipped";

    pub const PIPELINE_STARTED: &str = "pipeline.started";
    pub const PIPELINE_SUCCEEDED: &str = "pipeline.succeeded";
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    pub const PIPELINE_DEADLINE_EXCEEDED: &str = "pipeline.deadline_exceeded";
}

/// Analysis defaults applied when configuration leaves a value unset
pub mod analysis {
    /// Minimum confidence for a text classification label to become the primary label
    pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

    /// Severity weight for labels missing from the weight table
    pub const DEFAULT_SEVERITY_WEIGHT: f64 = 1.0;

    pub const MIN_SEVERITY_SCORE: f64 = 0.0;
    pub const MAX_SEVERITY_SCORE: f64 = 10.0;

    /// Captioning providers return no score; captions carry this fixed confidence
    pub const CAPTION_CONFIDENCE: f64 = 0.8;

    pub const DEFAULT_VQA_QUESTION: &str = "What issue is shown in this image?";

    /// Candidate labels offered to zero-shot text classification
    pub const DEFAULT_ISSUE_LABELS: &[&str] = &[
        "pothole",
        "flooding",
        "graffiti",
        "broken streetlight",
        "trash overflow",
        "traffic accident",
        "downed power line",
        "damaged road sign",
        "debris",
        "vandalism",
        "other",
    ];
}

/// System-wide constants
pub mod system {
    pub const CIVINSIGHT_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Prefix for environment variable configuration overrides
    pub const ENV_PREFIX: &str = "CIVINSIGHT";
    pub const ENV_SEPARATOR: &str = "__";

    pub const DEFAULT_CONFIG_PATH: &str = "config/civinsight.toml";
    pub const CONFIG_PATH_ENV: &str = "CIVINSIGHT_CONFIG_PATH";
    pub const ENVIRONMENT_ENV: &str = "CIVINSIGHT_ENV";
}
