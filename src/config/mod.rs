//! # CivInsight Configuration System
//!
//! Typed configuration for the analysis core. Every section deserializes with defaults,
//! so a partial TOML file or a handful of environment overrides is enough to run.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use civinsight_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let threshold = manager.config().analysis.confidence_threshold;
//! let deadline = manager.config().execution.overall_attempt_deadline();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::analysis::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_ISSUE_LABELS, DEFAULT_VQA_QUESTION,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/civinsight.toml`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CivInsightConfig {
    /// Deployment environment (development, test, production)
    pub environment: String,

    /// Verdict aggregation settings
    pub analysis: AnalysisConfig,

    /// Fan-out and attempt budgets
    pub execution: ExecutionConfig,

    /// Per-pipeline retry policy
    pub retry: RetryConfig,

    /// Dispatch queue and worker pool
    pub dispatch: DispatchConfig,

    /// Remote inference provider
    pub inference: InferenceConfig,

    /// Report persistence
    pub database: DatabaseConfig,
}

impl Default for CivInsightConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            analysis: AnalysisConfig::default(),
            execution: ExecutionConfig::default(),
            retry: RetryConfig::default(),
            dispatch: DispatchConfig::default(),
            inference: InferenceConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Aggregation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum confidence for a classification label to be trusted
    pub confidence_threshold: f64,
    /// Per-label severity multiplier; unlisted labels weigh 1.0
    pub severity_weights: HashMap<String, f64>,
    /// Candidate labels for zero-shot classification
    pub issue_labels: Vec<String>,
    /// Question asked of the VQA capability when a report has no text
    pub default_vqa_question: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            severity_weights: HashMap::new(),
            issue_labels: DEFAULT_ISSUE_LABELS.iter().map(|l| l.to_string()).collect(),
            default_vqa_question: DEFAULT_VQA_QUESTION.to_string(),
        }
    }
}

/// Fan-out execution budgets
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Pipelines allowed to run at once across all in-flight reports
    pub max_concurrent_pipelines: usize,
    pub capability_timeout_ms: u64,
    pub overall_attempt_deadline_ms: u64,
    /// Processing attempts allowed per report before redelivery is ignored
    pub max_processing_attempts: u32,
    /// Extra time past the attempt deadline before a PROCESSING report counts as abandoned
    pub stale_processing_grace_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pipelines: 4,
            capability_timeout_ms: 30_000,
            overall_attempt_deadline_ms: 90_000,
            max_processing_attempts: 5,
            stale_processing_grace_ms: 60_000,
        }
    }
}

impl ExecutionConfig {
    /// Get per-call capability timeout as Duration
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_millis(self.capability_timeout_ms)
    }

    /// Get per-attempt fan-out deadline as Duration
    pub fn overall_attempt_deadline(&self) -> Duration {
        Duration::from_millis(self.overall_attempt_deadline_ms)
    }

    pub fn stale_processing_grace(&self) -> Duration {
        Duration::from_millis(self.stale_processing_grace_ms)
    }
}

/// Retry policy for transient capability failures
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Dispatch queue and worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// Deliveries of one job before an erroring job is dropped
    pub max_deliveries: u32,
    pub redelivery_base_delay_ms: u64,
    pub redelivery_max_delay_ms: u64,
    /// Interval at which the worker binary sweeps pending reports into the queue
    pub sweep_interval_ms: u64,
    pub sweep_batch_size: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 1024,
            max_deliveries: 3,
            redelivery_base_delay_ms: 1_000,
            redelivery_max_delay_ms: 60_000,
            sweep_interval_ms: 5_000,
            sweep_batch_size: 100,
        }
    }
}

impl DispatchConfig {
    pub fn redelivery_base_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_base_delay_ms)
    }

    pub fn redelivery_max_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_max_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Remote inference provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    /// Capability name to provider model identifier
    pub models: HashMap<String, String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let models = [
            ("text_classification", "facebook/bart-large-mnli"),
            ("image_caption", "nlpconnect/vit-gpt2-image-captioning"),
            ("object_detection", "facebook/detr-resnet-50"),
            ("vqa", "dandelin/vilt-b32-finetuned-vqa"),
        ]
        .into_iter()
        .map(|(capability, model)| (capability.to_string(), model.to_string()))
        .collect();

        Self {
            api_url: "https://api-inference.huggingface.co/models".to_string(),
            api_token: None,
            models,
        }
    }
}

/// Report persistence configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl CivInsightConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let threshold = self.analysis.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigurationError::invalid_value(
                "analysis.confidence_threshold",
                threshold,
                "threshold must be within [0, 1]",
            ));
        }

        if let Some((label, weight)) = self
            .analysis
            .severity_weights
            .iter()
            .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
        {
            return Err(ConfigurationError::invalid_value(
                format!("analysis.severity_weights.{label}"),
                weight,
                "severity weights must be finite and non-negative",
            ));
        }

        if self.execution.max_concurrent_pipelines == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_concurrent_pipelines",
                "0",
                "at least one pipeline must be allowed to run",
            ));
        }

        if self.execution.capability_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.capability_timeout_ms",
                "0",
                "capability timeout must be greater than 0",
            ));
        }

        if self.execution.overall_attempt_deadline_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.overall_attempt_deadline_ms",
                "0",
                "attempt deadline must be greater than 0",
            ));
        }

        if self.execution.max_processing_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_processing_attempts",
                "0",
                "at least one processing attempt is required",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                "0",
                "at least one capability attempt is required",
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.base_delay_ms",
                self.retry.base_delay_ms,
                format!("base delay exceeds max delay ({}ms)", self.retry.max_delay_ms),
            ));
        }

        if self.dispatch.worker_count == 0 || self.dispatch.queue_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.worker_count",
                self.dispatch.worker_count,
                "worker count and queue capacity must be greater than 0",
            ));
        }

        if self.dispatch.max_deliveries == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.max_deliveries",
                "0",
                "jobs must be delivered at least once",
            ));
        }

        if self.inference.api_url.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "inference.api_url",
                "inference configuration",
            ));
        }

        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
