//! # Result Aggregator
//!
//! Merges one attempt's partial pipeline results into a [`Verdict`].
//!
//! - The primary label comes from text classification when it clears the confidence
//!   threshold, else from the strongest successful object detection, else none.
//! - Overall confidence is the arithmetic mean over successful pipelines.
//! - Severity is `overall_confidence * 10` times the label's configured weight
//!   (1.0 when unlisted), clamped to `[0, 10]`.
//! - Every attempted pipeline appears in the confidence map; failures map to 0.

use crate::capability::Capability;
use crate::config::AnalysisConfig;
use crate::constants::analysis::{DEFAULT_SEVERITY_WEIGHT, MAX_SEVERITY_SCORE, MIN_SEVERITY_SCORE};
use crate::models::{PipelineResult, Verdict};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct ResultAggregator {
    confidence_threshold: f64,
    /// Keys are normalized labels
    severity_weights: HashMap<String, f64>,
}

fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

impl ResultAggregator {
    pub fn new(confidence_threshold: f64, severity_weights: HashMap<String, f64>) -> Self {
        Self {
            confidence_threshold,
            severity_weights: severity_weights
                .into_iter()
                .map(|(label, weight)| (normalize_label(&label), weight))
                .collect(),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.confidence_threshold, config.severity_weights.clone())
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn severity_weight(&self, label: Option<&str>) -> f64 {
        label
            .and_then(|l| self.severity_weights.get(&normalize_label(l)))
            .copied()
            .unwrap_or(DEFAULT_SEVERITY_WEIGHT)
    }

    pub fn aggregate(&self, results: &[PipelineResult]) -> Verdict {
        let per_pipeline_confidence: BTreeMap<Capability, f64> = results
            .iter()
            .map(|r| (r.pipeline, r.confidence()))
            .collect();

        let successes: Vec<&PipelineResult> = results.iter().filter(|r| r.is_success()).collect();
        let attempted_count = results.len();
        let succeeded_count = successes.len();

        if succeeded_count == 0 {
            return Verdict {
                primary_label: None,
                severity_score: 0.0,
                overall_confidence: 0.0,
                per_pipeline_confidence,
                succeeded_count,
                attempted_count,
            };
        }

        let overall_confidence =
            successes.iter().map(|r| r.confidence()).sum::<f64>() / succeeded_count as f64;
        let primary_label = self.primary_label(&successes);
        let weight = self.severity_weight(primary_label.as_deref());
        let severity = overall_confidence * MAX_SEVERITY_SCORE * weight;
        let severity_score = if severity.is_finite() {
            severity.clamp(MIN_SEVERITY_SCORE, MAX_SEVERITY_SCORE)
        } else {
            MIN_SEVERITY_SCORE
        };

        Verdict {
            primary_label,
            severity_score,
            overall_confidence,
            per_pipeline_confidence,
            succeeded_count,
            attempted_count,
        }
    }

    fn primary_label(&self, successes: &[&PipelineResult]) -> Option<String> {
        let classified = successes
            .iter()
            .filter(|r| r.pipeline == Capability::TextClassification)
            .filter(|r| r.confidence() >= self.confidence_threshold)
            .find_map(|r| r.payload().and_then(|p| p.label()));
        if let Some(label) = classified {
            return Some(label.to_string());
        }

        successes
            .iter()
            .filter(|r| r.pipeline == Capability::ObjectDetection)
            .filter_map(|r| r.payload().and_then(|p| p.label()).map(|l| (l, r.confidence())))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(label, _)| label.to_string())
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}
