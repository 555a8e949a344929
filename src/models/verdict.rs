use crate::capability::Capability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated outcome of one processing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub primary_label: Option<String>,
    /// 0..=10
    pub severity_score: f64,
    /// 0..=1, mean confidence of the successful pipelines
    pub overall_confidence: f64,
    /// Every attempted pipeline; failed pipelines map to 0.
    /// Pipelines that were never attempted are absent.
    pub per_pipeline_confidence: BTreeMap<Capability, f64>,
    pub succeeded_count: usize,
    pub attempted_count: usize,
}

impl Verdict {
    /// No pipeline succeeded, so there is no basis for a verdict
    pub fn is_failed(&self) -> bool {
        self.succeeded_count == 0
    }
}
