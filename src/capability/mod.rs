//! # Inference Capabilities
//!
//! A capability is one named remote inference function (text classification, image
//! captioning, object detection, visual question answering). The [`CapabilityClient`]
//! trait is the only seam between orchestration and the inference provider; it carries
//! no shared mutable state and is safe to call concurrently.
//!
//! The capability-to-model table is an immutable [`CapabilityModels`] value handed to a
//! client at construction rather than process-wide state.

pub mod client;
pub mod errors;
pub mod http_client;
pub mod types;

pub use client::{invoke_with_timeout, probe_all, CapabilityClient};
pub use errors::{CapabilityError, ErrorCategory};
pub use http_client::HttpCapabilityClient;
pub use types::{
    BoundingBox, CapabilityPayload, CapabilityRequest, CapabilityStatus, Detection,
};

use crate::config::{ConfigurationError, InferenceConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Remote inference capabilities known to the analysis core
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextClassification,
    ImageCaption,
    ObjectDetection,
    #[serde(rename = "vqa")]
    VisualQuestionAnswering,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::TextClassification,
        Capability::ImageCaption,
        Capability::ObjectDetection,
        Capability::VisualQuestionAnswering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextClassification => "text_classification",
            Self::ImageCaption => "image_caption",
            Self::ObjectDetection => "object_detection",
            Self::VisualQuestionAnswering => "vqa",
        }
    }

    /// Whether the capability consumes report media
    pub fn requires_media(&self) -> bool {
        !matches!(self, Self::TextClassification)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_classification" => Ok(Self::TextClassification),
            "image_caption" => Ok(Self::ImageCaption),
            "object_detection" => Ok(Self::ObjectDetection),
            "vqa" | "visual_question_answering" => Ok(Self::VisualQuestionAnswering),
            _ => Err(format!("Unknown capability: {s}")),
        }
    }
}

/// Immutable capability → provider model identifier table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityModels {
    models: BTreeMap<Capability, String>,
}

impl CapabilityModels {
    pub fn new(models: BTreeMap<Capability, String>) -> Self {
        Self { models }
    }

    /// Build the table from inference configuration, rejecting unknown capability names
    pub fn from_config(config: &InferenceConfig) -> Result<Self, ConfigurationError> {
        let mut models = BTreeMap::new();
        for (name, model_id) in &config.models {
            let capability: Capability = name.parse().map_err(|reason: String| {
                ConfigurationError::invalid_value(
                    format!("inference.models.{name}"),
                    model_id,
                    reason,
                )
            })?;
            models.insert(capability, model_id.clone());
        }
        Ok(Self { models })
    }

    pub fn model_for(&self, capability: Capability) -> Option<&str> {
        self.models.get(&capability).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Capability, &str)> {
        self.models.iter().map(|(c, m)| (*c, m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_string_conversion() {
        for capability in Capability::ALL {
            assert_eq!(capability.as_str().parse::<Capability>().unwrap(), capability);
        }
        assert!("sentiment".parse::<Capability>().is_err());
    }

    #[test]
    fn test_capability_serde_matches_display() {
        let json = serde_json::to_string(&Capability::VisualQuestionAnswering).unwrap();
        assert_eq!(json, "\"vqa\"");
        assert_eq!(Capability::ObjectDetection.to_string(), "object_detection");
    }

    #[test]
    fn test_models_from_default_config() {
        let models = CapabilityModels::from_config(&InferenceConfig::default()).unwrap();
        assert_eq!(
            models.model_for(Capability::TextClassification),
            Some("facebook/bart-large-mnli")
        );
        assert_eq!(models.iter().count(), 4);
    }

    #[test]
    fn test_models_reject_unknown_capability() {
        let mut config = InferenceConfig::default();
        config
            .models
            .insert("sentiment".to_string(), "some/model".to_string());

        let err = CapabilityModels::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("inference.models.sentiment"));
    }
}
