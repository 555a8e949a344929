//! Request and payload types exchanged with inference capabilities.

use super::Capability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Abstract capability request: `(capability, text?, media_reference?)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub capability: Capability,
    pub text: Option<String>,
    /// Fetchable location of the report media
    pub media_reference: Option<String>,
    /// Question for visual question answering
    pub question: Option<String>,
}

impl CapabilityRequest {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            text: None,
            media_reference: None,
            question: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_media(mut self, media_reference: impl Into<String>) -> Self {
        self.media_reference = Some(media_reference.into());
        self
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }
}

/// Axis-aligned detection box in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    pub bbox: Option<BoundingBox>,
}

/// Typed result of a successful capability call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityPayload {
    Classification {
        label: String,
        confidence: f64,
        /// Score for every candidate label
        scores: BTreeMap<String, f64>,
    },
    Caption {
        text: String,
        confidence: f64,
    },
    Detections {
        detections: Vec<Detection>,
    },
    Answer {
        answer: String,
        confidence: f64,
    },
}

impl CapabilityPayload {
    /// Confidence of the payload as a whole, clamped to [0, 1].
    /// Detections report their strongest detection, or 0 when nothing was found.
    pub fn confidence(&self) -> f64 {
        let raw = match self {
            Self::Classification { confidence, .. }
            | Self::Caption { confidence, .. }
            | Self::Answer { confidence, .. } => *confidence,
            Self::Detections { detections } => detections
                .iter()
                .map(|d| d.confidence)
                .fold(0.0, f64::max),
        };
        if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Issue label carried by the payload, if it names one
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Classification { label, .. } => Some(label),
            Self::Detections { detections } => detections
                .iter()
                .filter(|d| d.confidence.is_finite())
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
                .map(|d| d.label.as_str()),
            Self::Caption { .. } | Self::Answer { .. } => None,
        }
    }
}

/// Availability of a capability's backing model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CapabilityStatus {
    Available,
    Unavailable { http_status: Option<u16> },
    Error { message: String },
}

impl CapabilityStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}
