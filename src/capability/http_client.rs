//! Hosted-inference HTTP transport for capabilities.
//!
//! Each capability maps to a model endpoint at `{api_url}/{model_id}`. Media is fetched
//! from its reference and forwarded to the model; the provider's raw responses are
//! normalized into [`CapabilityPayload`] values.

use super::types::{BoundingBox, CapabilityPayload, CapabilityRequest, CapabilityStatus, Detection};
use super::{Capability, CapabilityClient, CapabilityError, CapabilityModels};
use crate::config::CivInsightConfig;
use crate::constants::analysis::{CAPTION_CONFIDENCE, DEFAULT_VQA_QUESTION};
use crate::error::{CivInsightError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("civinsight-core/", env!("CARGO_PKG_VERSION"));
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct ZeroShotResponse {
    labels: Vec<String>,
    scores: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    label: String,
    score: f64,
    #[serde(rename = "box")]
    bbox: Option<BoundingBox>,
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    answer: String,
    score: f64,
}

/// reqwest-backed [`CapabilityClient`]
#[derive(Debug, Clone)]
pub struct HttpCapabilityClient {
    http: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
    models: CapabilityModels,
    issue_labels: Vec<String>,
    /// Detections scoring below this are discarded
    detection_threshold: f64,
}

impl HttpCapabilityClient {
    pub fn new(
        api_url: impl Into<String>,
        api_token: Option<String>,
        models: CapabilityModels,
        issue_labels: Vec<String>,
        detection_threshold: f64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CivInsightError::Internal(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_token,
            models,
            issue_labels,
            detection_threshold,
        })
    }

    pub fn from_config(config: &CivInsightConfig) -> Result<Self> {
        let models = CapabilityModels::from_config(&config.inference)?;
        Self::new(
            config.inference.api_url.clone(),
            config.inference.api_token.clone(),
            models,
            config.analysis.issue_labels.clone(),
            config.analysis.confidence_threshold,
        )
    }

    fn model_url(&self, capability: Capability) -> std::result::Result<String, CapabilityError> {
        self.models
            .model_for(capability)
            .map(|model| format!("{}/{}", self.api_url, model))
            .ok_or_else(|| {
                CapabilityError::malformed(format!("no model configured for {capability}"))
            })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn fetch_media(
        &self,
        request: &CapabilityRequest,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, CapabilityError> {
        let reference = request.media_reference.as_deref().ok_or_else(|| {
            CapabilityError::malformed(format!("{} requires media", request.capability))
        })?;

        debug!(capability = %request.capability, media = %reference, "Fetching media");

        let response = self
            .http
            .get(reference)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(status.as_u16(), truncate(&body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;
        Ok(bytes.to_vec())
    }

    async fn send_for<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> std::result::Result<T, CapabilityError> {
        let response = self
            .authorized(builder)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(CapabilityError::from_status(status.as_u16(), truncate(&text)));
        }

        serde_json::from_slice(&body).map_err(|e| {
            CapabilityError::malformed(format!(
                "{e}: {}",
                truncate(&String::from_utf8_lossy(&body))
            ))
        })
    }

    async fn classify_text(
        &self,
        request: &CapabilityRequest,
        timeout: Duration,
    ) -> std::result::Result<CapabilityPayload, CapabilityError> {
        let text = request
            .text
            .as_deref()
            .ok_or_else(|| CapabilityError::malformed("text classification requires text"))?;
        let url = self.model_url(request.capability)?;

        let body = serde_json::json!({
            "inputs": text,
            "parameters": { "candidate_labels": self.issue_labels },
        });
        let response: ZeroShotResponse = self
            .send_for(self.http.post(url).json(&body), timeout)
            .await?;
        parse_classification(response)
    }

    async fn caption_image(
        &self,
        request: &CapabilityRequest,
        timeout: Duration,
    ) -> std::result::Result<CapabilityPayload, CapabilityError> {
        let url = self.model_url(request.capability)?;
        let image = self.fetch_media(request, timeout).await?;
        let response: Vec<GeneratedText> =
            self.send_for(self.http.post(url).body(image), timeout).await?;
        parse_caption(response)
    }

    async fn detect_objects(
        &self,
        request: &CapabilityRequest,
        timeout: Duration,
    ) -> std::result::Result<CapabilityPayload, CapabilityError> {
        let url = self.model_url(request.capability)?;
        let image = self.fetch_media(request, timeout).await?;
        let response: Vec<RawDetection> =
            self.send_for(self.http.post(url).body(image), timeout).await?;
        Ok(parse_detections(response, self.detection_threshold))
    }

    async fn answer_question(
        &self,
        request: &CapabilityRequest,
        timeout: Duration,
    ) -> std::result::Result<CapabilityPayload, CapabilityError> {
        let url = self.model_url(request.capability)?;
        let image = self.fetch_media(request, timeout).await?;
        let question = request.question.as_deref().unwrap_or(DEFAULT_VQA_QUESTION);

        let body = serde_json::json!({
            "inputs": {
                "question": question,
                "image": base64::engine::general_purpose::STANDARD.encode(image),
            }
        });
        let response: Vec<RawAnswer> = self
            .send_for(self.http.post(url).json(&body), timeout)
            .await?;
        parse_answer(response)
    }
}

#[async_trait]
impl CapabilityClient for HttpCapabilityClient {
    async fn invoke(
        &self,
        request: &CapabilityRequest,
        timeout: Duration,
    ) -> std::result::Result<CapabilityPayload, CapabilityError> {
        match request.capability {
            Capability::TextClassification => self.classify_text(request, timeout).await,
            Capability::ImageCaption => self.caption_image(request, timeout).await,
            Capability::ObjectDetection => self.detect_objects(request, timeout).await,
            Capability::VisualQuestionAnswering => self.answer_question(request, timeout).await,
        }
    }

    async fn probe(&self, capability: Capability) -> CapabilityStatus {
        let url = match self.model_url(capability) {
            Ok(url) => url,
            Err(e) => {
                return CapabilityStatus::Error {
                    message: e.to_string(),
                }
            }
        };

        match self
            .authorized(self.http.get(url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => CapabilityStatus::Available,
            Ok(response) => CapabilityStatus::Unavailable {
                http_status: Some(response.status().as_u16()),
            },
            Err(e) => {
                warn!(capability = %capability, error = %e, "Capability probe failed");
                CapabilityStatus::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    fn client_name(&self) -> &'static str {
        "http"
    }
}

fn map_transport_error(error: reqwest::Error, timeout: Duration) -> CapabilityError {
    if error.is_timeout() {
        CapabilityError::Timeout(timeout)
    } else if error.is_decode() {
        CapabilityError::malformed(error.to_string())
    } else {
        CapabilityError::unavailable(error.status().map(|s| s.as_u16()), error.to_string())
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

fn parse_classification(
    response: ZeroShotResponse,
) -> std::result::Result<CapabilityPayload, CapabilityError> {
    if response.labels.len() != response.scores.len() {
        return Err(CapabilityError::malformed(format!(
            "{} labels but {} scores",
            response.labels.len(),
            response.scores.len()
        )));
    }

    let (label, confidence) = response
        .labels
        .iter()
        .zip(response.scores.iter())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(label, score)| (label.clone(), *score))
        .ok_or_else(|| CapabilityError::malformed("classification returned no labels"))?;

    let scores: BTreeMap<String, f64> = response.labels.into_iter().zip(response.scores).collect();

    Ok(CapabilityPayload::Classification {
        label,
        confidence,
        scores,
    })
}

fn parse_caption(
    response: Vec<GeneratedText>,
) -> std::result::Result<CapabilityPayload, CapabilityError> {
    response
        .into_iter()
        .next()
        .map(|generated| CapabilityPayload::Caption {
            text: generated.generated_text,
            confidence: CAPTION_CONFIDENCE,
        })
        .ok_or_else(|| CapabilityError::malformed("captioning returned no text"))
}

fn parse_detections(response: Vec<RawDetection>, threshold: f64) -> CapabilityPayload {
    let detections = response
        .into_iter()
        .filter(|d| d.score >= threshold)
        .map(|d| Detection {
            label: d.label,
            confidence: d.score,
            bbox: d.bbox,
        })
        .collect();
    CapabilityPayload::Detections { detections }
}

fn parse_answer(
    response: Vec<RawAnswer>,
) -> std::result::Result<CapabilityPayload, CapabilityError> {
    response
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .map(|a| CapabilityPayload::Answer {
            answer: a.answer,
            confidence: a.score,
        })
        .ok_or_else(|| CapabilityError::malformed("question answering returned no answers"))
}
