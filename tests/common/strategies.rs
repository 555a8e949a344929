use civinsight_core::capability::{Capability, CapabilityError, CapabilityPayload, Detection};
use civinsight_core::models::PipelineResult;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;

pub fn capability_strategy() -> impl Strategy<Value = Capability> {
    prop::sample::select(Capability::ALL.to_vec())
}

pub fn label_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "pothole".to_string(),
        "flooding".to_string(),
        "graffiti".to_string(),
        "broken streetlight".to_string(),
        "debris".to_string(),
    ])
}

pub fn confidence_strategy() -> impl Strategy<Value = f64> {
    0.0f64..=1.0
}

fn payload_strategy(capability: Capability) -> BoxedStrategy<CapabilityPayload> {
    match capability {
        Capability::TextClassification => (label_strategy(), confidence_strategy())
            .prop_map(|(label, confidence)| CapabilityPayload::Classification {
                label,
                confidence,
                scores: BTreeMap::new(),
            })
            .boxed(),
        Capability::ImageCaption => confidence_strategy()
            .prop_map(|confidence| CapabilityPayload::Caption {
                text: "a street".to_string(),
                confidence,
            })
            .boxed(),
        Capability::ObjectDetection => {
            prop::collection::vec((label_strategy(), confidence_strategy()), 0..4)
                .prop_map(|found| CapabilityPayload::Detections {
                    detections: found
                        .into_iter()
                        .map(|(label, confidence)| Detection {
                            label,
                            confidence,
                            bbox: None,
                        })
                        .collect(),
                })
                .boxed()
        }
        Capability::VisualQuestionAnswering => confidence_strategy()
            .prop_map(|confidence| CapabilityPayload::Answer {
                answer: "a pothole".to_string(),
                confidence,
            })
            .boxed(),
    }
}

fn failure_strategy() -> impl Strategy<Value = CapabilityError> {
    prop_oneof![
        Just(CapabilityError::Timeout(Duration::from_secs(30))),
        Just(CapabilityError::unavailable(Some(503), "loading")),
        Just(CapabilityError::malformed("<html>")),
    ]
}

pub fn pipeline_result_strategy(capability: Capability) -> BoxedStrategy<PipelineResult> {
    prop_oneof![
        payload_strategy(capability).prop_map(move |payload| {
            PipelineResult::success(capability, payload, Duration::from_millis(50))
        }),
        failure_strategy().prop_map(move |error| {
            PipelineResult::failed(capability, error, Duration::from_millis(50))
        }),
    ]
    .boxed()
}

/// One result per distinct pipeline, in any subset
pub fn result_set_strategy() -> impl Strategy<Value = Vec<PipelineResult>> {
    prop::sample::subsequence(Capability::ALL.to_vec(), 0..=4).prop_flat_map(|pipelines| {
        pipelines
            .into_iter()
            .map(pipeline_result_strategy)
            .collect::<Vec<_>>()
    })
}

/// Result sets in which every pipeline failed
pub fn all_failed_strategy() -> impl Strategy<Value = Vec<PipelineResult>> {
    prop::sample::subsequence(Capability::ALL.to_vec(), 0..=4).prop_flat_map(|pipelines| {
        pipelines
            .into_iter()
            .map(|capability| {
                failure_strategy()
                    .prop_map(move |error| {
                        PipelineResult::failed(capability, error, Duration::from_millis(5))
                    })
                    .boxed()
            })
            .collect::<Vec<_>>()
    })
}

pub fn optional_text_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[ a-zA-Z0-9.,]{0,40}")
}
