//! Scripted capability client for orchestration tests

use async_trait::async_trait;
use civinsight_core::capability::{
    Capability, CapabilityClient, CapabilityError, CapabilityPayload, CapabilityRequest,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a scripted capability does when invoked
#[derive(Debug, Clone)]
pub enum Behavior {
    Respond {
        payload: CapabilityPayload,
        delay: Duration,
    },
    Fail {
        error: CapabilityError,
        delay: Duration,
    },
    /// Fail `failures` times, then respond
    FailThenRespond {
        failures: u32,
        error: CapabilityError,
        payload: CapabilityPayload,
    },
    Panic(String),
}

impl Behavior {
    pub fn respond(payload: CapabilityPayload) -> Self {
        Self::Respond {
            payload,
            delay: Duration::ZERO,
        }
    }

    pub fn respond_after(delay: Duration, payload: CapabilityPayload) -> Self {
        Self::Respond { payload, delay }
    }

    pub fn fail(error: CapabilityError) -> Self {
        Self::Fail {
            error,
            delay: Duration::ZERO,
        }
    }
}

type InvokeHook = Arc<dyn Fn(&CapabilityRequest) + Send + Sync>;

#[derive(Default)]
pub struct ScriptedCapabilityClient {
    behaviors: Mutex<HashMap<Capability, Behavior>>,
    calls: Mutex<BTreeMap<Capability, u32>>,
    requests: Mutex<Vec<CapabilityRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    on_invoke: Mutex<Option<InvokeHook>>,
}

impl ScriptedCapabilityClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, capability: Capability, behavior: Behavior) -> Self {
        self.behaviors.lock().insert(capability, behavior);
        self
    }

    /// Run `hook` at the start of every invocation
    pub fn on_invoke(self, hook: impl Fn(&CapabilityRequest) + Send + Sync + 'static) -> Self {
        *self.on_invoke.lock() = Some(Arc::new(hook));
        self
    }

    pub fn calls(&self, capability: Capability) -> u32 {
        self.calls.lock().get(&capability).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    pub fn requests(&self) -> Vec<CapabilityRequest> {
        self.requests.lock().clone()
    }

    /// Highest number of concurrent invocations observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CapabilityClient for ScriptedCapabilityClient {
    async fn invoke(
        &self,
        request: &CapabilityRequest,
        _timeout: Duration,
    ) -> Result<CapabilityPayload, CapabilityError> {
        let hook = self.on_invoke.lock().clone();
        if let Some(hook) = hook {
            hook(request);
        }

        let call_number = {
            let mut calls = self.calls.lock();
            let count = calls.entry(request.capability).or_insert(0);
            *count += 1;
            *count
        };
        self.requests.lock().push(request.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let behavior = self.behaviors.lock().get(&request.capability).cloned();
        match behavior {
            Some(Behavior::Respond { payload, delay }) => {
                tokio::time::sleep(delay).await;
                Ok(payload)
            }
            Some(Behavior::Fail { error, delay }) => {
                tokio::time::sleep(delay).await;
                Err(error)
            }
            Some(Behavior::FailThenRespond {
                failures,
                error,
                payload,
            }) => {
                if call_number <= failures {
                    Err(error)
                } else {
                    Ok(payload)
                }
            }
            Some(Behavior::Panic(message)) => panic!("{message}"),
            None => Err(CapabilityError::malformed(format!(
                "no behavior scripted for {}",
                request.capability
            ))),
        }
    }

    fn client_name(&self) -> &'static str {
        "scripted"
    }
}

pub fn classification(label: &str, confidence: f64) -> CapabilityPayload {
    CapabilityPayload::Classification {
        label: label.to_string(),
        confidence,
        scores: BTreeMap::from([(label.to_string(), confidence)]),
    }
}

pub fn caption(text: &str) -> CapabilityPayload {
    CapabilityPayload::Caption {
        text: text.to_string(),
        confidence: 0.8,
    }
}

pub fn detection(label: &str, confidence: f64) -> CapabilityPayload {
    CapabilityPayload::Detections {
        detections: vec![civinsight_core::capability::Detection {
            label: label.to_string(),
            confidence,
            bbox: None,
        }],
    }
}

pub fn answer(text: &str, confidence: f64) -> CapabilityPayload {
    CapabilityPayload::Answer {
        answer: text.to_string(),
        confidence,
    }
}
