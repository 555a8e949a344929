use super::types::{CapabilityPayload, CapabilityRequest, CapabilityStatus};
use super::{Capability, CapabilityError};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;

/// Invokes one named inference capability.
///
/// Implementations must be safe to call concurrently and must not mutate shared state
/// beyond the remote call itself.
#[async_trait]
pub trait CapabilityClient: Send + Sync {
    /// Invoke `request.capability`, honoring `timeout` for the whole call
    async fn invoke(
        &self,
        request: &CapabilityRequest,
        timeout: Duration,
    ) -> Result<CapabilityPayload, CapabilityError>;

    /// Check whether the model behind a capability is reachable
    async fn probe(&self, _capability: Capability) -> CapabilityStatus {
        CapabilityStatus::Available
    }

    /// Name used in logs
    fn client_name(&self) -> &'static str;
}

/// Invoke a capability with the timeout enforced locally as well as by the transport.
///
/// A transport that ignores its timeout still yields `CapabilityError::Timeout`.
pub async fn invoke_with_timeout(
    client: &dyn CapabilityClient,
    request: &CapabilityRequest,
    timeout: Duration,
) -> Result<CapabilityPayload, CapabilityError> {
    match tokio::time::timeout(timeout, client.invoke(request, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout(timeout)),
    }
}

/// Probe every capability concurrently
pub async fn probe_all(
    client: &dyn CapabilityClient,
    capabilities: &[Capability],
) -> BTreeMap<Capability, CapabilityStatus> {
    let statuses = join_all(capabilities.iter().map(|c| client.probe(*c))).await;
    capabilities.iter().copied().zip(statuses).collect()
}
