//! Dispatcher port bridging command events to workflow submissions.

use async_trait::async_trait;

use facteur_core::dispatch::{DispatchRequest, DispatchResult, StatusReport};
use facteur_core::error::BridgeError;

/// Turns a command into a workflow submission and reports template health.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchResult, BridgeError>;

    async fn status(&self) -> Result<StatusReport, BridgeError>;
}
