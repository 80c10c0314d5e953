//! Cluster workflow API collaborator and the clock port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use facteur_core::error::BridgeError;
use facteur_core::workflow::{SubmitRequest, SubmitResponse, TemplateStatus};

/// Minimal surface of the cluster workflow API.
///
/// The real implementation talks to the cluster; tests use in-memory fakes.
/// Failures of either call are reported verbatim to the caller.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    async fn submit_workflow(&self, request: SubmitRequest) -> Result<SubmitResponse, BridgeError>;

    async fn get_workflow_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TemplateStatus, BridgeError>;
}

/// Injectable wall clock. No call site reads time directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
