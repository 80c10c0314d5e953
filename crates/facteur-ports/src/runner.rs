//! Workflow runner port.

use async_trait::async_trait;

use facteur_core::error::BridgeError;
use facteur_core::workflow::{RunInput, RunResult, TemplateStatus};

/// Workflow submission and template inspection, one level above the raw
/// cluster API: implementations own naming and parameter discipline.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, input: RunInput) -> Result<RunResult, BridgeError>;

    async fn template_status(
        &self,
        namespace: &str,
        template: &str,
    ) -> Result<TemplateStatus, BridgeError>;
}
