//! Deterministic workflow submission.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use facteur_core::error::BridgeError;
use facteur_core::workflow::{RunInput, RunResult, SubmitRequest, TemplateStatus};
use facteur_ports::runner::Runner;
use facteur_ports::workflow_api::{Clock, SystemClock, WorkflowApi};

/// Translates a logical run request into a concrete workflow submission.
///
/// Naming is deterministic for a fixed clock reading, so byte-identical
/// inputs produce byte-identical submissions.
pub struct WorkflowRunner {
    client: Arc<dyn WorkflowApi>,
    clock: Arc<dyn Clock>,
}

impl WorkflowRunner {
    pub fn new(client: Arc<dyn WorkflowApi>) -> Self {
        Self {
            client,
            clock: Arc::new(SystemClock),
        }
    }

    /// Override the clock for tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl Runner for WorkflowRunner {
    async fn run(&self, input: RunInput) -> Result<RunResult, BridgeError> {
        if input.namespace.is_empty() {
            return Err(BridgeError::Validation("namespace is required".to_string()));
        }
        if input.workflow_template.is_empty() {
            return Err(BridgeError::Validation(
                "workflow template is required".to_string(),
            ));
        }

        let generate_name = ensure_generate_name(
            &input.generate_name_prefix,
            &input.workflow_template,
            self.clock.now(),
        );

        let response = self
            .client
            .submit_workflow(SubmitRequest {
                namespace: input.namespace,
                workflow_template: input.workflow_template,
                service_account: input.service_account,
                generate_name: generate_name.clone(),
                parameters: input.parameters,
            })
            .await?;

        let workflow_name = if response.workflow_name.is_empty() {
            generate_name
        } else {
            response.workflow_name
        };

        Ok(RunResult {
            namespace: response.namespace,
            workflow_name,
            submitted_at: self.clock.now(),
        })
    }

    async fn template_status(
        &self,
        namespace: &str,
        template: &str,
    ) -> Result<TemplateStatus, BridgeError> {
        self.client.get_workflow_template(namespace, template).await
    }
}

/// Build the generate-name prefix: `<prefix>-<YYYYMMDD-HHMMSS>-`, falling
/// back to the template name when no prefix was supplied. The trailing dash
/// leaves room for the server-assigned random suffix.
fn ensure_generate_name(prefix: &str, template: &str, now: DateTime<Utc>) -> String {
    let mut name = if prefix.is_empty() { template } else { prefix }.to_string();
    if !name.ends_with('-') {
        name.push('-');
    }
    format!("{name}{}-", now.format("%Y%m%d-%H%M%S"))
}
