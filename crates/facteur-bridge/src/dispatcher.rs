//! Command-to-workflow dispatcher.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use facteur_core::dispatch::{DispatchRequest, DispatchResult, ServiceConfig, StatusReport};
use facteur_core::error::BridgeError;
use facteur_core::workflow::RunInput;
use facteur_ports::dispatcher::Dispatcher;
use facteur_ports::runner::Runner;

/// Bridges command events to the workflow runner.
///
/// Operator-configured baseline parameters are merged with per-request
/// options; request options win. Every call runs inside one tracing span.
pub struct WorkflowDispatcher {
    runner: Arc<dyn Runner>,
    cfg: ServiceConfig,
}

impl std::fmt::Debug for WorkflowDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDispatcher")
            .field("cfg", &self.cfg)
            .finish()
    }
}

impl WorkflowDispatcher {
    pub fn new(runner: Arc<dyn Runner>, cfg: ServiceConfig) -> Result<Self, BridgeError> {
        if cfg.namespace.is_empty() {
            return Err(BridgeError::Validation(
                "bridge: namespace is required".to_string(),
            ));
        }
        if cfg.workflow_template.is_empty() {
            return Err(BridgeError::Validation(
                "bridge: workflow template is required".to_string(),
            ));
        }

        Ok(Self { runner, cfg })
    }
}

#[async_trait]
impl Dispatcher for WorkflowDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchResult, BridgeError> {
        let span = tracing::info_span!(
            "bridge.dispatch",
            facteur.command = %request.command,
            facteur.user_id = %request.user_id,
            facteur.workflow_template = %self.cfg.workflow_template,
            facteur.target_namespace = %self.cfg.namespace,
            facteur.trace_id = %request.trace_id,
            facteur.workflow_name = tracing::field::Empty,
            facteur.workflow_namespace = tracing::field::Empty,
        );

        async {
            let merged = merge_parameters(&self.cfg.parameters, &request.options);

            let result = self
                .runner
                .run(RunInput {
                    namespace: self.cfg.namespace.clone(),
                    workflow_template: self.cfg.workflow_template.clone(),
                    service_account: self.cfg.service_account.clone(),
                    parameters: merged,
                    generate_name_prefix: request.command.clone(),
                })
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "workflow dispatch failed");
                    err
                })?;

            let message = format!(
                "Workflow `{}` submitted to namespace `{}`.",
                result.workflow_name, result.namespace
            );

            let correlation_id = if request.correlation_id.is_empty() {
                result.workflow_name.clone()
            } else {
                request.correlation_id.clone()
            };

            let span = tracing::Span::current();
            span.record("facteur.workflow_name", result.workflow_name.as_str());
            span.record("facteur.workflow_namespace", result.namespace.as_str());
            tracing::info!("workflow dispatched");

            Ok(DispatchResult {
                namespace: result.namespace,
                workflow_name: result.workflow_name,
                message,
                correlation_id,
                trace_id: request.trace_id,
            })
        }
        .instrument(span)
        .await
    }

    async fn status(&self) -> Result<StatusReport, BridgeError> {
        let span = tracing::info_span!(
            "bridge.status",
            facteur.workflow_template = %self.cfg.workflow_template,
            facteur.target_namespace = %self.cfg.namespace,
        );

        async {
            let status = self
                .runner
                .template_status(&self.cfg.namespace, &self.cfg.workflow_template)
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "template status failed");
                    err
                })?;

            let message = if status.ready {
                format!(
                    "Workflow template `{}` in namespace `{}` is ready.",
                    status.name, status.namespace
                )
            } else {
                format!(
                    "Workflow template `{}` in namespace `{}` is not ready.",
                    status.name, status.namespace
                )
            };

            tracing::info!(template_ready = status.ready, "status retrieved");

            Ok(StatusReport {
                namespace: status.namespace,
                workflow_template: status.name,
                ready: status.ready,
                message,
            })
        }
        .instrument(span)
        .await
    }
}

fn merge_parameters(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Utc;
    use facteur_core::workflow::{RunResult, TemplateStatus};

    #[derive(Default)]
    struct FakeRunner {
        inputs: Mutex<Vec<RunInput>>,
        workflow_name: String,
        ready: bool,
        fail: bool,
    }

    #[async_trait]
    impl Runner for FakeRunner {
        async fn run(&self, input: RunInput) -> Result<RunResult, BridgeError> {
            if self.fail {
                return Err(BridgeError::Submit("submit failed".to_string()));
            }
            let namespace = input.namespace.clone();
            self.inputs.lock().unwrap().push(input);
            Ok(RunResult {
                namespace,
                workflow_name: self.workflow_name.clone(),
                submitted_at: Utc::now(),
            })
        }

        async fn template_status(
            &self,
            namespace: &str,
            template: &str,
        ) -> Result<TemplateStatus, BridgeError> {
            Ok(TemplateStatus {
                namespace: namespace.to_string(),
                name: template.to_string(),
                ready: self.ready,
            })
        }
    }

    fn config() -> ServiceConfig {
        ServiceConfig {
            namespace: "argo".to_string(),
            workflow_template: "facteur-dispatch".to_string(),
            service_account: "facteur".to_string(),
            parameters: BTreeMap::from([
                ("payload".to_string(), "{}".to_string()),
                ("env".to_string(), "prod".to_string()),
            ]),
        }
    }

    #[tokio::test]
    async fn request_options_override_baseline_parameters() {
        let runner = Arc::new(FakeRunner {
            workflow_name: "facteur-dispatch-x1".to_string(),
            ..FakeRunner::default()
        });
        let dispatcher = WorkflowDispatcher::new(runner.clone(), config()).expect("dispatcher");

        dispatcher
            .dispatch(DispatchRequest {
                command: "dispatch".to_string(),
                options: BTreeMap::from([(
                    "payload".to_string(),
                    r#"{"prompt":"x"}"#.to_string(),
                )]),
                ..DispatchRequest::default()
            })
            .await
            .expect("dispatch");

        let inputs = runner.inputs.lock().unwrap();
        let pairs: Vec<(&str, &str)> = inputs[0]
            .parameters
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("env", "prod"), ("payload", r#"{"prompt":"x"}"#)]
        );
        assert_eq!(inputs[0].generate_name_prefix, "dispatch");
    }

    #[tokio::test]
    async fn correlation_defaults_to_workflow_name() {
        let runner = Arc::new(FakeRunner {
            workflow_name: "facteur-dispatch-x1".to_string(),
            ..FakeRunner::default()
        });
        let dispatcher = WorkflowDispatcher::new(runner, config()).expect("dispatcher");

        let result = dispatcher
            .dispatch(DispatchRequest {
                command: "dispatch".to_string(),
                ..DispatchRequest::default()
            })
            .await
            .expect("dispatch");

        assert_eq!(result.correlation_id, "facteur-dispatch-x1");
    }

    #[tokio::test]
    async fn supplied_correlation_is_preserved() {
        let runner = Arc::new(FakeRunner {
            workflow_name: "facteur-dispatch-x1".to_string(),
            ..FakeRunner::default()
        });
        let dispatcher = WorkflowDispatcher::new(runner, config()).expect("dispatcher");

        let result = dispatcher
            .dispatch(DispatchRequest {
                command: "dispatch".to_string(),
                correlation_id: "corr-1".to_string(),
                trace_id: "trace-1".to_string(),
                ..DispatchRequest::default()
            })
            .await
            .expect("dispatch");

        assert_eq!(result.correlation_id, "corr-1");
        assert_eq!(result.trace_id, "trace-1");
        assert!(result.message.contains("facteur-dispatch-x1"));
    }

    #[tokio::test]
    async fn runner_failures_are_surfaced() {
        let runner = Arc::new(FakeRunner {
            fail: true,
            ..FakeRunner::default()
        });
        let dispatcher = WorkflowDispatcher::new(runner, config()).expect("dispatcher");

        let err = dispatcher
            .dispatch(DispatchRequest {
                command: "dispatch".to_string(),
                ..DispatchRequest::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Submit(_)));
    }

    #[tokio::test]
    async fn status_reports_not_ready_template() {
        let runner = Arc::new(FakeRunner {
            ready: false,
            ..FakeRunner::default()
        });
        let dispatcher = WorkflowDispatcher::new(runner, config()).expect("dispatcher");

        let report = dispatcher.status().await.expect("status");
        assert!(!report.ready);
        assert!(report.message.contains("is not ready"));
    }

    #[tokio::test]
    async fn missing_namespace_is_rejected_at_construction() {
        let runner = Arc::new(FakeRunner::default());
        let err = WorkflowDispatcher::new(
            runner,
            ServiceConfig {
                workflow_template: "facteur-dispatch".to_string(),
                ..ServiceConfig::default()
            },
        )
        .unwrap_err();

        assert!(matches!(err, BridgeError::Validation(_)));
    }
}
