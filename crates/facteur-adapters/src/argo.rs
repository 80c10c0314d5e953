//! Kubernetes-backed Argo workflow client.
//!
//! Workflows and templates are addressed as dynamic objects so the adapter
//! does not depend on generated Argo types; the submission manifest is
//! built as JSON. Parameters arrive in a `BTreeMap`, so the emitted list is
//! sorted by key.

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, PostParams};
use serde_json::json;

use facteur_core::error::BridgeError;
use facteur_core::workflow::{SubmitRequest, SubmitResponse, TemplateStatus};
use facteur_ports::workflow_api::WorkflowApi;

const ARGO_GROUP: &str = "argoproj.io";
const ARGO_VERSION: &str = "v1alpha1";

/// Workflow API implementation against the cluster.
#[derive(Clone)]
pub struct ArgoWorkflowApi {
    client: kube::Client,
}

impl ArgoWorkflowApi {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient kube config (in-cluster when
    /// available, kubeconfig otherwise).
    pub async fn try_default() -> Result<Self, BridgeError> {
        let client = kube::Client::try_default()
            .await
            .map_err(|err| BridgeError::Submit(format!("build kubernetes client: {err}")))?;
        Ok(Self::new(client))
    }

    fn workflows(&self, namespace: &str) -> Api<DynamicObject> {
        let resource =
            ApiResource::from_gvk(&GroupVersionKind::gvk(ARGO_GROUP, ARGO_VERSION, "Workflow"));
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }

    fn workflow_templates(&self, namespace: &str) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(&GroupVersionKind::gvk(
            ARGO_GROUP,
            ARGO_VERSION,
            "WorkflowTemplate",
        ));
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }
}

/// Render the workflow submission body. `generate_name` is used instead of
/// an explicit name so the server assigns a unique final name.
fn workflow_manifest(request: &SubmitRequest) -> serde_json::Value {
    let mut spec = json!({
        "workflowTemplateRef": { "name": request.workflow_template },
    });

    if !request.service_account.is_empty() {
        spec["serviceAccountName"] = json!(request.service_account);
    }

    if !request.parameters.is_empty() {
        let parameters: Vec<serde_json::Value> = request
            .parameters
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
        spec["arguments"] = json!({ "parameters": parameters });
    }

    json!({
        "apiVersion": format!("{ARGO_GROUP}/{ARGO_VERSION}"),
        "kind": "Workflow",
        "metadata": {
            "namespace": request.namespace,
            "generateName": request.generate_name,
        },
        "spec": spec,
    })
}

#[async_trait]
impl WorkflowApi for ArgoWorkflowApi {
    async fn submit_workflow(&self, request: SubmitRequest) -> Result<SubmitResponse, BridgeError> {
        if request.namespace.is_empty() {
            return Err(BridgeError::Validation("namespace is required".to_string()));
        }
        if request.workflow_template.is_empty() {
            return Err(BridgeError::Validation(
                "workflow template is required".to_string(),
            ));
        }
        if request.generate_name.is_empty() {
            return Err(BridgeError::Validation(
                "generate name is required".to_string(),
            ));
        }

        let manifest = workflow_manifest(&request);
        let workflow: DynamicObject = serde_json::from_value(manifest)
            .map_err(|err| BridgeError::Submit(format!("render workflow: {err}")))?;

        let created = self
            .workflows(&request.namespace)
            .create(&PostParams::default(), &workflow)
            .await
            .map_err(|err| BridgeError::Submit(format!("create workflow: {err}")))?;

        let workflow_name = created
            .metadata
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| request.generate_name.clone());
        let namespace = created
            .metadata
            .namespace
            .unwrap_or_else(|| request.namespace.clone());

        Ok(SubmitResponse {
            namespace,
            workflow_name,
        })
    }

    async fn get_workflow_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TemplateStatus, BridgeError> {
        if namespace.is_empty() {
            return Err(BridgeError::Validation("namespace is required".to_string()));
        }
        if name.is_empty() {
            return Err(BridgeError::Validation(
                "workflow template name is required".to_string(),
            ));
        }

        let template = self
            .workflow_templates(namespace)
            .get(name)
            .await
            .map_err(|err| BridgeError::TemplateStatus(format!("get workflow template: {err}")))?;

        Ok(TemplateStatus {
            namespace: template
                .metadata
                .namespace
                .unwrap_or_else(|| namespace.to_string()),
            name: template.metadata.name.unwrap_or_else(|| name.to_string()),
            ready: true,
        })
    }
}
