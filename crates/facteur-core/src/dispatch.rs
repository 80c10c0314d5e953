//! Dispatch request/result value objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A workflow submission triggered by a command event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchRequest {
    pub command: String,
    pub user_id: String,
    pub options: BTreeMap<String, String>,
    pub correlation_id: String,
    pub trace_id: String,
}

/// Workflow submission metadata echoed back to the caller and persisted to
/// the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub namespace: String,
    pub workflow_name: String,
    pub message: String,
    pub correlation_id: String,
    pub trace_id: String,
}

/// Readiness summary for the configured workflow template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub namespace: String,
    pub workflow_template: String,
    pub ready: bool,
    pub message: String,
}

/// Static configuration a dispatcher needs to submit workflows.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub namespace: String,
    pub workflow_template: String,
    pub service_account: String,
    pub parameters: BTreeMap<String, String>,
}
