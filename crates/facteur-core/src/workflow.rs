//! Workflow submission value objects shared by the runner and its client.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// A logical "run" request handed to the workflow runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunInput {
    pub namespace: String,
    pub workflow_template: String,
    pub service_account: String,
    pub parameters: BTreeMap<String, String>,
    pub generate_name_prefix: String,
}

/// Submission metadata returned by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub namespace: String,
    pub workflow_name: String,
    pub submitted_at: DateTime<Utc>,
}

/// Concrete workflow submission sent to the cluster workflow API.
///
/// `generate_name` always ends in `-`; the server appends a random suffix.
/// Parameters are a `BTreeMap` so every emission iterates keys in sorted
/// order, which keeps submissions byte-identical for identical inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitRequest {
    pub namespace: String,
    pub workflow_template: String,
    pub service_account: String,
    pub generate_name: String,
    pub parameters: BTreeMap<String, String>,
}

/// The server's answer to a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitResponse {
    pub namespace: String,
    pub workflow_name: String,
}

/// Template readiness as reported by the cluster workflow API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateStatus {
    pub namespace: String,
    pub name: String,
    pub ready: bool,
}
