//! TigerBeetleCluster custom resource.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CLUSTER_ID: &str = "0";
pub const DEFAULT_IMAGE: &str = "ghcr.io/tigerbeetle/tigerbeetle:0.16.60";
pub const DEFAULT_PORT: i32 = 3000;
pub const DEFAULT_REPLICAS: i32 = 3;
pub const DEFAULT_STORAGE_SIZE: &str = "10Gi";
pub const DEFAULT_STORAGE_CLASS: &str = "longhorn";

/// Desired state of a TigerBeetle cluster.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "tigresse.proompteng.ai",
    version = "v1alpha1",
    kind = "TigerBeetleCluster",
    namespaced,
    status = "TigerBeetleClusterStatus",
    shortname = "tbc"
)]
#[serde(rename_all = "camelCase")]
pub struct TigerBeetleClusterSpec {
    /// Numerical identifier for the TigerBeetle cluster.
    #[serde(default, rename = "clusterID")]
    pub cluster_id: String,

    /// Container image for TigerBeetle nodes.
    #[serde(default)]
    pub image: String,

    /// Client port exposed by TigerBeetle.
    #[serde(default)]
    pub port: i32,

    /// Number of replicas to run.
    #[serde(default)]
    pub replicas: i32,

    /// Storage class backing the persistent volume claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Persistent volume size for each replica.
    #[serde(default)]
    pub storage_size: Quantity,
}

/// Observed state of a TigerBeetle cluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TigerBeetleClusterStatus {
    #[serde(default)]
    pub ready_replicas: i32,
}

impl TigerBeetleClusterSpec {
    /// Fill unset fields with safe defaults. Returns whether anything
    /// changed so the caller can persist the defaulted spec before
    /// building resources.
    pub fn apply_defaults(&mut self) -> bool {
        let mut updated = false;

        if self.cluster_id.is_empty() {
            self.cluster_id = DEFAULT_CLUSTER_ID.to_string();
            updated = true;
        }

        if self.image.is_empty() {
            self.image = DEFAULT_IMAGE.to_string();
            updated = true;
        }

        if self.port == 0 {
            self.port = DEFAULT_PORT;
            updated = true;
        }

        if self.replicas == 0 {
            self.replicas = DEFAULT_REPLICAS;
            updated = true;
        }

        if self.storage_size.0.is_empty() || self.storage_size.0 == "0" {
            self.storage_size = Quantity(DEFAULT_STORAGE_SIZE.to_string());
            updated = true;
        }

        match &self.storage_class_name {
            Some(name) if !name.is_empty() => {}
            _ => {
                self.storage_class_name = Some(DEFAULT_STORAGE_CLASS.to_string());
                updated = true;
            }
        }

        updated
    }
}
