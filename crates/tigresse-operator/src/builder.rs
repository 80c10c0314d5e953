//! Child resource builders.
//!
//! All builders assume a fully defaulted spec and produce the complete
//! desired object; the reconciler decides which fields get copied onto a
//! live object.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource,
    ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::TigerBeetleCluster;

const LABEL_APP_NAME: &str = "app.kubernetes.io/name";
const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
const MANAGED_BY_VALUE: &str = "tigresse-operator";
const COMPONENT_SERVER: &str = "database";

const DATA_MOUNT_PATH: &str = "/var/lib/tigerbeetle";
const SCRIPTS_MOUNT_PATH: &str = "/scripts";

/// Canonical labels for operator-managed objects; also the selector.
pub fn labels(cluster: &TigerBeetleCluster) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP_NAME.to_string(), cluster.name_any()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string()),
        (LABEL_COMPONENT.to_string(), COMPONENT_SERVER.to_string()),
    ])
}

/// Expected ConfigMap name for a cluster.
pub fn config_map_name(cluster: &TigerBeetleCluster) -> String {
    format!("{}-start-script", cluster.name_any())
}

/// Expected headless service name.
pub fn headless_service_name(cluster: &TigerBeetleCluster) -> String {
    format!("{}-headless", cluster.name_any())
}

fn object_meta(cluster: &TigerBeetleCluster, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: cluster.namespace(),
        labels: Some(labels(cluster)),
        ..ObjectMeta::default()
    }
}

/// Bootstrap script ConfigMap.
pub fn build_config_map(cluster: &TigerBeetleCluster) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(cluster, config_map_name(cluster)),
        data: Some(BTreeMap::from([(
            "start.sh".to_string(),
            start_script().to_string(),
        )])),
        ..ConfigMap::default()
    }
}

/// ClusterIP service for clients.
pub fn build_service(cluster: &TigerBeetleCluster) -> Service {
    Service {
        metadata: object_meta(cluster, cluster.name_any()),
        spec: Some(ServiceSpec {
            selector: Some(labels(cluster)),
            ports: Some(vec![ServicePort {
                name: Some("client".to_string()),
                port: cluster.spec.port,
                target_port: Some(IntOrString::Int(cluster.spec.port)),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Headless service required by the stateful set. Addresses are published
/// even for not-yet-ready pods; peers must resolve each other before the
/// quorum forms.
pub fn build_headless_service(cluster: &TigerBeetleCluster) -> Service {
    Service {
        metadata: object_meta(cluster, headless_service_name(cluster)),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(labels(cluster)),
            ports: Some(vec![ServicePort {
                name: Some("tcp".to_string()),
                port: cluster.spec.port,
                target_port: Some(IntOrString::Int(cluster.spec.port)),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// StatefulSet running the TigerBeetle replicas.
pub fn build_stateful_set(cluster: &TigerBeetleCluster) -> StatefulSet {
    let labels = labels(cluster);
    let port = cluster.spec.port.to_string();
    let replicas = cluster.spec.replicas.to_string();

    StatefulSet {
        metadata: object_meta(cluster, cluster.name_any()),
        spec: Some(StatefulSetSpec {
            service_name: headless_service_name(cluster),
            replicas: Some(cluster.spec.replicas),
            // peers must come up simultaneously to form quorum
            pod_management_policy: Some("Parallel".to_string()),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    init_containers: Some(vec![Container {
                        name: "format-data".to_string(),
                        image: Some(cluster.spec.image.clone()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        command: Some(vec![
                            "/bin/sh".to_string(),
                            "-c".to_string(),
                            format_data_script().to_string(),
                        ]),
                        env: Some(vec![
                            pod_name_env(),
                            env_var("CLUSTER_ID", &cluster.spec.cluster_id),
                            env_var("REPLICA_COUNT", &replicas),
                        ]),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "data".to_string(),
                            mount_path: DATA_MOUNT_PATH.to_string(),
                            ..VolumeMount::default()
                        }]),
                        ..Container::default()
                    }]),
                    containers: vec![Container {
                        name: "tigerbeetle".to_string(),
                        image: Some(cluster.spec.image.clone()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        command: Some(vec![
                            "/bin/sh".to_string(),
                            "-c".to_string(),
                            format!("{SCRIPTS_MOUNT_PATH}/start.sh"),
                        ]),
                        env: Some(vec![
                            pod_name_env(),
                            field_ref_env("POD_NAMESPACE", "metadata.namespace"),
                            env_var("CLUSTER_ID", &cluster.spec.cluster_id),
                            env_var("REPLICA_COUNT", &replicas),
                            env_var("SERVER_PORT", &port),
                            env_var("STATEFULSET_NAME", &cluster.name_any()),
                            env_var("HEADLESS_SERVICE", &headless_service_name(cluster)),
                        ]),
                        ports: Some(vec![ContainerPort {
                            name: Some("client".to_string()),
                            container_port: cluster.spec.port,
                            ..ContainerPort::default()
                        }]),
                        volume_mounts: Some(vec![
                            VolumeMount {
                                name: "data".to_string(),
                                mount_path: DATA_MOUNT_PATH.to_string(),
                                ..VolumeMount::default()
                            },
                            VolumeMount {
                                name: "start-script".to_string(),
                                mount_path: SCRIPTS_MOUNT_PATH.to_string(),
                                read_only: Some(true),
                                ..VolumeMount::default()
                            },
                        ]),
                        ..Container::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: "start-script".to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: config_map_name(cluster),
                            default_mode: Some(0o755),
                            ..ConfigMapVolumeSource::default()
                        }),
                        ..Volume::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            volume_claim_templates: Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some("data".to_string()),
                    labels: Some(labels),
                    ..ObjectMeta::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            cluster.spec.storage_size.clone(),
                        )])),
                        ..VolumeResourceRequirements::default()
                    }),
                    storage_class_name: cluster.spec.storage_class_name.clone(),
                    ..PersistentVolumeClaimSpec::default()
                }),
                ..PersistentVolumeClaim::default()
            }]),
            ..StatefulSetSpec::default()
        }),
        ..StatefulSet::default()
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..EnvVar::default()
    }
}

fn pod_name_env() -> EnvVar {
    field_ref_env("POD_NAME", "metadata.name")
}

fn field_ref_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..ObjectFieldSelector::default()
            }),
            ..EnvVarSource::default()
        }),
        ..EnvVar::default()
    }
}

fn start_script() -> &'static str {
    r#"#!/bin/sh
set -euo pipefail

ordinal="${POD_NAME##*-}"
data_file="/var/lib/tigerbeetle/${CLUSTER_ID}_${ordinal}.tigerbeetle"

addresses=""
i=0
while [ "$i" -lt "${REPLICA_COUNT}" ]; do
  host="${STATEFULSET_NAME}-${i}.${HEADLESS_SERVICE}.${POD_NAMESPACE}.svc.cluster.local"
  if command -v getent >/dev/null 2>&1; then
    ip=$(getent ahostsv4 "${host}" | awk 'NR==1 {print $1}')
  elif command -v nslookup >/dev/null 2>&1; then
    ip=$(nslookup "${host}" 2>/dev/null | awk '/^Address: / {print $2; exit}')
  else
    echo "no DNS resolver found in container image" >&2
    exit 1
  fi
  if [ -z "${ip}" ]; then
    echo "failed to resolve ${host}" >&2
    exit 1
  fi
  if [ -n "${addresses}" ]; then
    addresses="${addresses},"
  fi
  addresses="${addresses}${ip}:${SERVER_PORT}"
  i=$((i + 1))
done

exec tigerbeetle start --addresses="${addresses}" "${data_file}""#
}

fn format_data_script() -> &'static str {
    r#"set -euo pipefail
ordinal="${POD_NAME##*-}"
data_file="/var/lib/tigerbeetle/${CLUSTER_ID}_${ordinal}.tigerbeetle"
if [ ! -f "${data_file}" ]; then
  tigerbeetle format --cluster=${CLUSTER_ID} --replica=${ordinal} --replica-count=${REPLICA_COUNT} "${data_file}"
else
  echo "data file already exists for ${data_file}"
fi"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    use crate::crd::TigerBeetleClusterSpec;

    fn cluster() -> TigerBeetleCluster {
        let mut spec = TigerBeetleClusterSpec::default();
        spec.apply_defaults();
        let mut cluster = TigerBeetleCluster::new("ledger", spec);
        cluster.metadata.namespace = Some("tigerbeetle".to_string());
        cluster
    }

    #[test]
    fn labels_form_the_selector() {
        let cluster = cluster();
        let labels = labels(&cluster);

        assert_eq!(labels.get("app.kubernetes.io/name").unwrap(), "ledger");
        assert_eq!(
            labels.get("app.kubernetes.io/managed-by").unwrap(),
            "tigresse-operator"
        );
        assert_eq!(labels.get("app.kubernetes.io/component").unwrap(), "database");
    }

    #[test]
    fn config_map_carries_the_start_script() {
        let cluster = cluster();
        let config_map = build_config_map(&cluster);

        assert_eq!(config_map.metadata.name.as_deref(), Some("ledger-start-script"));
        let data = config_map.data.expect("data");
        let script = data.get("start.sh").expect("start.sh");
        assert!(script.contains("--addresses=\"${addresses}\""));
        assert!(script.contains("${CLUSTER_ID}_${ordinal}.tigerbeetle"));
        assert!(script.contains("svc.cluster.local"));
    }

    #[test]
    fn client_service_exposes_the_spec_port() {
        let cluster = cluster();
        let service = build_service(&cluster);

        let spec = service.spec.expect("spec");
        assert_eq!(spec.selector, Some(labels(&cluster)));
        let ports = spec.ports.expect("ports");
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name.as_deref(), Some("client"));
        assert_eq!(ports[0].port, 3000);
        assert!(spec.cluster_ip.is_none());
    }

    #[test]
    fn headless_service_publishes_not_ready_addresses() {
        let cluster = cluster();
        let service = build_headless_service(&cluster);

        assert_eq!(service.metadata.name.as_deref(), Some("ledger-headless"));
        let spec = service.spec.expect("spec");
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
    }

    #[test]
    fn stateful_set_matches_spec() {
        let cluster = cluster();
        let sts = build_stateful_set(&cluster);

        let spec = sts.spec.expect("spec");
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.service_name, "ledger-headless");
        assert_eq!(spec.pod_management_policy.as_deref(), Some("Parallel"));

        let pod_spec = spec.template.spec.expect("pod spec");
        let init = pod_spec.init_containers.expect("init containers");
        assert_eq!(init.len(), 1);
        let init_script = &init[0].command.as_ref().expect("command")[2];
        assert!(init_script.contains("tigerbeetle format"));
        assert!(init_script.contains("if [ ! -f \"${data_file}\" ]"));

        let main = &pod_spec.containers[0];
        assert_eq!(main.name, "tigerbeetle");
        let env = main.env.as_ref().expect("env");
        assert!(env.iter().any(|e| e.name == "HEADLESS_SERVICE"
            && e.value.as_deref() == Some("ledger-headless")));
        assert!(env
            .iter()
            .any(|e| e.name == "SERVER_PORT" && e.value.as_deref() == Some("3000")));

        let claims = spec.volume_claim_templates.expect("claims");
        let claim_spec = claims[0].spec.as_ref().expect("claim spec");
        assert_eq!(claim_spec.storage_class_name.as_deref(), Some("longhorn"));
        assert_eq!(
            claim_spec.access_modes,
            Some(vec!["ReadWriteOnce".to_string()])
        );
        let requests = claim_spec
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .expect("requests");
        assert_eq!(requests.get("storage"), Some(&Quantity("10Gi".to_string())));
    }

    #[test]
    fn custom_storage_class_reaches_the_claim_template() {
        let mut cluster = cluster();
        cluster.spec.storage_class_name = Some("local-path".to_string());

        let sts = build_stateful_set(&cluster);
        let claim_spec = sts
            .spec
            .unwrap()
            .volume_claim_templates
            .unwrap()
            .remove(0)
            .spec
            .unwrap();
        assert_eq!(claim_spec.storage_class_name.as_deref(), Some("local-path"));
    }
}
