//! Reconciliation loop.
//!
//! Each child is converged with create-or-update semantics: fetch by name,
//! create the desired object when absent, otherwise assign only the mutable
//! fields onto the live object and replace it. Server-assigned fields such
//! as resource version and a client service's cluster IP survive updates;
//! the storage class always comes from the (defaulted) parent spec, so
//! out-of-band edits are reverted on the next reconcile.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::builder;
use crate::crd::TigerBeetleCluster;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("cluster {0} has no namespace")]
    MissingNamespace(String),

    #[error("cluster {0} has no uid yet")]
    MissingOwnerRef(String),
}

/// Shared reconciler state.
pub struct Context {
    pub client: Client,
}

/// Converge one cluster. Triggered by changes to the parent or any owned
/// child; the controller serialises calls per object.
pub async fn reconcile(
    cluster: Arc<TigerBeetleCluster>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let name = cluster.name_any();
    let namespace = cluster
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(name.clone()))?;
    let clusters: Api<TigerBeetleCluster> = Api::namespaced(ctx.client.clone(), &namespace);

    // Work on a fresh copy; the watch cache may lag behind our own writes.
    let Some(mut cluster) = clusters.get_opt(&name).await? else {
        return Ok(Action::await_change());
    };

    if cluster.spec.apply_defaults() {
        clusters
            .replace(&name, &PostParams::default(), &cluster)
            .await?;
        tracing::info!(cluster = %name, "applied defaults");
        // The spec update triggers a fresh reconcile; build from the
        // persisted defaults rather than continuing with this copy.
        return Ok(Action::await_change());
    }

    let owner = cluster
        .controller_owner_ref(&())
        .ok_or_else(|| Error::MissingOwnerRef(name.clone()))?;

    let config_maps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &namespace);
    reconcile_child(
        &config_maps,
        &builder::config_map_name(&cluster),
        builder::build_config_map(&cluster),
        &owner,
        apply_config_map_update,
    )
    .await?;

    let services: Api<Service> = Api::namespaced(ctx.client.clone(), &namespace);
    reconcile_child(
        &services,
        &name,
        builder::build_service(&cluster),
        &owner,
        apply_service_update,
    )
    .await?;

    reconcile_child(
        &services,
        &builder::headless_service_name(&cluster),
        builder::build_headless_service(&cluster),
        &owner,
        apply_headless_service_update,
    )
    .await?;

    let stateful_sets: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), &namespace);
    reconcile_child(
        &stateful_sets,
        &name,
        builder::build_stateful_set(&cluster),
        &owner,
        apply_stateful_set_update,
    )
    .await?;

    update_status(&clusters, &stateful_sets, &mut cluster).await?;

    Ok(Action::await_change())
}

/// Requeue with backoff on any reconcile error; every step is idempotent.
pub fn error_policy(
    cluster: Arc<TigerBeetleCluster>,
    error: &Error,
    _ctx: Arc<Context>,
) -> Action {
    tracing::warn!(cluster = %cluster.name_any(), error = %error, "reconcile failed");
    Action::requeue(Duration::from_secs(30))
}

/// Run the controller until the watch streams end.
pub async fn run(client: Client) -> Result<(), Error> {
    let clusters: Api<TigerBeetleCluster> = Api::all(client.clone());
    let context = Arc::new(Context {
        client: client.clone(),
    });

    Controller::new(clusters, watcher::Config::default())
        .owns(
            Api::<StatefulSet>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<ConfigMap>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<Service>::all(client.clone()),
            watcher::Config::default(),
        )
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => tracing::debug!(object = %object.name, "reconciled"),
                Err(error) => tracing::warn!(error = %error, "reconciliation error"),
            }
        })
        .await;

    Ok(())
}

async fn reconcile_child<K, F>(
    api: &Api<K>,
    name: &str,
    desired: K,
    owner: &OwnerReference,
    apply: F,
) -> Result<(), Error>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned,
    K::DynamicType: Default,
    F: Fn(&mut K, &K),
{
    match api.get_opt(name).await? {
        None => {
            let mut desired = desired;
            ensure_controller_ref(desired.meta_mut(), owner);
            api.create(&PostParams::default(), &desired).await?;
            tracing::info!(child = name, "created");
        }
        Some(mut live) => {
            apply(&mut live, &desired);
            ensure_controller_ref(live.meta_mut(), owner);
            api.replace(name, &PostParams::default(), &live).await?;
        }
    }

    Ok(())
}

/// Add the controller reference unless the child already carries it.
pub fn ensure_controller_ref(meta: &mut ObjectMeta, owner: &OwnerReference) {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    if !refs.iter().any(|existing| existing.uid == owner.uid) {
        refs.push(owner.clone());
    }
}

/// Mutable fields of the config map: labels and data.
pub fn apply_config_map_update(live: &mut ConfigMap, desired: &ConfigMap) {
    live.metadata.labels = desired.metadata.labels.clone();
    live.data = desired.data.clone();
    live.binary_data = desired.binary_data.clone();
}

/// Mutable fields of the client service. The cluster IP is immutable on
/// live objects and must not be touched.
pub fn apply_service_update(live: &mut Service, desired: &Service) {
    live.metadata.labels = desired.metadata.labels.clone();
    let live_spec = live.spec.get_or_insert_with(Default::default);
    if let Some(desired_spec) = &desired.spec {
        live_spec.selector = desired_spec.selector.clone();
        live_spec.ports = desired_spec.ports.clone();
    }
}

/// The headless service re-asserts its DNS-only fields on every update so
/// drift is corrected.
pub fn apply_headless_service_update(live: &mut Service, desired: &Service) {
    live.metadata.labels = desired.metadata.labels.clone();
    let live_spec = live.spec.get_or_insert_with(Default::default);
    if let Some(desired_spec) = &desired.spec {
        live_spec.cluster_ip = desired_spec.cluster_ip.clone();
        live_spec.publish_not_ready_addresses = desired_spec.publish_not_ready_addresses;
        live_spec.selector = desired_spec.selector.clone();
        live_spec.ports = desired_spec.ports.clone();
    }
}

/// The stateful set takes the whole desired spec; the storage class in the
/// volume claim template comes from the parent spec, which reverts
/// out-of-band edits.
pub fn apply_stateful_set_update(live: &mut StatefulSet, desired: &StatefulSet) {
    live.metadata.labels = desired.metadata.labels.clone();
    live.spec = desired.spec.clone();
}

async fn update_status(
    clusters: &Api<TigerBeetleCluster>,
    stateful_sets: &Api<StatefulSet>,
    cluster: &mut TigerBeetleCluster,
) -> Result<(), Error> {
    let name = cluster.name_any();
    let Some(sts) = stateful_sets.get_opt(&name).await? else {
        return Ok(());
    };

    let ready = sts
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0)
        .max(0);

    let current = cluster
        .status
        .as_ref()
        .map(|status| status.ready_replicas)
        .unwrap_or(0);

    // Written only on change to avoid reconcile storms.
    if current != ready {
        clusters
            .patch_status(
                &name,
                &PatchParams::default(),
                &Patch::Merge(json!({ "status": { "readyReplicas": ready } })),
            )
            .await?;
        tracing::info!(cluster = %name, ready_replicas = ready, "status updated");
    }

    Ok(())
}
