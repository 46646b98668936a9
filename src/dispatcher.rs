// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch event to reconcile-key mapping.
//!
//! One watcher task per watched type: the primary `CSIDriverDeployment` plus
//! every dependent type the controller owns. Each event is mapped to the key
//! of the owning primary and enqueued; nothing here mutates cluster state.
//!
//! Dependent events whose object carries no controller owner reference of
//! our kind are discarded — some other controller's objects happened to
//! match the label filter. Events for dependents of a primary that has never
//! been reconciled are still enqueued; the reconciler tolerates partially
//! existing dependents.

use crate::constants::{API_GROUP_VERSION, KIND_CSI_DRIVER_DEPLOYMENT};
use crate::crd::CSIDriverDeployment;
use crate::error::Error;
use crate::labels::{CASTOR_OWNER_NAMESPACE_LABEL, K8S_MANAGED_BY, MANAGED_BY_CASTOR};
use crate::queue::WorkQueue;
use crate::store::ReconcileKey;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, StatefulSet};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Derive the owning primary's key from a dependent's metadata.
///
/// Requires a controller owner reference of our kind and API group. The
/// namespace comes from the object itself, or — for cluster-scoped
/// dependents — from the owner-namespace label the builders stamp on.
#[must_use]
pub fn owner_key(meta: &ObjectMeta) -> Option<ReconcileKey> {
    let owner = meta.owner_references.as_deref().unwrap_or_default().iter().find(|r| {
        r.controller == Some(true)
            && r.kind == KIND_CSI_DRIVER_DEPLOYMENT
            && r.api_version == API_GROUP_VERSION
    })?;

    let namespace = meta.namespace.clone().or_else(|| {
        meta.labels
            .as_ref()
            .and_then(|l| l.get(CASTOR_OWNER_NAMESPACE_LABEL).cloned())
    })?;

    Some(ReconcileKey::new(namespace, owner.name.clone()))
}

/// Key for a primary-type event: the object's own identity.
#[must_use]
pub fn primary_key(primary: &CSIDriverDeployment) -> Option<ReconcileKey> {
    Some(ReconcileKey::new(
        primary.namespace()?,
        primary.metadata.name.clone()?,
    ))
}

/// Watch the primary type, enqueueing each object's own key.
async fn watch_primary(
    api: Api<CSIDriverDeployment>,
    queue: Arc<WorkQueue<ReconcileKey>>,
) -> Result<(), Error> {
    info!("Starting CSIDriverDeployment watcher");

    let mut stream = Box::pin(watcher(api, watcher::Config::default()));

    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Apply(obj) | watcher::Event::InitApply(obj)) => {
                if let Some(key) = primary_key(&obj) {
                    debug!(%key, "Primary changed, enqueueing");
                    queue.add(key);
                }
            }
            Ok(watcher::Event::Delete(obj)) => {
                // Deletion still gets a pass: the reconciler observes the
                // absence and ends the key terminally.
                if let Some(key) = primary_key(&obj) {
                    info!(%key, "Primary deleted, enqueueing final pass");
                    queue.add(key);
                }
            }
            Ok(watcher::Event::Init) => debug!("Primary watcher (re)initializing"),
            Ok(watcher::Event::InitDone) => debug!("Primary watcher initialized"),
            Err(e) => warn!("Primary watch error, stream will re-establish: {e}"),
        }
    }

    Err(Error::Watch("primary watch stream ended".to_string()))
}

/// Watch one dependent type, enqueueing the owning primary's key.
async fn watch_owned<K>(
    api: Api<K>,
    queue: Arc<WorkQueue<ReconcileKey>>,
) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let kind = K::kind(&());
    info!(kind = %kind, "Starting dependent watcher");

    let config = watcher::Config::default().labels(&format!("{K8S_MANAGED_BY}={MANAGED_BY_CASTOR}"));
    let mut stream = Box::pin(watcher(api, config));

    while let Some(event) = stream.next().await {
        match event {
            Ok(
                watcher::Event::Apply(obj)
                | watcher::Event::InitApply(obj)
                | watcher::Event::Delete(obj),
            ) => match owner_key(obj.meta()) {
                Some(key) => {
                    debug!(kind = %kind, %key, "Dependent changed, enqueueing owner");
                    queue.add(key);
                }
                None => {
                    debug!(kind = %kind, name = ?obj.meta().name, "No owning primary, discarding event");
                }
            },
            Ok(watcher::Event::Init) => debug!(kind = %kind, "Dependent watcher (re)initializing"),
            Ok(watcher::Event::InitDone) => debug!(kind = %kind, "Dependent watcher initialized"),
            Err(e) => warn!(kind = %kind, "Dependent watch error, stream will re-establish: {e}"),
        }
    }

    Err(Error::Watch(format!("{kind} watch stream ended")))
}

/// Spawn one watcher task per watched type, all feeding the shared queue.
#[must_use]
pub fn spawn_watchers(
    client: &Client,
    queue: &Arc<WorkQueue<ReconcileKey>>,
) -> Vec<JoinHandle<Result<(), Error>>> {
    vec![
        tokio::spawn(watch_primary(
            Api::<CSIDriverDeployment>::all(client.clone()),
            Arc::clone(queue),
        )),
        tokio::spawn(watch_owned(
            Api::<StatefulSet>::all(client.clone()),
            Arc::clone(queue),
        )),
        tokio::spawn(watch_owned(
            Api::<DaemonSet>::all(client.clone()),
            Arc::clone(queue),
        )),
        tokio::spawn(watch_owned(
            Api::<ServiceAccount>::all(client.clone()),
            Arc::clone(queue),
        )),
        tokio::spawn(watch_owned(
            Api::<RoleBinding>::all(client.clone()),
            Arc::clone(queue),
        )),
        tokio::spawn(watch_owned(
            Api::<StorageClass>::all(client.clone()),
            Arc::clone(queue),
        )),
    ]
}
