// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster state store abstraction.
//!
//! The reconciler never talks to the Kubernetes API directly; it receives a
//! [`ClusterStore`] at construction time. [`KubeStore`] is the production
//! implementation backed by typed `kube::Api` clients, and
//! [`crate::store_fake::FakeStore`] is the in-memory double the test suite
//! substitutes.
//!
//! Updates carry the observed object's `resourceVersion`, so the apiserver's
//! compare-and-swap rejects writes that lost a race with a concurrent
//! editor; those surface as [`StoreError::Conflict`].

use crate::crd::{CSIDriverDeployment, CSIDriverDeploymentStatus};
use crate::error::StoreError;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, StatefulSet};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde_json::json;
use tracing::debug;

/// The unit of work-queue addressing: namespace and name of a
/// `CSIDriverDeployment`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReconcileKey {
    pub namespace: String,
    pub name: String,
}

impl ReconcileKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The dependent resource kinds the controller owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DependentKind {
    ServiceAccount,
    RoleBinding,
    StorageClass,
    StatefulSet,
    DaemonSet,
}

impl DependentKind {
    /// Kind string as reported in logs and apply failures.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DependentKind::ServiceAccount => "ServiceAccount",
            DependentKind::RoleBinding => "RoleBinding",
            DependentKind::StorageClass => "StorageClass",
            DependentKind::StatefulSet => "StatefulSet",
            DependentKind::DaemonSet => "DaemonSet",
        }
    }

    /// Whether objects of this kind live outside any namespace.
    #[must_use]
    pub fn cluster_scoped(self) -> bool {
        matches!(self, DependentKind::StorageClass)
    }

    /// Kinds whose managed fields are immutable server-side
    /// (`StorageClass` provisioner, parameters, and reclaim policy), so
    /// drift is healed by delete-and-recreate instead of an in-place
    /// replace the apiserver would reject.
    #[must_use]
    pub fn recreate_on_drift(self) -> bool {
        matches!(self, DependentKind::StorageClass)
    }
}

/// One typed dependent object, desired or observed.
#[derive(Clone, Debug, PartialEq)]
pub enum Dependent {
    ServiceAccount(ServiceAccount),
    RoleBinding(RoleBinding),
    StorageClass(StorageClass),
    StatefulSet(StatefulSet),
    DaemonSet(DaemonSet),
}

impl Dependent {
    /// The kind of this dependent.
    #[must_use]
    pub fn kind(&self) -> DependentKind {
        match self {
            Dependent::ServiceAccount(_) => DependentKind::ServiceAccount,
            Dependent::RoleBinding(_) => DependentKind::RoleBinding,
            Dependent::StorageClass(_) => DependentKind::StorageClass,
            Dependent::StatefulSet(_) => DependentKind::StatefulSet,
            Dependent::DaemonSet(_) => DependentKind::DaemonSet,
        }
    }

    /// Object name. Dependent names are deterministic functions of the
    /// primary's identity, so this never changes across builder runs.
    #[must_use]
    pub fn name(&self) -> String {
        self.meta().name.clone().unwrap_or_default()
    }

    /// Object metadata, regardless of kind.
    #[must_use]
    pub fn meta(&self) -> &kube::core::ObjectMeta {
        match self {
            Dependent::ServiceAccount(o) => o.meta(),
            Dependent::RoleBinding(o) => o.meta(),
            Dependent::StorageClass(o) => o.meta(),
            Dependent::StatefulSet(o) => o.meta(),
            Dependent::DaemonSet(o) => o.meta(),
        }
    }

    /// The observed resourceVersion, if any.
    #[must_use]
    pub fn resource_version(&self) -> Option<String> {
        self.meta().resource_version.clone()
    }

    /// Stamp a resourceVersion onto this object before an update, arming the
    /// apiserver's compare-and-swap.
    pub fn set_resource_version(&mut self, version: Option<String>) {
        let meta = match self {
            Dependent::ServiceAccount(o) => o.meta_mut(),
            Dependent::RoleBinding(o) => o.meta_mut(),
            Dependent::StorageClass(o) => o.meta_mut(),
            Dependent::StatefulSet(o) => o.meta_mut(),
            Dependent::DaemonSet(o) => o.meta_mut(),
        };
        meta.resource_version = version;
    }
}

/// Get/create/update primitives over the typed objects the controller
/// manages.
///
/// `namespace` arguments are ignored for cluster-scoped kinds.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Read the primary resource for a key. `Ok(None)` means deleted, which
    /// is terminal for the key.
    async fn get_primary(
        &self,
        key: &ReconcileKey,
    ) -> Result<Option<CSIDriverDeployment>, StoreError>;

    /// Read one dependent by its deterministic identity.
    async fn get(
        &self,
        kind: DependentKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Dependent>, StoreError>;

    /// Create a dependent.
    async fn create(&self, namespace: &str, dep: &Dependent) -> Result<(), StoreError>;

    /// Replace a dependent. The object must carry the observed
    /// resourceVersion; a lost race returns [`StoreError::Conflict`].
    async fn update(&self, namespace: &str, dep: &Dependent) -> Result<(), StoreError>;

    /// Delete a dependent. An already-absent object is success.
    async fn delete(
        &self,
        kind: DependentKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError>;

    /// Patch the primary's status subresource.
    async fn patch_status(
        &self,
        key: &ReconcileKey,
        status: &CSIDriverDeploymentStatus,
    ) -> Result<(), StoreError>;
}

/// Production [`ClusterStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn service_accounts(&self, namespace: &str) -> Api<ServiceAccount> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn role_bindings(&self, namespace: &str) -> Api<RoleBinding> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn storage_classes(&self) -> Api<StorageClass> {
        Api::all(self.client.clone())
    }

    fn stateful_sets(&self, namespace: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn daemon_sets(&self, namespace: &str) -> Api<DaemonSet> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_primary(
        &self,
        key: &ReconcileKey,
    ) -> Result<Option<CSIDriverDeployment>, StoreError> {
        let api: Api<CSIDriverDeployment> =
            Api::namespaced(self.client.clone(), &key.namespace);
        api.get_opt(&key.name).await.map_err(StoreError::from)
    }

    async fn get(
        &self,
        kind: DependentKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Dependent>, StoreError> {
        let found = match kind {
            DependentKind::ServiceAccount => self
                .service_accounts(namespace)
                .get_opt(name)
                .await?
                .map(Dependent::ServiceAccount),
            DependentKind::RoleBinding => self
                .role_bindings(namespace)
                .get_opt(name)
                .await?
                .map(Dependent::RoleBinding),
            DependentKind::StorageClass => self
                .storage_classes()
                .get_opt(name)
                .await?
                .map(Dependent::StorageClass),
            DependentKind::StatefulSet => self
                .stateful_sets(namespace)
                .get_opt(name)
                .await?
                .map(Dependent::StatefulSet),
            DependentKind::DaemonSet => self
                .daemon_sets(namespace)
                .get_opt(name)
                .await?
                .map(Dependent::DaemonSet),
        };
        Ok(found)
    }

    async fn create(&self, namespace: &str, dep: &Dependent) -> Result<(), StoreError> {
        let pp = PostParams::default();
        debug!(kind = dep.kind().as_str(), name = %dep.name(), "Creating dependent");
        match dep {
            Dependent::ServiceAccount(o) => {
                self.service_accounts(namespace).create(&pp, o).await?;
            }
            Dependent::RoleBinding(o) => {
                self.role_bindings(namespace).create(&pp, o).await?;
            }
            Dependent::StorageClass(o) => {
                self.storage_classes().create(&pp, o).await?;
            }
            Dependent::StatefulSet(o) => {
                self.stateful_sets(namespace).create(&pp, o).await?;
            }
            Dependent::DaemonSet(o) => {
                self.daemon_sets(namespace).create(&pp, o).await?;
            }
        }
        Ok(())
    }

    async fn update(&self, namespace: &str, dep: &Dependent) -> Result<(), StoreError> {
        let pp = PostParams::default();
        let name = dep.name();
        debug!(kind = dep.kind().as_str(), name = %name, "Replacing dependent");
        match dep {
            Dependent::ServiceAccount(o) => {
                self.service_accounts(namespace).replace(&name, &pp, o).await?;
            }
            Dependent::RoleBinding(o) => {
                self.role_bindings(namespace).replace(&name, &pp, o).await?;
            }
            Dependent::StorageClass(o) => {
                self.storage_classes().replace(&name, &pp, o).await?;
            }
            Dependent::StatefulSet(o) => {
                self.stateful_sets(namespace).replace(&name, &pp, o).await?;
            }
            Dependent::DaemonSet(o) => {
                self.daemon_sets(namespace).replace(&name, &pp, o).await?;
            }
        }
        Ok(())
    }

    async fn delete(
        &self,
        kind: DependentKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let dp = DeleteParams::default();
        debug!(kind = kind.as_str(), name = %name, "Deleting dependent");
        let result = match kind {
            DependentKind::ServiceAccount => self
                .service_accounts(namespace)
                .delete(name, &dp)
                .await
                .map(|_| ()),
            DependentKind::RoleBinding => self
                .role_bindings(namespace)
                .delete(name, &dp)
                .await
                .map(|_| ()),
            DependentKind::StorageClass => {
                self.storage_classes().delete(name, &dp).await.map(|_| ())
            }
            DependentKind::StatefulSet => self
                .stateful_sets(namespace)
                .delete(name, &dp)
                .await
                .map(|_| ()),
            DependentKind::DaemonSet => self
                .daemon_sets(namespace)
                .delete(name, &dp)
                .await
                .map(|_| ()),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => match StoreError::from(e) {
                StoreError::NotFound => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn patch_status(
        &self,
        key: &ReconcileKey,
        status: &CSIDriverDeploymentStatus,
    ) -> Result<(), StoreError> {
        let api: Api<CSIDriverDeployment> =
            Api::namespaced(self.client.clone(), &key.namespace);
        let patch = json!({ "status": status });
        api.patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
