// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired-state builders for `CSIDriverDeployment` dependents.
//!
//! This module provides functions to build the Kubernetes resources realizing
//! one `CSIDriverDeployment`: the controller-plane `StatefulSet`, the
//! node-plane `DaemonSet`, their `ServiceAccounts` and `RoleBindings`, and
//! the `StorageClass`. All functions are pure and easily testable.
//!
//! Two invariants every builder upholds:
//!
//! - Dependent names are deterministic functions of the primary's name, so
//!   re-running a builder is idempotent and its output comparable.
//! - Every dependent carries exactly one controller owner reference back to
//!   the primary; owner-reference garbage collection is the only cleanup
//!   mechanism.

use crate::config::{ImageConfig, ResolvedImages};
use crate::constants::{
    API_GROUP_VERSION, CLUSTER_ROLE_CONTROLLER, CLUSTER_ROLE_NODE, CONTAINER_NAME_ATTACHER,
    CONTAINER_NAME_DRIVER, CONTAINER_NAME_LIVENESS_PROBE, CONTAINER_NAME_NODE_REGISTRAR,
    CONTAINER_NAME_PROVISIONER, CONTAINER_NAME_RESIZER, CONTAINER_NAME_SNAPSHOTTER,
    CONTROLLER_CSI_ADDRESS, CONTROLLER_CSI_ENDPOINT, CONTROLLER_SOCKET_DIR,
    KIND_CSI_DRIVER_DEPLOYMENT, KUBELET_PLUGIN_DIR, KUBELET_PODS_DIR, KUBELET_REGISTRATION_DIR,
};
use crate::crd::CSIDriverDeployment;
use crate::error::Error;
use crate::labels::{
    CASTOR_OWNER_NAMESPACE_LABEL, COMPONENT_CONTROLLER_PLANE, COMPONENT_NODE_PLANE,
    COMPONENT_STORAGE_CLASS, DEFAULT_STORAGE_CLASS_ANNOTATION, K8S_COMPONENT, K8S_INSTANCE,
    K8S_MANAGED_BY, K8S_NAME, K8S_PART_OF, MANAGED_BY_CASTOR, PART_OF_CASTOR,
};
use crate::store::Dependent;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource, HostPathVolumeSource,
    ObjectFieldSelector, PodSpec, PodTemplateSpec, Probe, SecurityContext, ServiceAccount,
    Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::debug;

/// Port the node-plane liveness probe listens on
const HEALTHZ_PORT: i32 = 9808;

// ============================================================================
// Deterministic names
// ============================================================================

/// Name of the controller-plane `StatefulSet` for a primary.
#[must_use]
pub fn controller_name(primary_name: &str) -> String {
    format!("{primary_name}-controller")
}

/// Name of the node-plane `DaemonSet` for a primary.
#[must_use]
pub fn node_name(primary_name: &str) -> String {
    format!("{primary_name}-node")
}

/// Name of the controller-plane `ServiceAccount` for a primary.
#[must_use]
pub fn controller_service_account_name(primary_name: &str) -> String {
    format!("{primary_name}-controller-sa")
}

/// Name of the node-plane `ServiceAccount` for a primary.
#[must_use]
pub fn node_service_account_name(primary_name: &str) -> String {
    format!("{primary_name}-node-sa")
}

/// Name of the controller-plane `RoleBinding` for a primary.
#[must_use]
pub fn controller_role_binding_name(primary_name: &str) -> String {
    format!("{primary_name}-controller-rb")
}

/// Name of the node-plane `RoleBinding` for a primary.
#[must_use]
pub fn node_role_binding_name(primary_name: &str) -> String {
    format!("{primary_name}-node-rb")
}

/// Name of the `StorageClass` for a primary: the spec's choice, or the
/// primary's own name.
#[must_use]
pub fn storage_class_name(primary: &CSIDriverDeployment) -> String {
    primary
        .spec
        .storage_class
        .as_ref()
        .and_then(|sc| sc.name.clone())
        .unwrap_or_else(|| primary.name_any())
}

// ============================================================================
// Labels and ownership
// ============================================================================

/// Builds standardized Kubernetes labels for one dependent.
///
/// The managed-by value is what the dependent watch streams filter on, and
/// the owner-namespace label is what the dispatcher falls back to for
/// cluster-scoped dependents.
#[must_use]
pub fn build_labels(primary: &CSIDriverDeployment, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(K8S_NAME.into(), primary.spec.driver_name.clone());
    labels.insert(K8S_INSTANCE.into(), primary.name_any());
    labels.insert(K8S_COMPONENT.into(), component.into());
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_CASTOR.into());
    labels.insert(K8S_PART_OF.into(), PART_OF_CASTOR.into());
    labels.insert(
        CASTOR_OWNER_NAMESPACE_LABEL.into(),
        primary.namespace().unwrap_or_default(),
    );
    labels
}

/// Builds the single controller owner reference every dependent carries.
#[must_use]
pub fn build_owner_references(primary: &CSIDriverDeployment) -> Vec<OwnerReference> {
    vec![OwnerReference {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_CSI_DRIVER_DEPLOYMENT.to_string(),
        name: primary.name_any(),
        uid: primary.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]
}

fn dependent_meta(
    primary: &CSIDriverDeployment,
    name: String,
    component: &str,
    namespaced: bool,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: namespaced.then(|| primary.namespace().unwrap_or_default()),
        labels: Some(build_labels(primary, component)),
        owner_references: Some(build_owner_references(primary)),
        ..Default::default()
    }
}

// ============================================================================
// Service identities and permission bindings
// ============================================================================

/// Builds the controller-plane `ServiceAccount`.
#[must_use]
pub fn build_controller_service_account(primary: &CSIDriverDeployment) -> ServiceAccount {
    ServiceAccount {
        metadata: dependent_meta(
            primary,
            controller_service_account_name(&primary.name_any()),
            COMPONENT_CONTROLLER_PLANE,
            true,
        ),
        ..Default::default()
    }
}

/// Builds the node-plane `ServiceAccount`.
#[must_use]
pub fn build_node_service_account(primary: &CSIDriverDeployment) -> ServiceAccount {
    ServiceAccount {
        metadata: dependent_meta(
            primary,
            node_service_account_name(&primary.name_any()),
            COMPONENT_NODE_PLANE,
            true,
        ),
        ..Default::default()
    }
}

fn build_role_binding(
    primary: &CSIDriverDeployment,
    name: String,
    component: &str,
    cluster_role: &str,
    service_account: String,
) -> RoleBinding {
    RoleBinding {
        metadata: dependent_meta(primary, name, component, true),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: cluster_role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account,
            namespace: primary.namespace(),
            ..Default::default()
        }]),
    }
}

/// Builds the `RoleBinding` granting the controller-plane service account
/// the provisioner/attacher permissions.
#[must_use]
pub fn build_controller_role_binding(primary: &CSIDriverDeployment) -> RoleBinding {
    let name = primary.name_any();
    build_role_binding(
        primary,
        controller_role_binding_name(&name),
        COMPONENT_CONTROLLER_PLANE,
        CLUSTER_ROLE_CONTROLLER,
        controller_service_account_name(&name),
    )
}

/// Builds the `RoleBinding` granting the node-plane service account the
/// registrar permissions.
#[must_use]
pub fn build_node_role_binding(primary: &CSIDriverDeployment) -> RoleBinding {
    let name = primary.name_any();
    build_role_binding(
        primary,
        node_role_binding_name(&name),
        COMPONENT_NODE_PLANE,
        CLUSTER_ROLE_NODE,
        node_service_account_name(&name),
    )
}

// ============================================================================
// StorageClass
// ============================================================================

/// Builds the `StorageClass` provisioned by the deployed driver.
#[must_use]
pub fn build_storage_class(primary: &CSIDriverDeployment) -> StorageClass {
    let config = primary.spec.storage_class.as_ref();
    let mut metadata = dependent_meta(
        primary,
        storage_class_name(primary),
        COMPONENT_STORAGE_CLASS,
        false,
    );
    if config.is_some_and(|c| c.default) {
        metadata.annotations = Some(BTreeMap::from([(
            DEFAULT_STORAGE_CLASS_ANNOTATION.to_string(),
            "true".to_string(),
        )]));
    }

    StorageClass {
        metadata,
        provisioner: primary.spec.driver_name.clone(),
        reclaim_policy: Some(
            config
                .and_then(|c| c.reclaim_policy.clone())
                .unwrap_or_else(|| "Delete".to_string()),
        ),
        parameters: config.and_then(|c| c.parameters.clone()),
        volume_binding_mode: Some("WaitForFirstConsumer".to_string()),
        allow_volume_expansion: Some(true),
        ..Default::default()
    }
}

// ============================================================================
// Controller-plane StatefulSet
// ============================================================================

fn socket_mount() -> VolumeMount {
    VolumeMount {
        name: "socket-dir".to_string(),
        mount_path: CONTROLLER_SOCKET_DIR.to_string(),
        ..Default::default()
    }
}

fn sidecar_container(name: &str, image: &str, extra_args: &[&str]) -> Container {
    let mut args = vec![format!("--csi-address={CONTROLLER_CSI_ADDRESS}")];
    args.extend(extra_args.iter().map(ToString::to_string));
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        args: Some(args),
        volume_mounts: Some(vec![socket_mount()]),
        ..Default::default()
    }
}

/// Builds the controller-plane `StatefulSet`.
///
/// One replica running the driver's controller service plus the
/// provisioner, attacher, resizer, and snapshotter sidecars, all sharing a
/// socket emptyDir. A `StatefulSet` rather than a `Deployment` so rolling
/// updates never run two controller instances concurrently.
#[must_use]
pub fn build_controller_statefulset(
    primary: &CSIDriverDeployment,
    images: &ResolvedImages,
) -> StatefulSet {
    let primary_name = primary.name_any();
    let name = controller_name(&primary_name);
    debug!(name = %name, driver = %primary.spec.driver_name, "Building controller StatefulSet");

    let labels = build_labels(primary, COMPONENT_CONTROLLER_PLANE);

    let driver_container = Container {
        name: CONTAINER_NAME_DRIVER.to_string(),
        image: Some(images.driver.clone()),
        args: Some(vec!["--endpoint=$(CSI_ENDPOINT)".to_string()]),
        env: Some(vec![
            EnvVar {
                name: "CSI_ENDPOINT".to_string(),
                value: Some(CONTROLLER_CSI_ENDPOINT.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "KUBE_NODE_NAME".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "spec.nodeName".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![socket_mount()]),
        ..Default::default()
    };

    StatefulSet {
        metadata: dependent_meta(primary, name.clone(), COMPONENT_CONTROLLER_PLANE, true),
        spec: Some(StatefulSetSpec {
            service_name: Some(name),
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(controller_service_account_name(&primary_name)),
                    containers: vec![
                        driver_container,
                        sidecar_container(
                            CONTAINER_NAME_PROVISIONER,
                            &images.provisioner,
                            &["--default-fstype=ext4"],
                        ),
                        sidecar_container(CONTAINER_NAME_ATTACHER, &images.attacher, &[]),
                        sidecar_container(CONTAINER_NAME_RESIZER, &images.resizer, &[]),
                        sidecar_container(CONTAINER_NAME_SNAPSHOTTER, &images.snapshotter, &[]),
                    ],
                    volumes: Some(vec![Volume {
                        name: "socket-dir".to_string(),
                        empty_dir: Some(EmptyDirVolumeSource::default()),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// ============================================================================
// Node-plane DaemonSet
// ============================================================================

/// Builds the node-plane `DaemonSet`.
///
/// Runs the driver's node service on every selected node, privileged with
/// bidirectional kubelet mounts so it can bind-mount volumes into pods,
/// together with the node-driver-registrar and liveness-probe sidecars.
#[must_use]
pub fn build_node_daemonset(
    primary: &CSIDriverDeployment,
    images: &ResolvedImages,
) -> DaemonSet {
    let primary_name = primary.name_any();
    let name = node_name(&primary_name);
    debug!(name = %name, driver = %primary.spec.driver_name, "Building node DaemonSet");

    let labels = build_labels(primary, COMPONENT_NODE_PLANE);
    let driver_name = &primary.spec.driver_name;
    let plugin_dir = format!("{KUBELET_PLUGIN_DIR}/{driver_name}");
    let node_endpoint = format!("unix://{plugin_dir}/csi.sock");

    let driver_container = Container {
        name: CONTAINER_NAME_DRIVER.to_string(),
        image: Some(images.driver.clone()),
        args: Some(vec!["--endpoint=$(CSI_ENDPOINT)".to_string()]),
        env: Some(vec![
            EnvVar {
                name: "CSI_ENDPOINT".to_string(),
                value: Some(node_endpoint),
                ..Default::default()
            },
            EnvVar {
                name: "KUBE_NODE_NAME".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "spec.nodeName".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            allow_privilege_escalation: Some(true),
            ..Default::default()
        }),
        ports: Some(vec![ContainerPort {
            name: Some("healthz".to_string()),
            container_port: HEALTHZ_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        liveness_probe: Some(Probe {
            http_get: Some(k8s_openapi::api::core::v1::HTTPGetAction {
                path: Some("/healthz".to_string()),
                port: IntOrString::String("healthz".to_string()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(10),
            period_seconds: Some(30),
            timeout_seconds: Some(5),
            failure_threshold: Some(5),
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            VolumeMount {
                name: "plugin-dir".to_string(),
                mount_path: plugin_dir.clone(),
                ..Default::default()
            },
            VolumeMount {
                name: "pods-dir".to_string(),
                mount_path: KUBELET_PODS_DIR.to_string(),
                mount_propagation: Some("Bidirectional".to_string()),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let registrar_container = Container {
        name: CONTAINER_NAME_NODE_REGISTRAR.to_string(),
        image: Some(images.node_registrar.clone()),
        args: Some(vec![
            "--csi-address=$(ADDRESS)".to_string(),
            "--kubelet-registration-path=$(REGISTRATION_PATH)".to_string(),
        ]),
        env: Some(vec![
            EnvVar {
                name: "ADDRESS".to_string(),
                value: Some(format!("{plugin_dir}/csi.sock")),
                ..Default::default()
            },
            EnvVar {
                name: "REGISTRATION_PATH".to_string(),
                value: Some(format!("{plugin_dir}/csi.sock")),
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: "plugin-dir".to_string(),
                mount_path: plugin_dir.clone(),
                ..Default::default()
            },
            VolumeMount {
                name: "registration-dir".to_string(),
                mount_path: KUBELET_REGISTRATION_DIR.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let liveness_container = Container {
        name: CONTAINER_NAME_LIVENESS_PROBE.to_string(),
        image: Some(images.liveness_probe.clone()),
        args: Some(vec![
            "--csi-address=$(ADDRESS)".to_string(),
            format!("--health-port={HEALTHZ_PORT}"),
        ]),
        env: Some(vec![EnvVar {
            name: "ADDRESS".to_string(),
            value: Some(format!("{plugin_dir}/csi.sock")),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: "plugin-dir".to_string(),
            mount_path: plugin_dir.clone(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let host_path = |path: String, kind: &str| Volume {
        name: String::new(),
        host_path: Some(HostPathVolumeSource {
            path,
            type_: Some(kind.to_string()),
        }),
        ..Default::default()
    };

    DaemonSet {
        metadata: dependent_meta(primary, name, COMPONENT_NODE_PLANE, true),
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(node_service_account_name(&primary_name)),
                    node_selector: primary.spec.node_selector.clone(),
                    containers: vec![driver_container, registrar_container, liveness_container],
                    volumes: Some(vec![
                        Volume {
                            name: "plugin-dir".to_string(),
                            ..host_path(plugin_dir, "DirectoryOrCreate")
                        },
                        Volume {
                            name: "registration-dir".to_string(),
                            ..host_path(KUBELET_REGISTRATION_DIR.to_string(), "Directory")
                        },
                        Volume {
                            name: "pods-dir".to_string(),
                            ..host_path(KUBELET_PODS_DIR.to_string(), "Directory")
                        },
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// ============================================================================
// Full desired set
// ============================================================================

/// The complete desired dependent set for one primary, in apply order:
/// service identities and permission bindings before workloads, so the
/// workloads never start before the identities they run as exist. The
/// storage class is independent and sits between the two groups.
#[derive(Clone, Debug)]
pub struct DesiredState {
    dependents: Vec<Dependent>,
}

impl DesiredState {
    /// The dependents in apply order.
    #[must_use]
    pub fn in_apply_order(&self) -> &[Dependent] {
        &self.dependents
    }

    /// Number of dependents in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }
}

/// Builds the full desired dependent set for one primary.
///
/// Pure and deterministic: identical inputs yield identical descriptors.
///
/// # Errors
///
/// Returns [`Error::Builder`] when the primary has no namespace or name yet,
/// or when no driver image is resolvable.
pub fn build_desired_state(
    primary: &CSIDriverDeployment,
    images: &ImageConfig,
) -> Result<DesiredState, Error> {
    if primary.metadata.name.is_none() || primary.metadata.namespace.is_none() {
        return Err(Error::Builder(
            "primary resource has no namespace/name".to_string(),
        ));
    }
    let resolved = images.resolve(primary.spec.images.as_ref())?;

    Ok(DesiredState {
        dependents: vec![
            Dependent::ServiceAccount(build_controller_service_account(primary)),
            Dependent::ServiceAccount(build_node_service_account(primary)),
            Dependent::RoleBinding(build_controller_role_binding(primary)),
            Dependent::RoleBinding(build_node_role_binding(primary)),
            Dependent::StorageClass(build_storage_class(primary)),
            Dependent::StatefulSet(build_controller_statefulset(primary, &resolved)),
            Dependent::DaemonSet(build_node_daemonset(primary, &resolved)),
        ],
    })
}
