// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for CSI driver deployments.
//!
//! This module defines the single primary resource Castor reconciles:
//! [`CSIDriverDeployment`]. One `CSIDriverDeployment` declares a complete
//! CSI driver rollout — which driver image to run, how to name the storage
//! class, and where the node plugin may schedule. The controller owns every
//! dependent object it creates for it.
//!
//! # Example
//!
//! ```rust,no_run
//! use castor::crd::{CSIDriverDeploymentSpec, StorageClassConfig};
//!
//! let spec = CSIDriverDeploymentSpec {
//!     driver_name: "csi.example.com".to_string(),
//!     images: None,
//!     storage_class: Some(StorageClassConfig {
//!         name: Some("fast".to_string()),
//!         default: true,
//!         reclaim_policy: None,
//!         parameters: None,
//!     }),
//!     node_selector: None,
//! };
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-slot container image overrides.
///
/// Any slot left unset falls back to the operator's environment
/// (`RELATED_IMAGE_*`), then to the pinned upstream sidecar default. The
/// driver slot has no default and must be resolvable from the override or
/// the environment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageOverrides {
    /// CSI driver plugin image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,

    /// external-provisioner sidecar image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioner: Option<String>,

    /// external-attacher sidecar image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attacher: Option<String>,

    /// external-resizer sidecar image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resizer: Option<String>,

    /// external-snapshotter sidecar image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshotter: Option<String>,

    /// node-driver-registrar sidecar image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_registrar: Option<String>,

    /// liveness-probe sidecar image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<String>,
}

/// Settings for the `StorageClass` the controller creates.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassConfig {
    /// Name of the storage class. Defaults to the `CSIDriverDeployment` name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Mark the storage class as the cluster default.
    #[serde(default)]
    pub default: bool,

    /// Reclaim policy: "Delete" or "Retain". Defaults to "Delete".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reclaim_policy: Option<String>,

    /// Driver-specific provisioning parameters passed through verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
}

/// `CSIDriverDeployment` declares a complete CSI driver rollout.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "castor.firestoned.io",
    version = "v1alpha1",
    kind = "CSIDriverDeployment",
    namespaced,
    doc = "CSIDriverDeployment declares a CSI driver rollout. The controller converges a controller-plane StatefulSet, a node-plane DaemonSet, service accounts, role bindings, and a StorageClass toward this spec."
)]
#[kube(status = "CSIDriverDeploymentStatus")]
#[serde(rename_all = "camelCase")]
pub struct CSIDriverDeploymentSpec {
    /// CSI driver name registered with the kubelet (e.g., "csi.example.com").
    ///
    /// Also used as the provisioner of the created storage class.
    #[schemars(regex(
        pattern = r"^[a-zA-Z0-9]([a-zA-Z0-9.-]{0,61}[a-zA-Z0-9])?$"
    ))]
    pub driver_name: String,

    /// Per-slot container image overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<ImageOverrides>,

    /// Storage class settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<StorageClassConfig>,

    /// Node selector applied to the node-plane `DaemonSet`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
}

/// A single status condition, following standard Kubernetes conventions.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. Castor reports "Available" and "Degraded".
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// `CSIDriverDeployment` status
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CSIDriverDeploymentStatus {
    /// Observed conditions, keyed by condition type.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Generation of the spec the controller last acted on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
