// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared constants for the Castor operator.
//!
//! API group identifiers, environment variable names, default container
//! images, and CSI filesystem paths used across the builders and watchers.

// ============================================================================
// API Group and Kinds
// ============================================================================

/// API group for all Castor custom resources
pub const API_GROUP: &str = "castor.firestoned.io";

/// Full API group/version string used in owner references
pub const API_GROUP_VERSION: &str = "castor.firestoned.io/v1alpha1";

/// Kind string for the `CSIDriverDeployment` primary resource
pub const KIND_CSI_DRIVER_DEPLOYMENT: &str = "CSIDriverDeployment";

// ============================================================================
// Image configuration environment variables
//
// Slot names follow the operator-sdk RELATED_IMAGE convention so the images
// can be pinned by the bundle that ships the operator.
// ============================================================================

/// Environment variable holding the CSI driver plugin image
pub const ENV_IMAGE_DRIVER: &str = "RELATED_IMAGE_DRIVER";

/// Environment variable holding the external-provisioner sidecar image
pub const ENV_IMAGE_PROVISIONER: &str = "RELATED_IMAGE_PROVISIONER";

/// Environment variable holding the external-attacher sidecar image
pub const ENV_IMAGE_ATTACHER: &str = "RELATED_IMAGE_ATTACHER";

/// Environment variable holding the external-resizer sidecar image
pub const ENV_IMAGE_RESIZER: &str = "RELATED_IMAGE_RESIZER";

/// Environment variable holding the external-snapshotter sidecar image
pub const ENV_IMAGE_SNAPSHOTTER: &str = "RELATED_IMAGE_SNAPSHOTTER";

/// Environment variable holding the node-driver-registrar sidecar image
pub const ENV_IMAGE_NODE_REGISTRAR: &str = "RELATED_IMAGE_NODE_DRIVER_REGISTRAR";

/// Environment variable holding the liveness-probe sidecar image
pub const ENV_IMAGE_LIVENESS_PROBE: &str = "RELATED_IMAGE_LIVENESS_PROBE";

/// Environment variable overriding the reconcile worker count
pub const ENV_WORKERS: &str = "CASTOR_WORKERS";

// ============================================================================
// Default sidecar images
//
// Used when neither the CR spec nor the environment pins a slot. The driver
// image itself has no default; it must always be supplied.
// ============================================================================

/// Default external-provisioner image
pub const DEFAULT_IMAGE_PROVISIONER: &str = "registry.k8s.io/sig-storage/csi-provisioner:v5.1.0";

/// Default external-attacher image
pub const DEFAULT_IMAGE_ATTACHER: &str = "registry.k8s.io/sig-storage/csi-attacher:v4.8.0";

/// Default external-resizer image
pub const DEFAULT_IMAGE_RESIZER: &str = "registry.k8s.io/sig-storage/csi-resizer:v1.13.1";

/// Default external-snapshotter image
pub const DEFAULT_IMAGE_SNAPSHOTTER: &str = "registry.k8s.io/sig-storage/csi-snapshotter:v8.2.0";

/// Default node-driver-registrar image
pub const DEFAULT_IMAGE_NODE_REGISTRAR: &str =
    "registry.k8s.io/sig-storage/csi-node-driver-registrar:v2.13.0";

/// Default liveness-probe image
pub const DEFAULT_IMAGE_LIVENESS_PROBE: &str = "registry.k8s.io/sig-storage/livenessprobe:v2.15.0";

// ============================================================================
// CSI paths and container names
// ============================================================================

/// Socket directory shared between the driver and its sidecars in the
/// controller-plane pod
pub const CONTROLLER_SOCKET_DIR: &str = "/var/lib/csi/sockets/pluginproxy";

/// CSI endpoint the controller-plane containers talk to
pub const CONTROLLER_CSI_ENDPOINT: &str = "unix:///var/lib/csi/sockets/pluginproxy/csi.sock";

/// csi-address argument shared by the controller-plane sidecars
pub const CONTROLLER_CSI_ADDRESS: &str = "/var/lib/csi/sockets/pluginproxy/csi.sock";

/// Kubelet plugin registry directory on every node
pub const KUBELET_REGISTRATION_DIR: &str = "/var/lib/kubelet/plugins_registry";

/// Kubelet plugin base directory on every node
pub const KUBELET_PLUGIN_DIR: &str = "/var/lib/kubelet/plugins";

/// Kubelet pods directory, mounted bidirectionally so the driver can bind
/// mount volumes into pods
pub const KUBELET_PODS_DIR: &str = "/var/lib/kubelet/pods";

/// Container name for the CSI driver plugin
pub const CONTAINER_NAME_DRIVER: &str = "csi-driver";

/// Container name for the external-provisioner sidecar
pub const CONTAINER_NAME_PROVISIONER: &str = "csi-provisioner";

/// Container name for the external-attacher sidecar
pub const CONTAINER_NAME_ATTACHER: &str = "csi-attacher";

/// Container name for the external-resizer sidecar
pub const CONTAINER_NAME_RESIZER: &str = "csi-resizer";

/// Container name for the external-snapshotter sidecar
pub const CONTAINER_NAME_SNAPSHOTTER: &str = "csi-snapshotter";

/// Container name for the node-driver-registrar sidecar
pub const CONTAINER_NAME_NODE_REGISTRAR: &str = "csi-node-driver-registrar";

/// Container name for the liveness-probe sidecar
pub const CONTAINER_NAME_LIVENESS_PROBE: &str = "liveness-probe";

// ============================================================================
// RBAC
// ============================================================================

/// ClusterRole granted to the controller-plane service account
pub const CLUSTER_ROLE_CONTROLLER: &str = "castor:csi-controller";

/// ClusterRole granted to the node-plane service account
pub const CLUSTER_ROLE_NODE: &str = "castor:csi-node";

// ============================================================================
// Controller tuning
// ============================================================================

/// Default number of reconcile workers pulling from the work queue
pub const DEFAULT_WORKERS: usize = 2;
