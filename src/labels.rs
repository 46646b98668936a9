// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all dependent builders.
//!
//! This module defines standard Kubernetes labels and Castor-specific
//! labels/annotations to ensure consistency across all resources created by
//! the controller.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
/// (e.g., "controller-plane", "node-plane")
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application (the CSI driver name)
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of` indicating this resource is part of Castor
pub const PART_OF_CASTOR: &str = "castor";

/// Value for `app.kubernetes.io/managed-by` on every dependent the controller
/// creates; the watch streams for dependent types filter on it
pub const MANAGED_BY_CASTOR: &str = "castor";

/// Component value for the controller-plane workload and its identities
pub const COMPONENT_CONTROLLER_PLANE: &str = "controller-plane";

/// Component value for the node-plane workload and its identities
pub const COMPONENT_NODE_PLANE: &str = "node-plane";

/// Component value for the storage class
pub const COMPONENT_STORAGE_CLASS: &str = "storage-class";

// ============================================================================
// Castor-Specific Labels
// ============================================================================

/// Label carrying the namespace of the owning `CSIDriverDeployment`.
///
/// Cluster-scoped dependents (the `StorageClass`) cannot express their
/// owner's namespace through the owner reference, so the dispatcher derives
/// the reconcile key from this label instead.
pub const CASTOR_OWNER_NAMESPACE_LABEL: &str = "castor.firestoned.io/owner-namespace";

// ============================================================================
// Castor-Specific Annotations
// ============================================================================

/// Annotation marking a `StorageClass` as the cluster default
pub const DEFAULT_STORAGE_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";
