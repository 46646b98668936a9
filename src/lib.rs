// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Castor - CSI Driver Deployment Operator for Kubernetes
//!
//! Castor is a Kubernetes operator written in Rust that converges the cluster
//! state of a CSI driver deployment toward a single `CSIDriverDeployment`
//! custom resource.
//!
//! ## Overview
//!
//! A `CSIDriverDeployment` declares which CSI driver to run and how. Castor
//! watches the primary resource and every dependent resource type it owns,
//! and for each change runs one level-triggered reconcile pass that:
//!
//! 1. Fetches the primary resource (a deleted primary is terminal; owned
//!    objects are garbage collected through their owner references)
//! 2. Builds the full desired dependent set: a controller-plane
//!    `StatefulSet`, a node-plane `DaemonSet`, two `ServiceAccounts`, two
//!    `RoleBindings`, and a `StorageClass`
//! 3. Diffs each desired object against what the cluster currently stores
//! 4. Applies creates/updates in a fixed order, collecting per-object
//!    failures without aborting the pass
//!
//! ## Modules
//!
//! - [`crd`] - The `CSIDriverDeployment` custom resource definition
//! - [`config`] - Container image configuration from the process environment
//! - [`resources`] - Pure builders for the desired dependent objects
//! - [`diff`] - Semantic drift detection between desired and observed state
//! - [`store`] - Cluster state store abstraction and the kube-backed client
//! - [`queue`] - Deduplicating per-key work queue with backoff
//! - [`dispatcher`] - Watch event to reconcile-key mapping
//! - [`reconciler`] - The single-key reconcile state machine
//! - [`controller`] - Worker pool and watcher wiring
//!
//! ## Reconciliation guarantees
//!
//! - At most one concurrent reconcile per key; events arriving mid-pass
//!   schedule exactly one more pass
//! - A pass with no drift performs zero mutating calls
//! - Updates use resourceVersion compare-and-swap; conflicts re-run the
//!   diff from a fresh read on the next pass
//! - Failures back off exponentially per key and reset after a success

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod labels;
pub mod queue;
pub mod reconciler;
pub mod resources;
pub mod status;
pub mod store;
pub mod store_fake;

#[cfg(test)]
mod crd_tests;
#[cfg(test)]
mod diff_tests;
#[cfg(test)]
mod dispatcher_tests;
#[cfg(test)]
mod reconciler_tests;
#[cfg(test)]
mod status_tests;
