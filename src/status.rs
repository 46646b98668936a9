// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for the `CSIDriverDeployment` resource.
//!
//! The reconciler reports the outcome of each pass as standard Kubernetes
//! conditions so a human can see persistent failures without reading
//! controller logs. Status reporting is a best-effort hook: a failed status
//! patch never fails the pass that produced it.

use crate::crd::{CSIDriverDeploymentStatus, Condition};
use chrono::Utc;

/// Condition type reported when the dependent set matches the desired state.
pub const CONDITION_AVAILABLE: &str = "Available";

/// Condition type reported when one or more applies failed.
pub const CONDITION_DEGRADED: &str = "Degraded";

/// Reason for a successful pass.
pub const REASON_RECONCILE_SUCCEEDED: &str = "ReconcileSucceeded";

/// Reason for a pass with apply failures.
pub const REASON_APPLY_FAILED: &str = "ApplyFailed";

/// Reason when the desired state could not be built.
pub const REASON_BUILD_FAILED: &str = "BuildFailed";

/// Create a new Kubernetes condition with the current timestamp.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Insert or replace a condition by type.
///
/// The transition time only moves when the status value actually changes,
/// per Kubernetes conventions; reason and message always refresh.
pub fn set_condition(status: &mut CSIDriverDeploymentStatus, mut condition: Condition) {
    if let Some(existing) = status
        .conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time.clone();
        }
        *existing = condition;
    } else {
        status.conditions.push(condition);
    }
}
