// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Semantic drift detection between desired and observed dependents.
//!
//! The Diff step must treat an observed object as matching when every field
//! the controller manages has the desired value, regardless of what the
//! apiserver defaulted or an external actor labeled on top. Comparing full
//! objects would make every pass look drifted; comparing nothing would never
//! heal manual edits. The middle ground here: project the spec-relevant
//! fields of both objects to JSON and require the desired projection to be a
//! subset of the observed one.

use crate::labels::DEFAULT_STORAGE_CLASS_ANNOTATION;
use crate::store::Dependent;
use serde_json::{json, Value};

/// Returns true when `desired` is structurally contained in `observed`.
///
/// Rules:
/// - `Null` in desired matches anything (the controller doesn't manage it)
/// - Objects: every desired entry must be contained in the observed entry;
///   extra observed entries (server defaults) are ignored
/// - Arrays: same length, elements contained pairwise — order is meaningful
///   for the lists the controller manages (containers, volumes, subjects)
/// - Scalars: equality
#[must_use]
pub fn value_subset(desired: &Value, observed: &Value) -> bool {
    match (desired, observed) {
        (Value::Null, _) => true,
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(k, v)| {
            if v.is_null() {
                return true;
            }
            have.get(k).is_some_and(|o| value_subset(v, o))
        }),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len()
                && want.iter().zip(have.iter()).all(|(w, h)| value_subset(w, h))
        }
        (a, b) => a == b,
    }
}

/// Project the spec-relevant fields of a dependent to JSON.
///
/// Labels, annotations, status, and metadata never appear here, so edits to
/// them (or apiserver-managed fields) cannot trigger updates. The one
/// exception is the default-class annotation on a `StorageClass`, which is
/// part of its contract.
fn projection(dep: &Dependent) -> Value {
    match dep {
        // ServiceAccounts carry no managed payload; existence is the contract.
        Dependent::ServiceAccount(_) => Value::Null,
        Dependent::RoleBinding(rb) => json!({
            "roleRef": rb.role_ref,
            "subjects": rb.subjects,
        }),
        // The default-class flag projects to a concrete value on both
        // sides: an absent annotation means "false", so un-marking a
        // default class drifts and gets healed.
        Dependent::StorageClass(sc) => json!({
            "provisioner": sc.provisioner,
            "parameters": sc.parameters,
            "reclaimPolicy": sc.reclaim_policy,
            "volumeBindingMode": sc.volume_binding_mode,
            "allowVolumeExpansion": sc.allow_volume_expansion,
            "defaultClass": sc.metadata.annotations.as_ref()
                .and_then(|a| a.get(DEFAULT_STORAGE_CLASS_ANNOTATION))
                .map_or("false", String::as_str),
        }),
        Dependent::StatefulSet(sts) => json!({ "spec": sts.spec }),
        Dependent::DaemonSet(ds) => json!({ "spec": ds.spec }),
    }
}

/// Returns true when the observed object no longer satisfies the desired
/// one and must be updated.
#[must_use]
pub fn drifted(desired: &Dependent, observed: &Dependent) -> bool {
    !value_subset(&projection(desired), &projection(observed))
}
