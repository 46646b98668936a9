// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The single-key reconcile state machine.
//!
//! One pass runs Fetch → BuildDesired → Diff → Apply → Outcome for one
//! `ReconcileKey`:
//!
//! - **Fetch**: read the primary. Not-found is terminal success — owned
//!   objects are garbage collected through their owner references, nothing
//!   to do here.
//! - **BuildDesired**: run the pure builders against the spec and the image
//!   configuration.
//! - **Diff**: read each dependent by its deterministic name; absent means
//!   create, semantically drifted means update (carrying the observed
//!   resourceVersion) — or delete-and-recreate for kinds whose managed
//!   fields are immutable server-side — and matching means no-op.
//! - **Apply**: execute in fixed order — service identities and permission
//!   bindings before workloads — recording failures without aborting, so a
//!   pass makes maximal forward progress.
//! - **Outcome**: all-ok is steady state until the next watch event; any
//!   failure aggregates into [`Error::PartialApply`] and the work queue owns
//!   the retry.
//!
//! The pass is level-triggered: it acts on the state it reads now, not on
//! whatever event triggered it, so coalesced or replayed events are harmless.

use crate::config::ImageConfig;
use crate::crd::CSIDriverDeployment;
use crate::diff::drifted;
use crate::error::{ApplyFailure, Error};
use crate::resources::build_desired_state;
use crate::status::{
    create_condition, set_condition, CONDITION_AVAILABLE, CONDITION_DEGRADED, REASON_APPLY_FAILED,
    REASON_BUILD_FAILED, REASON_RECONCILE_SUCCEEDED,
};
use crate::store::{ClusterStore, Dependent, ReconcileKey};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one successful pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Dependents created this pass
    pub created: usize,
    /// Dependents updated this pass
    pub updated: usize,
}

impl ReconcileOutcome {
    /// True when the pass issued no mutating calls.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0
    }
}

enum Planned {
    Create(Dependent),
    Update(Dependent),
    /// Delete-and-recreate for kinds whose managed fields the apiserver
    /// treats as immutable
    Recreate(Dependent),
}

/// Reconciles one `CSIDriverDeployment` key at a time.
///
/// Receives its collaborators at construction time — a cluster state store
/// and the image configuration — so tests can substitute an in-memory store.
pub struct Reconciler {
    store: Arc<dyn ClusterStore>,
    images: ImageConfig,
}

impl Reconciler {
    #[must_use]
    pub fn new(store: Arc<dyn ClusterStore>, images: ImageConfig) -> Self {
        Self { store, images }
    }

    /// Run one reconcile pass for a key.
    ///
    /// # Errors
    ///
    /// - [`Error::Store`] if the primary could not be read
    /// - [`Error::Builder`] if the desired state could not be built
    /// - [`Error::PartialApply`] if any create/update failed; the remaining
    ///   operations still ran, and the retry pass re-diffs everything from
    ///   fresh reads
    pub async fn reconcile(&self, key: &ReconcileKey) -> Result<ReconcileOutcome, Error> {
        debug!(%key, "Reconciling");

        // Fetch
        let Some(primary) = self.store.get_primary(key).await? else {
            info!(%key, "Primary gone, nothing to reconcile");
            return Ok(ReconcileOutcome::default());
        };

        // BuildDesired
        let desired = match build_desired_state(&primary, &self.images) {
            Ok(desired) => desired,
            Err(e) => {
                self.report_status(key, &primary, Some(&e)).await;
                return Err(e);
            }
        };

        // Diff: plan one operation (or none) per descriptor.
        let mut plan = Vec::new();
        for dep in desired.in_apply_order() {
            let observed = self
                .store
                .get(dep.kind(), &key.namespace, &dep.name())
                .await?;
            match observed {
                None => {
                    debug!(%key, kind = dep.kind().as_str(), name = %dep.name(), "Missing, will create");
                    plan.push(Planned::Create(dep.clone()));
                }
                Some(current) if drifted(dep, &current) => {
                    if dep.kind().recreate_on_drift() {
                        debug!(%key, kind = dep.kind().as_str(), name = %dep.name(), "Drifted, will recreate");
                        plan.push(Planned::Recreate(dep.clone()));
                    } else {
                        debug!(%key, kind = dep.kind().as_str(), name = %dep.name(), "Drifted, will update");
                        let mut updated = dep.clone();
                        updated.set_resource_version(current.resource_version());
                        plan.push(Planned::Update(updated));
                    }
                }
                Some(_) => {}
            }
        }

        // Apply, in order, collecting failures without aborting.
        let mut outcome = ReconcileOutcome::default();
        let mut failures = Vec::new();
        for op in plan {
            let (dep, result, counter) = match &op {
                Planned::Create(dep) => (
                    dep,
                    self.store.create(&key.namespace, dep).await,
                    &mut outcome.created,
                ),
                Planned::Update(dep) => (
                    dep,
                    self.store.update(&key.namespace, dep).await,
                    &mut outcome.updated,
                ),
                Planned::Recreate(dep) => {
                    let result = match self
                        .store
                        .delete(dep.kind(), &key.namespace, &dep.name())
                        .await
                    {
                        Ok(()) => self.store.create(&key.namespace, dep).await,
                        Err(e) => Err(e),
                    };
                    (dep, result, &mut outcome.updated)
                }
            };
            match result {
                Ok(()) => *counter += 1,
                Err(source) => {
                    warn!(%key, kind = dep.kind().as_str(), name = %dep.name(), error = %source, "Apply failed, continuing pass");
                    failures.push(ApplyFailure {
                        kind: dep.kind().as_str(),
                        name: dep.name(),
                        source,
                    });
                }
            }
        }

        // Outcome
        if failures.is_empty() {
            if outcome.is_noop() {
                debug!(%key, "In sync, nothing to do");
            } else {
                info!(%key, created = outcome.created, updated = outcome.updated, "Converged");
            }
            self.report_status(key, &primary, None).await;
            Ok(outcome)
        } else {
            let error = Error::PartialApply(failures);
            self.report_status(key, &primary, Some(&error)).await;
            Err(error)
        }
    }

    /// Best-effort status condition update; failures are logged, never
    /// propagated, so status reporting cannot wedge reconciliation.
    async fn report_status(
        &self,
        key: &ReconcileKey,
        primary: &CSIDriverDeployment,
        error: Option<&Error>,
    ) {
        let mut status = primary.status.clone().unwrap_or_default();
        status.observed_generation = primary.metadata.generation;

        match error {
            None => {
                set_condition(
                    &mut status,
                    create_condition(
                        CONDITION_AVAILABLE,
                        "True",
                        REASON_RECONCILE_SUCCEEDED,
                        "all dependents match the desired state",
                    ),
                );
                set_condition(
                    &mut status,
                    create_condition(
                        CONDITION_DEGRADED,
                        "False",
                        REASON_RECONCILE_SUCCEEDED,
                        "",
                    ),
                );
            }
            Some(e) => {
                let reason = if matches!(e, Error::Builder(_)) {
                    REASON_BUILD_FAILED
                } else {
                    REASON_APPLY_FAILED
                };
                set_condition(
                    &mut status,
                    create_condition(CONDITION_DEGRADED, "True", reason, &e.to_string()),
                );
            }
        }

        // Unchanged status is not re-patched; a drift-free pass stays
        // write-free end to end.
        if primary.status.as_ref() == Some(&status) {
            return;
        }
        if let Err(e) = self.store.patch_status(key, &status).await {
            warn!(%key, error = %e, "Status update failed, continuing");
        }
    }
}
