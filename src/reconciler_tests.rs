// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the reconcile state machine, against the in-memory store

#[cfg(test)]
mod tests {
    use crate::config::ImageConfig;
    use crate::crd::{CSIDriverDeployment, CSIDriverDeploymentSpec, StorageClassConfig};
    use crate::error::{ApplyFailure, Error, StoreError};
    use crate::reconciler::Reconciler;
    use crate::status::{CONDITION_AVAILABLE, CONDITION_DEGRADED, REASON_BUILD_FAILED};
    use crate::store::{Dependent, DependentKind, ReconcileKey};
    use crate::store_fake::FakeStore;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn test_primary(name: &str) -> CSIDriverDeployment {
        CSIDriverDeployment {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("storage".into()),
                uid: Some("uid-1234".into()),
                generation: Some(1),
                ..Default::default()
            },
            spec: CSIDriverDeploymentSpec {
                driver_name: "csi.example.com".to_string(),
                images: None,
                storage_class: Some(StorageClassConfig {
                    name: Some("fast".into()),
                    ..Default::default()
                }),
                node_selector: None,
            },
            status: None,
        }
    }

    fn test_images() -> ImageConfig {
        ImageConfig {
            driver: Some("registry.example.com/csi-driver:v1.0.0".into()),
            ..Default::default()
        }
    }

    fn setup(name: &str) -> (Arc<FakeStore>, Reconciler, ReconcileKey) {
        let store = Arc::new(FakeStore::new());
        let key = ReconcileKey::new("storage", name);
        store.put_primary(key.clone(), test_primary(name));
        let reconciler = Reconciler::new(store.clone(), test_images());
        (store, reconciler, key)
    }

    #[tokio::test]
    async fn test_first_pass_creates_the_full_dependent_set() {
        let (store, reconciler, key) = setup("csi-sample");

        let outcome = reconciler.reconcile(&key).await.unwrap();
        assert_eq!(outcome.created, 7);
        assert_eq!(outcome.updated, 0);
        assert_eq!(store.dependent_count(), 7);
        assert_eq!(store.write_count(), 7);

        assert!(store
            .dependent(DependentKind::StatefulSet, "storage", "csi-sample-controller")
            .is_some());
        assert!(store
            .dependent(DependentKind::DaemonSet, "storage", "csi-sample-node")
            .is_some());
        assert!(store
            .dependent(DependentKind::StorageClass, "", "fast")
            .is_some());
    }

    #[tokio::test]
    async fn test_second_pass_is_write_free() {
        let (store, reconciler, key) = setup("csi-sample");

        reconciler.reconcile(&key).await.unwrap();
        let writes = store.write_count();
        let status_writes = store.status_write_count();

        let outcome = reconciler.reconcile(&key).await.unwrap();
        assert!(outcome.is_noop());
        assert_eq!(store.write_count(), writes);
        assert_eq!(store.status_write_count(), status_writes);
    }

    #[tokio::test]
    async fn test_externally_deleted_dependent_is_recreated() {
        let (store, reconciler, key) = setup("csi-sample");
        reconciler.reconcile(&key).await.unwrap();

        store.remove_dependent(DependentKind::StorageClass, "", "fast");

        let outcome = reconciler.reconcile(&key).await.unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.updated, 0);
        assert_eq!(store.dependent_count(), 7);
    }

    #[tokio::test]
    async fn test_spec_change_updates_only_the_affected_dependent() {
        let (store, reconciler, key) = setup("csi-sample");
        reconciler.reconcile(&key).await.unwrap();

        let mut changed = test_primary("csi-sample");
        changed.metadata.generation = Some(2);
        changed.spec.node_selector = Some(BTreeMap::from([(
            "node-role.kubernetes.io/worker".to_string(),
            String::new(),
        )]));
        store.put_primary(key.clone(), changed);

        let outcome = reconciler.reconcile(&key).await.unwrap();
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.updated, 1);
        assert_eq!(store.write_count(), 8);

        let status = store.status(&key).unwrap();
        assert_eq!(status.observed_generation, Some(2));
    }

    #[tokio::test]
    async fn test_unmarking_the_default_class_is_healed() {
        let store = Arc::new(FakeStore::new());
        let key = ReconcileKey::new("storage", "csi-sample");
        let mut primary = test_primary("csi-sample");
        if let Some(sc) = primary.spec.storage_class.as_mut() {
            sc.default = true;
        }
        store.put_primary(key.clone(), primary);
        let reconciler = Reconciler::new(store.clone(), test_images());

        reconciler.reconcile(&key).await.unwrap();
        let created = store
            .dependent(DependentKind::StorageClass, "", "fast")
            .unwrap();
        assert!(created.meta().annotations.is_some());

        // The class is demoted: the next pass must clear the annotation.
        let mut demoted = test_primary("csi-sample");
        demoted.metadata.generation = Some(2);
        store.put_primary(key.clone(), demoted);

        let outcome = reconciler.reconcile(&key).await.unwrap();
        assert_eq!(outcome.updated, 1);

        let healed = store
            .dependent(DependentKind::StorageClass, "", "fast")
            .unwrap();
        assert!(healed.meta().annotations.is_none());
        assert_eq!(store.dependent_count(), 7);
    }

    #[tokio::test]
    async fn test_storage_class_drift_is_healed_by_recreate() {
        // Provisioner, parameters, and reclaim policy are immutable
        // server-side, so an in-place replace cannot converge this drift.
        let (store, reconciler, key) = setup("csi-sample");
        reconciler.reconcile(&key).await.unwrap();

        let mut changed = test_primary("csi-sample");
        changed.metadata.generation = Some(2);
        if let Some(sc) = changed.spec.storage_class.as_mut() {
            sc.parameters = Some(BTreeMap::from([(
                "thinProvisioning".to_string(),
                "true".to_string(),
            )]));
        }
        store.put_primary(key.clone(), changed);

        let outcome = reconciler.reconcile(&key).await.unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(store.dependent_count(), 7);

        let healed = store
            .dependent(DependentKind::StorageClass, "", "fast")
            .unwrap();
        let Dependent::StorageClass(sc) = healed else {
            panic!("expected a StorageClass");
        };
        assert_eq!(
            sc.parameters
                .as_ref()
                .and_then(|p| p.get("thinProvisioning"))
                .map(String::as_str),
            Some("true"),
        );
    }

    #[tokio::test]
    async fn test_deleted_primary_is_terminal_success() {
        let store = Arc::new(FakeStore::new());
        let reconciler = Reconciler::new(store.clone(), test_images());
        let key = ReconcileKey::new("storage", "never-existed");

        let outcome = reconciler.reconcile(&key).await.unwrap();
        assert!(outcome.is_noop());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_dependents_survive_primary_deletion() {
        // Cleanup is owner-reference garbage collection; the controller
        // itself must not delete anything.
        let (store, reconciler, key) = setup("csi-sample");
        reconciler.reconcile(&key).await.unwrap();

        store.remove_primary(&key);
        let outcome = reconciler.reconcile(&key).await.unwrap();
        assert!(outcome.is_noop());
        assert_eq!(store.dependent_count(), 7);
    }

    #[tokio::test]
    async fn test_one_failing_write_does_not_abort_the_pass() {
        let (store, reconciler, key) = setup("csi-sample");
        store.fail_writes_to("csi-sample-controller");

        let err = reconciler.reconcile(&key).await.unwrap_err();
        let Error::PartialApply(failures) = &err else {
            panic!("expected PartialApply, got {err}");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, "StatefulSet");
        assert_eq!(failures[0].name, "csi-sample-controller");

        // The other six dependents were still applied.
        assert_eq!(store.dependent_count(), 6);

        store.heal();
        let outcome = reconciler.reconcile(&key).await.unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(store.dependent_count(), 7);
    }

    #[tokio::test]
    async fn test_success_reports_available_condition() {
        let (store, reconciler, key) = setup("csi-sample");
        reconciler.reconcile(&key).await.unwrap();

        let status = store.status(&key).unwrap();
        let available = status
            .conditions
            .iter()
            .find(|c| c.r#type == CONDITION_AVAILABLE)
            .unwrap();
        assert_eq!(available.status, "True");
        let degraded = status
            .conditions
            .iter()
            .find(|c| c.r#type == CONDITION_DEGRADED)
            .unwrap();
        assert_eq!(degraded.status, "False");
        assert_eq!(status.observed_generation, Some(1));
    }

    #[tokio::test]
    async fn test_apply_failure_reports_degraded_condition() {
        let (store, reconciler, key) = setup("csi-sample");
        store.fail_writes_to("csi-sample-node");

        reconciler.reconcile(&key).await.unwrap_err();

        let status = store.status(&key).unwrap();
        let degraded = status
            .conditions
            .iter()
            .find(|c| c.r#type == CONDITION_DEGRADED)
            .unwrap();
        assert_eq!(degraded.status, "True");
        assert!(degraded
            .message
            .as_deref()
            .unwrap_or_default()
            .contains("csi-sample-node"));
    }

    #[tokio::test]
    async fn test_unbuildable_spec_reports_degraded_condition() {
        let store = Arc::new(FakeStore::new());
        let key = ReconcileKey::new("storage", "csi-sample");
        store.put_primary(key.clone(), test_primary("csi-sample"));
        // No driver image anywhere: builder must reject the spec.
        let reconciler = Reconciler::new(store.clone(), ImageConfig::default());

        let err = reconciler.reconcile(&key).await.unwrap_err();
        assert!(matches!(err, Error::Builder(_)));
        assert_eq!(store.write_count(), 0);

        let status = store.status(&key).unwrap();
        let degraded = status
            .conditions
            .iter()
            .find(|c| c.r#type == CONDITION_DEGRADED)
            .unwrap();
        assert_eq!(degraded.status, "True");
        assert_eq!(degraded.reason.as_deref(), Some(REASON_BUILD_FAILED));
    }

    #[tokio::test]
    async fn test_conflicting_update_surfaces_as_conflict() {
        let (store, reconciler, key) = setup("csi-sample");
        reconciler.reconcile(&key).await.unwrap();

        // Stale resourceVersion loses the compare-and-swap.
        let mut stale = store
            .dependent(DependentKind::StatefulSet, "storage", "csi-sample-controller")
            .unwrap();
        stale.set_resource_version(Some("0".into()));
        let err = crate::store::ClusterStore::update(store.as_ref(), "storage", &stale)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_conflict_only_classification() {
        let conflicts = Error::PartialApply(vec![ApplyFailure {
            kind: "StatefulSet",
            name: "csi-sample-controller".to_string(),
            source: StoreError::Conflict,
        }]);
        assert!(conflicts.is_conflict_only());

        let mixed = Error::PartialApply(vec![
            ApplyFailure {
                kind: "StatefulSet",
                name: "csi-sample-controller".to_string(),
                source: StoreError::Conflict,
            },
            ApplyFailure {
                kind: "DaemonSet",
                name: "csi-sample-node".to_string(),
                source: StoreError::Transient("apiserver unavailable".to_string()),
            },
        ]);
        assert!(!mixed.is_conflict_only());

        assert!(Error::Store(StoreError::Conflict).is_conflict_only());
        assert!(!Error::Builder("no driver image".to_string()).is_conflict_only());
    }
}
