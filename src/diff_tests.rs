// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for drift detection

#[cfg(test)]
mod tests {
    use crate::config::ImageConfig;
    use crate::crd::{
        CSIDriverDeployment, CSIDriverDeploymentSpec, StorageClassConfig,
    };
    use crate::diff::{drifted, value_subset};
    use crate::resources::{
        build_controller_service_account, build_controller_statefulset, build_node_role_binding,
        build_storage_class,
    };
    use crate::store::Dependent;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn test_primary() -> CSIDriverDeployment {
        CSIDriverDeployment {
            metadata: ObjectMeta {
                name: Some("csi-sample".into()),
                namespace: Some("storage".into()),
                uid: Some("uid-1234".into()),
                ..Default::default()
            },
            spec: CSIDriverDeploymentSpec {
                driver_name: "csi.example.com".to_string(),
                images: None,
                storage_class: Some(StorageClassConfig {
                    name: Some("fast".into()),
                    default: false,
                    reclaim_policy: None,
                    parameters: Some(BTreeMap::from([(
                        "thinProvisioning".to_string(),
                        "true".to_string(),
                    )])),
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

    #[test]
    fn test_null_desired_matches_anything() {
        assert!(value_subset(&json!(null), &json!({"a": 1})));
        assert!(value_subset(&json!(null), &json!(42)));
        assert!(value_subset(&json!(null), &json!(null)));
    }

    #[test]
    fn test_object_subset_ignores_extra_observed_entries() {
        let desired = json!({"replicas": 1});
        let observed = json!({"replicas": 1, "revisionHistoryLimit": 10});
        assert!(value_subset(&desired, &observed));
    }

    #[test]
    fn test_object_subset_requires_every_desired_entry() {
        let desired = json!({"replicas": 1, "serviceName": "x"});
        let observed = json!({"replicas": 1});
        assert!(!value_subset(&desired, &observed));
    }

    #[test]
    fn test_object_subset_recurses() {
        let desired = json!({"spec": {"template": {"labels": {"app": "csi"}}}});
        let observed =
            json!({"spec": {"template": {"labels": {"app": "csi", "extra": "x"}}, "serverSet": 1}});
        assert!(value_subset(&desired, &observed));

        let observed = json!({"spec": {"template": {"labels": {"app": "other"}}}});
        assert!(!value_subset(&desired, &observed));
    }

    #[test]
    fn test_array_comparison_is_ordered_and_length_sensitive() {
        assert!(value_subset(&json!([1, 2]), &json!([1, 2])));
        assert!(!value_subset(&json!([1, 2]), &json!([2, 1])));
        assert!(!value_subset(&json!([1]), &json!([1, 2])));
        assert!(!value_subset(&json!([1, 2]), &json!([1])));
    }

    #[test]
    fn test_scalar_mismatch() {
        assert!(!value_subset(&json!(1), &json!(2)));
        assert!(!value_subset(&json!("a"), &json!("b")));
        assert!(value_subset(&json!(true), &json!(true)));
    }

    #[test]
    fn test_identical_builds_never_drift() {
        let primary = test_primary();
        let images = test_images().resolve(None).unwrap();

        let a = Dependent::StatefulSet(build_controller_statefulset(&primary, &images));
        let b = Dependent::StatefulSet(build_controller_statefulset(&primary, &images));
        assert!(!drifted(&a, &b));
    }

    #[test]
    fn test_external_labels_and_metadata_do_not_drift() {
        let primary = test_primary();
        let images = test_images().resolve(None).unwrap();

        let desired = build_controller_statefulset(&primary, &images);
        let mut observed = desired.clone();
        observed.metadata.resource_version = Some("42".into());
        observed
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("external-team-label".into(), "x".into());

        assert!(!drifted(
            &Dependent::StatefulSet(desired),
            &Dependent::StatefulSet(observed),
        ));
    }

    #[test]
    fn test_replica_edit_drifts() {
        let primary = test_primary();
        let images = test_images().resolve(None).unwrap();

        let desired = build_controller_statefulset(&primary, &images);
        let mut observed = desired.clone();
        if let Some(spec) = observed.spec.as_mut() {
            spec.replicas = Some(3);
        }

        assert!(drifted(
            &Dependent::StatefulSet(desired),
            &Dependent::StatefulSet(observed),
        ));
    }

    #[test]
    fn test_storage_class_parameter_edit_drifts() {
        let primary = test_primary();

        let desired = build_storage_class(&primary);
        let mut observed = desired.clone();
        observed.parameters = Some(BTreeMap::from([(
            "thinProvisioning".to_string(),
            "false".to_string(),
        )]));

        assert!(drifted(
            &Dependent::StorageClass(desired),
            &Dependent::StorageClass(observed),
        ));
    }

    #[test]
    fn test_missing_default_class_annotation_drifts() {
        let mut primary = test_primary();
        if let Some(sc) = primary.spec.storage_class.as_mut() {
            sc.default = true;
        }

        let desired = build_storage_class(&primary);
        let mut observed = desired.clone();
        observed.metadata.annotations = None;

        assert!(drifted(
            &Dependent::StorageClass(desired),
            &Dependent::StorageClass(observed),
        ));
    }

    #[test]
    fn test_stale_default_class_annotation_drifts() {
        // Spec says not-default, cluster still carries the annotation: the
        // class must drift so the flag gets cleared.
        let primary = test_primary();

        let desired = build_storage_class(&primary);
        assert!(desired.metadata.annotations.is_none());

        let mut observed = desired.clone();
        observed.metadata.annotations = Some(BTreeMap::from([(
            crate::labels::DEFAULT_STORAGE_CLASS_ANNOTATION.to_string(),
            "true".to_string(),
        )]));

        assert!(drifted(
            &Dependent::StorageClass(desired),
            &Dependent::StorageClass(observed),
        ));
    }

    #[test]
    fn test_role_binding_subject_edit_drifts() {
        let primary = test_primary();

        let desired = build_node_role_binding(&primary);
        let mut observed = desired.clone();
        if let Some(subjects) = observed.subjects.as_mut() {
            subjects[0].name = "someone-else".to_string();
        }

        assert!(drifted(
            &Dependent::RoleBinding(desired),
            &Dependent::RoleBinding(observed),
        ));
    }

    #[test]
    fn test_service_accounts_never_drift() {
        let primary = test_primary();

        let desired = build_controller_service_account(&primary);
        let mut observed = desired.clone();
        observed.automount_service_account_token = Some(false);
        observed.metadata.labels = None;

        assert!(!drifted(
            &Dependent::ServiceAccount(desired),
            &Dependent::ServiceAccount(observed),
        ));
    }
}
