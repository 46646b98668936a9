// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the `CSIDriverDeployment` CRD

#[cfg(test)]
mod tests {
    use crate::crd::{
        CSIDriverDeployment, CSIDriverDeploymentSpec, CSIDriverDeploymentStatus, StorageClassConfig,
    };
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_identity() {
        let crd = CSIDriverDeployment::crd();
        assert_eq!(crd.spec.group, "castor.firestoned.io");
        assert_eq!(crd.spec.names.kind, "CSIDriverDeployment");
        assert_eq!(crd.spec.names.plural, "csidriverdeployments");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions[0].name, "v1alpha1");
    }

    #[test]
    fn test_crd_serves_a_status_subresource() {
        let crd = CSIDriverDeployment::crd();
        assert!(crd.spec.versions[0]
            .subresources
            .as_ref()
            .is_some_and(|s| s.status.is_some()));
    }

    #[test]
    fn test_spec_serializes_camel_case() {
        let spec = CSIDriverDeploymentSpec {
            driver_name: "csi.example.com".to_string(),
            images: None,
            storage_class: Some(StorageClassConfig {
                name: Some("fast".into()),
                default: true,
                reclaim_policy: Some("Retain".into()),
                parameters: None,
            }),
            node_selector: None,
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["driverName"], "csi.example.com");
        assert_eq!(json["storageClass"]["name"], "fast");
        assert_eq!(json["storageClass"]["default"], true);
        assert_eq!(json["storageClass"]["reclaimPolicy"], "Retain");
        // Unset optionals are omitted entirely.
        assert!(json.get("images").is_none());
        assert!(json.get("nodeSelector").is_none());
    }

    #[test]
    fn test_minimal_spec_deserializes() {
        let spec: CSIDriverDeploymentSpec =
            serde_json::from_value(serde_json::json!({ "driverName": "csi.example.com" }))
                .unwrap();
        assert_eq!(spec.driver_name, "csi.example.com");
        assert!(spec.images.is_none());
        assert!(spec.storage_class.is_none());
    }

    #[test]
    fn test_storage_class_default_flag_defaults_to_false() {
        let config: StorageClassConfig =
            serde_json::from_value(serde_json::json!({ "name": "fast" })).unwrap();
        assert!(!config.default);
    }

    #[test]
    fn test_status_round_trips() {
        let status: CSIDriverDeploymentStatus = serde_json::from_value(serde_json::json!({
            "conditions": [{
                "type": "Available",
                "status": "True",
                "reason": "ReconcileSucceeded",
            }],
            "observedGeneration": 3,
        }))
        .unwrap();

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].r#type, "Available");
        assert_eq!(status.observed_generation, Some(3));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["observedGeneration"], 3);
    }
}
