// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for watch event to key mapping

#[cfg(test)]
mod tests {
    use crate::constants::{API_GROUP_VERSION, KIND_CSI_DRIVER_DEPLOYMENT};
    use crate::crd::{CSIDriverDeployment, CSIDriverDeploymentSpec};
    use crate::dispatcher::{owner_key, primary_key};
    use crate::labels::CASTOR_OWNER_NAMESPACE_LABEL;
    use crate::store::ReconcileKey;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
    use std::collections::BTreeMap;

    fn owned_meta(namespace: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some("csi-sample-controller".into()),
            namespace: namespace.map(Into::into),
            owner_references: Some(vec![OwnerReference {
                api_version: API_GROUP_VERSION.to_string(),
                kind: KIND_CSI_DRIVER_DEPLOYMENT.to_string(),
                name: "csi-sample".to_string(),
                uid: "uid-1234".to_string(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn test_owned_object_maps_to_its_primary() {
        let key = owner_key(&owned_meta(Some("storage")));
        assert_eq!(key, Some(ReconcileKey::new("storage", "csi-sample")));
    }

    #[test]
    fn test_object_without_owner_references_is_discarded() {
        let meta = ObjectMeta {
            name: Some("unrelated".into()),
            namespace: Some("storage".into()),
            ..Default::default()
        };
        assert_eq!(owner_key(&meta), None);
    }

    #[test]
    fn test_non_controller_reference_is_discarded() {
        let mut meta = owned_meta(Some("storage"));
        meta.owner_references.as_mut().unwrap()[0].controller = Some(false);
        assert_eq!(owner_key(&meta), None);
    }

    #[test]
    fn test_foreign_kind_is_discarded() {
        let mut meta = owned_meta(Some("storage"));
        meta.owner_references.as_mut().unwrap()[0].kind = "Deployment".to_string();
        assert_eq!(owner_key(&meta), None);
    }

    #[test]
    fn test_foreign_api_group_is_discarded() {
        let mut meta = owned_meta(Some("storage"));
        meta.owner_references.as_mut().unwrap()[0].api_version = "apps/v1".to_string();
        assert_eq!(owner_key(&meta), None);
    }

    #[test]
    fn test_cluster_scoped_object_uses_the_owner_namespace_label() {
        let mut meta = owned_meta(None);
        meta.labels = Some(BTreeMap::from([(
            CASTOR_OWNER_NAMESPACE_LABEL.to_string(),
            "storage".to_string(),
        )]));

        let key = owner_key(&meta);
        assert_eq!(key, Some(ReconcileKey::new("storage", "csi-sample")));
    }

    #[test]
    fn test_cluster_scoped_object_without_the_label_is_discarded() {
        assert_eq!(owner_key(&owned_meta(None)), None);
    }

    #[test]
    fn test_primary_event_maps_to_its_own_key() {
        let primary = CSIDriverDeployment {
            metadata: ObjectMeta {
                name: Some("csi-sample".into()),
                namespace: Some("storage".into()),
                ..Default::default()
            },
            spec: CSIDriverDeploymentSpec {
                driver_name: "csi.example.com".to_string(),
                images: None,
                storage_class: None,
                node_selector: None,
            },
            status: None,
        };
        assert_eq!(
            primary_key(&primary),
            Some(ReconcileKey::new("storage", "csi-sample")),
        );
    }
}
