// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for status condition handling

#[cfg(test)]
mod tests {
    use crate::crd::CSIDriverDeploymentStatus;
    use crate::status::{
        create_condition, set_condition, CONDITION_AVAILABLE, CONDITION_DEGRADED,
        REASON_APPLY_FAILED, REASON_RECONCILE_SUCCEEDED,
    };

    #[test]
    fn test_create_condition_fields() {
        let condition = create_condition(
            CONDITION_AVAILABLE,
            "True",
            REASON_RECONCILE_SUCCEEDED,
            "all dependents match the desired state",
        );
        assert_eq!(condition.r#type, "Available");
        assert_eq!(condition.status, "True");
        assert_eq!(condition.reason.as_deref(), Some("ReconcileSucceeded"));
        assert!(condition.last_transition_time.is_some());
    }

    #[test]
    fn test_set_condition_inserts_new_types() {
        let mut status = CSIDriverDeploymentStatus::default();
        set_condition(
            &mut status,
            create_condition(CONDITION_AVAILABLE, "True", REASON_RECONCILE_SUCCEEDED, ""),
        );
        set_condition(
            &mut status,
            create_condition(CONDITION_DEGRADED, "False", REASON_RECONCILE_SUCCEEDED, ""),
        );
        assert_eq!(status.conditions.len(), 2);
    }

    #[test]
    fn test_set_condition_replaces_by_type() {
        let mut status = CSIDriverDeploymentStatus::default();
        set_condition(
            &mut status,
            create_condition(CONDITION_DEGRADED, "False", REASON_RECONCILE_SUCCEEDED, ""),
        );
        set_condition(
            &mut status,
            create_condition(CONDITION_DEGRADED, "True", REASON_APPLY_FAILED, "boom"),
        );

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, "True");
        assert_eq!(status.conditions[0].reason.as_deref(), Some("ApplyFailed"));
    }

    #[test]
    fn test_transition_time_is_preserved_when_status_value_is_unchanged() {
        let mut status = CSIDriverDeploymentStatus::default();
        let mut first =
            create_condition(CONDITION_AVAILABLE, "True", REASON_RECONCILE_SUCCEEDED, "");
        first.last_transition_time = Some("2026-01-01T00:00:00+00:00".to_string());
        set_condition(&mut status, first);

        set_condition(
            &mut status,
            create_condition(CONDITION_AVAILABLE, "True", REASON_RECONCILE_SUCCEEDED, ""),
        );

        assert_eq!(
            status.conditions[0].last_transition_time.as_deref(),
            Some("2026-01-01T00:00:00+00:00"),
        );
    }

    #[test]
    fn test_transition_time_moves_when_status_value_changes() {
        let mut status = CSIDriverDeploymentStatus::default();
        let mut first =
            create_condition(CONDITION_DEGRADED, "False", REASON_RECONCILE_SUCCEEDED, "");
        first.last_transition_time = Some("2026-01-01T00:00:00+00:00".to_string());
        set_condition(&mut status, first);

        set_condition(
            &mut status,
            create_condition(CONDITION_DEGRADED, "True", REASON_APPLY_FAILED, "boom"),
        );

        assert_ne!(
            status.conditions[0].last_transition_time.as_deref(),
            Some("2026-01-01T00:00:00+00:00"),
        );
    }

    #[test]
    fn test_repeated_success_produces_identical_status() {
        // The reconciler skips the status patch when nothing changed, which
        // only works if two consecutive success reports compare equal.
        let mut status = CSIDriverDeploymentStatus::default();
        set_condition(
            &mut status,
            create_condition(CONDITION_AVAILABLE, "True", REASON_RECONCILE_SUCCEEDED, "ok"),
        );

        let mut repeated = status.clone();
        set_condition(
            &mut repeated,
            create_condition(CONDITION_AVAILABLE, "True", REASON_RECONCILE_SUCCEEDED, "ok"),
        );

        assert_eq!(status, repeated);
    }
}
