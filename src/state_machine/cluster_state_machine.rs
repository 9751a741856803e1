use chrono::Utc;
use tracing::debug;

use super::events::ClusterEvent;
use super::states::ClusterStatus;
use crate::error::{ProvisionerError, Result};
use crate::models::Cluster;

/// Transition table for cluster status.
///
/// Every status change made by the lifecycle service goes through
/// [`ClusterStateMachine::transition`]; nothing writes `status` directly.
pub struct ClusterStateMachine;

impl ClusterStateMachine {
    /// Determine the target status for an event, or reject the transition
    pub fn determine_target_state(
        current: ClusterStatus,
        event: &ClusterEvent,
    ) -> Result<ClusterStatus> {
        use ClusterEvent as E;
        use ClusterStatus as S;

        let target = match (current, event) {
            // Apply round
            (S::Requested, E::Provision) => S::Provisioning,
            (S::Provisioning, E::ProvisionSucceeded) => S::ProvisionSuccess,
            (S::Provisioning, E::ProvisionFailed(_)) => S::ProvisionFailed,

            // Destroy round; destroy_failed -> destroying is the retry edge
            (S::ProvisionSuccess, E::Destroy) => S::Destroying,
            (S::ProvisionFailed, E::Destroy) => S::Destroying,
            (S::DestroyFailed, E::Destroy) => S::Destroying,
            (S::Destroying, E::DestroySucceeded) => S::Destroyed,
            (S::Destroying, E::DestroyFailed(_)) => S::DestroyFailed,

            (from, event) => {
                return Err(ProvisionerError::StateTransitionError(format!(
                    "cannot apply '{}' to a cluster in status '{from}'",
                    event.event_type()
                )))
            }
        };

        Ok(target)
    }

    /// Apply an event to a record in memory. The caller persists the result
    /// inside its transaction.
    pub fn transition(cluster: &mut Cluster, event: ClusterEvent) -> Result<ClusterStatus> {
        let from = cluster.status;
        let target = Self::determine_target_state(from, &event)?;

        debug!(
            cluster_id = %cluster.id,
            from = %from,
            to = %target,
            event = event.event_type(),
            "Cluster status transition"
        );

        if let Some(message) = event.error_message() {
            cluster.message = Some(message.to_string());
        }
        if matches!(event, ClusterEvent::DestroyFailed(_)) {
            cluster.destroy_attempts += 1;
        }
        cluster.status = target;
        cluster.updated_at = Utc::now();

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_event() -> impl Strategy<Value = ClusterEvent> {
        prop_oneof![
            Just(ClusterEvent::Provision),
            Just(ClusterEvent::ProvisionSucceeded),
            "[a-z ]{0,12}".prop_map(ClusterEvent::ProvisionFailed),
            Just(ClusterEvent::Destroy),
            Just(ClusterEvent::DestroySucceeded),
            "[a-z ]{0,12}".prop_map(ClusterEvent::DestroyFailed),
        ]
    }

    fn any_status() -> impl Strategy<Value = ClusterStatus> {
        prop::sample::select(ClusterStatus::ALL.to_vec())
    }

    #[test]
    fn test_apply_round() {
        assert_eq!(
            ClusterStateMachine::determine_target_state(
                ClusterStatus::Requested,
                &ClusterEvent::Provision
            )
            .unwrap(),
            ClusterStatus::Provisioning
        );
        assert_eq!(
            ClusterStateMachine::determine_target_state(
                ClusterStatus::Provisioning,
                &ClusterEvent::ProvisionSucceeded
            )
            .unwrap(),
            ClusterStatus::ProvisionSuccess
        );
        assert_eq!(
            ClusterStateMachine::determine_target_state(
                ClusterStatus::Provisioning,
                &ClusterEvent::fail_provision("boom")
            )
            .unwrap(),
            ClusterStatus::ProvisionFailed
        );
    }

    #[test]
    fn test_destroy_round_and_retry() {
        for from in [
            ClusterStatus::ProvisionSuccess,
            ClusterStatus::ProvisionFailed,
            ClusterStatus::DestroyFailed,
        ] {
            assert_eq!(
                ClusterStateMachine::determine_target_state(from, &ClusterEvent::Destroy).unwrap(),
                ClusterStatus::Destroying
            );
        }
        assert_eq!(
            ClusterStateMachine::determine_target_state(
                ClusterStatus::Destroying,
                &ClusterEvent::DestroySucceeded
            )
            .unwrap(),
            ClusterStatus::Destroyed
        );
    }

    #[test]
    fn test_invalid_transitions() {
        // Cannot skip the in-progress state
        assert!(ClusterStateMachine::determine_target_state(
            ClusterStatus::Requested,
            &ClusterEvent::ProvisionSucceeded
        )
        .is_err());
        // Cannot destroy while an apply is running
        assert!(ClusterStateMachine::determine_target_state(
            ClusterStatus::Provisioning,
            &ClusterEvent::Destroy
        )
        .is_err());
        // Destroyed is final
        assert!(ClusterStateMachine::determine_target_state(
            ClusterStatus::Destroyed,
            &ClusterEvent::Destroy
        )
        .is_err());
    }

    proptest! {
        #[test]
        fn terminal_outcomes_only_follow_in_progress(status in any_status(), event in any_event()) {
            if let Ok(target) = ClusterStateMachine::determine_target_state(status, &event) {
                match target {
                    ClusterStatus::ProvisionSuccess | ClusterStatus::ProvisionFailed => {
                        prop_assert_eq!(status, ClusterStatus::Provisioning);
                    }
                    ClusterStatus::Destroyed => {
                        prop_assert_eq!(status, ClusterStatus::Destroying);
                    }
                    ClusterStatus::DestroyFailed => {
                        prop_assert_eq!(status, ClusterStatus::Destroying);
                    }
                    ClusterStatus::Requested => prop_assert!(false, "nothing transitions back to requested"),
                    ClusterStatus::Provisioning | ClusterStatus::Destroying => {
                        prop_assert!(!status.is_transient());
                    }
                }
            }
        }
    }
}
