//! Preemption request workflow
//!
//! The holder of a lower-priority reservation answers each request once.
//! Accepting cancels the holder's reservation and approves the requesting
//! one; declining leaves both untouched for an administrator to resolve.

use chrono::{DateTime, Utc};
use gpuslot_core::{
    Actor, GpuslotError, GpuslotResult, PreemptionDecision, PreemptionRequest, PreemptionStatus,
    Reservation, ReservationRepository, ReservationStatus,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::lifecycle::ReservationLifecycle;

/// State after a response has been applied
#[derive(Debug, Clone, Serialize)]
pub struct PreemptionOutcome {
    pub request: PreemptionRequest,
    /// Requesting reservation, when it changed
    pub requesting: Option<Reservation>,
    /// Target reservation, when it changed
    pub target: Option<Reservation>,
}

pub struct PreemptionWorkflow {
    repository: Arc<dyn ReservationRepository>,
    lifecycle: ReservationLifecycle,
}

impl PreemptionWorkflow {
    pub fn new(repository: Arc<dyn ReservationRepository>) -> Self {
        Self {
            lifecycle: ReservationLifecycle::new(repository.clone()),
            repository,
        }
    }

    /// Pending, unexpired requests addressed to `user_id`, newest first
    pub async fn pending_for(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> GpuslotResult<Vec<PreemptionRequest>> {
        let mut requests: Vec<PreemptionRequest> = self
            .repository
            .list_pending_preemption_requests(user_id)
            .await?
            .into_iter()
            .filter(|r| r.status == PreemptionStatus::Pending && r.target_user_id == user_id)
            .filter(|r| !r.is_expired(now))
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    /// Apply the target holder's `decision` to request `id`
    pub async fn respond(
        &self,
        id: Uuid,
        decision: PreemptionDecision,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> GpuslotResult<PreemptionOutcome> {
        let request = self
            .repository
            .get_preemption_request(id)
            .await?
            .ok_or_else(|| GpuslotError::preemption_not_found(id))?;

        if !actor.is_privileged() && actor.user_id != request.target_user_id {
            return Err(GpuslotError::Forbidden(format!(
                "preemption request {} is addressed to {}",
                id, request.target_user_id
            )));
        }
        if request.status != PreemptionStatus::Pending {
            return Err(GpuslotError::AlreadyResolved(format!(
                "{} is already {}",
                id, request.status
            )));
        }
        if request.is_expired(now) {
            return Err(GpuslotError::Expired(format!(
                "{} expired at {}",
                id,
                request.expires_at.to_rfc3339()
            )));
        }

        match decision {
            PreemptionDecision::Declined => self.decline(request).await,
            PreemptionDecision::Accepted => self.accept(request, now).await,
        }
    }

    async fn decline(&self, request: PreemptionRequest) -> GpuslotResult<PreemptionOutcome> {
        let request = self
            .repository
            .update_preemption_request_status(
                request.id,
                PreemptionStatus::Pending,
                PreemptionStatus::Declined,
            )
            .await?;

        info!(
            preemption_id = %request.id,
            requesting = %request.requesting_reservation_id,
            target = %request.target_reservation_id,
            "Preemption declined, left for administrator resolution"
        );

        Ok(PreemptionOutcome {
            request,
            requesting: None,
            target: None,
        })
    }

    async fn accept(
        &self,
        request: PreemptionRequest,
        now: DateTime<Utc>,
    ) -> GpuslotResult<PreemptionOutcome> {
        let requesting = self
            .repository
            .get_reservation(request.requesting_reservation_id)
            .await?
            .ok_or_else(|| GpuslotError::reservation_not_found(request.requesting_reservation_id))?;
        let target = self
            .repository
            .get_reservation(request.target_reservation_id)
            .await?
            .ok_or_else(|| GpuslotError::reservation_not_found(request.target_reservation_id))?;

        if !matches!(
            requesting.status,
            ReservationStatus::Pending | ReservationStatus::Approved
        ) {
            return Err(GpuslotError::Conflict(format!(
                "requesting reservation {} is {}",
                requesting.id, requesting.status
            )));
        }

        // Claim the request first; a concurrent response loses here.
        let claimed = self
            .repository
            .update_preemption_request_status(
                request.id,
                PreemptionStatus::Pending,
                PreemptionStatus::Accepted,
            )
            .await?;

        let system = Actor::system();

        let cancelled_target = if target.status.can_transition_to(ReservationStatus::Cancelled) {
            let reason = format!("yielded to reservation {}", requesting.id);
            match self
                .lifecycle
                .cancel(target.id, &system, Some(reason), now)
                .await
            {
                Ok(updated) => Some(updated),
                Err(e) => {
                    self.release_claim(&claimed).await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        let approved_requesting = if requesting.status == ReservationStatus::Pending {
            let reason = format!(
                "approved after {} yielded reservation {}",
                target.requester_id, target.id
            );
            match self
                .lifecycle
                .transition(
                    requesting.id,
                    ReservationStatus::Approved,
                    &system,
                    Some(reason),
                    now,
                )
                .await
            {
                Ok(updated) => Some(updated),
                Err(e) => {
                    if let Some(cancelled) = &cancelled_target {
                        self.restore_target(cancelled, &target, now).await;
                    }
                    self.release_claim(&claimed).await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!(
            preemption_id = %claimed.id,
            requesting = %requesting.id,
            target = %target.id,
            target_cancelled = cancelled_target.is_some(),
            "Preemption accepted"
        );

        Ok(PreemptionOutcome {
            request: claimed,
            requesting: approved_requesting,
            target: cancelled_target,
        })
    }

    /// Put an accepted request back to pending after a failed side effect
    async fn release_claim(&self, claimed: &PreemptionRequest) {
        if let Err(e) = self
            .repository
            .update_preemption_request_status(
                claimed.id,
                PreemptionStatus::Accepted,
                PreemptionStatus::Pending,
            )
            .await
        {
            warn!(preemption_id = %claimed.id, error = %e, "Failed to release preemption claim");
        }
    }

    /// Undo a target cancellation; bypasses the lifecycle edges
    async fn restore_target(
        &self,
        cancelled: &Reservation,
        original: &Reservation,
        now: DateTime<Utc>,
    ) {
        if let Err(e) = self
            .repository
            .update_reservation_status(
                cancelled.id,
                ReservationStatus::Cancelled,
                original.status,
                original.decision_reason.clone(),
                now,
            )
            .await
        {
            warn!(reservation_id = %cancelled.id, error = %e, "Failed to restore reservation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionEngine;
    use crate::testing::{at, high_priority_factors, now, request_with, store_reservation};
    use gpuslot_core::{AdmissionConfig, ResourceCatalog};
    use gpuslot_store::InMemoryRepository;

    async fn contested_slot(
        repo: &Arc<InMemoryRepository>,
    ) -> (Reservation, Reservation, PreemptionRequest) {
        let target = store_reservation(repo, "bob", "A100", at(10), at(14), 40.0).await;
        let engine = AdmissionEngine::new(
            repo.clone(),
            ResourceCatalog::default(),
            AdmissionConfig::default(),
        );
        let result = engine
            .admit_at(
                request_with("alice", "A100", at(12), at(16), high_priority_factors()),
                now(),
            )
            .await
            .unwrap();
        let preemption = result.preemptions_created[0].clone();
        (result.reservation, target, preemption)
    }

    #[tokio::test]
    async fn test_accept_cancels_target_and_approves_requesting() {
        let repo = Arc::new(InMemoryRepository::new());
        let (requesting, target, preemption) = contested_slot(&repo).await;
        let workflow = PreemptionWorkflow::new(repo.clone());

        let outcome = workflow
            .respond(
                preemption.id,
                PreemptionDecision::Accepted,
                &Actor::requester("bob"),
                now(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.request.status, PreemptionStatus::Accepted);
        let target = repo.get_reservation(target.id).await.unwrap().unwrap();
        let requesting = repo.get_reservation(requesting.id).await.unwrap().unwrap();
        assert_eq!(target.status, ReservationStatus::Cancelled);
        assert_eq!(requesting.status, ReservationStatus::Approved);
    }

    #[tokio::test]
    async fn test_decline_leaves_reservations() {
        let repo = Arc::new(InMemoryRepository::new());
        let (requesting, target, preemption) = contested_slot(&repo).await;
        let workflow = PreemptionWorkflow::new(repo.clone());

        let outcome = workflow
            .respond(
                preemption.id,
                PreemptionDecision::Declined,
                &Actor::requester("bob"),
                now(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.request.status, PreemptionStatus::Declined);
        assert!(outcome.target.is_none());
        let target = repo.get_reservation(target.id).await.unwrap().unwrap();
        let requesting = repo.get_reservation(requesting.id).await.unwrap().unwrap();
        assert_eq!(target.status, ReservationStatus::Pending);
        assert_eq!(requesting.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_response_is_already_resolved() {
        let repo = Arc::new(InMemoryRepository::new());
        let (_, _, preemption) = contested_slot(&repo).await;
        let workflow = PreemptionWorkflow::new(repo);
        let bob = Actor::requester("bob");

        workflow
            .respond(preemption.id, PreemptionDecision::Declined, &bob, now())
            .await
            .unwrap();
        let err = workflow
            .respond(preemption.id, PreemptionDecision::Accepted, &bob, now())
            .await
            .unwrap_err();
        assert!(matches!(err, GpuslotError::AlreadyResolved(_)));
    }

    #[tokio::test]
    async fn test_expired_request_cannot_be_answered() {
        let repo = Arc::new(InMemoryRepository::new());
        let (_, _, preemption) = contested_slot(&repo).await;
        let workflow = PreemptionWorkflow::new(repo.clone());

        let late = preemption.expires_at + chrono::Duration::seconds(1);
        let err = workflow
            .respond(
                preemption.id,
                PreemptionDecision::Accepted,
                &Actor::requester("bob"),
                late,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GpuslotError::Expired(_)));

        let stored = repo.get_preemption_request(preemption.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PreemptionStatus::Pending);
    }

    #[tokio::test]
    async fn test_only_target_holder_or_admin_may_respond() {
        let repo = Arc::new(InMemoryRepository::new());
        let (_, _, preemption) = contested_slot(&repo).await;
        let workflow = PreemptionWorkflow::new(repo);

        let err = workflow
            .respond(
                preemption.id,
                PreemptionDecision::Accepted,
                &Actor::requester("alice"),
                now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GpuslotError::Forbidden(_)));

        workflow
            .respond(
                preemption.id,
                PreemptionDecision::Declined,
                &Actor::administrator("root"),
                now(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let workflow = PreemptionWorkflow::new(Arc::new(InMemoryRepository::new()));
        let err = workflow
            .respond(
                Uuid::new_v4(),
                PreemptionDecision::Accepted,
                &Actor::system(),
                now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GpuslotError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_accept_with_terminal_target_still_approves() {
        let repo = Arc::new(InMemoryRepository::new());
        let (requesting, target, preemption) = contested_slot(&repo).await;
        ReservationLifecycle::new(repo.clone())
            .cancel(target.id, &Actor::requester("bob"), None, now())
            .await
            .unwrap();

        let outcome = PreemptionWorkflow::new(repo.clone())
            .respond(
                preemption.id,
                PreemptionDecision::Accepted,
                &Actor::requester("bob"),
                now(),
            )
            .await
            .unwrap();

        assert!(outcome.target.is_none());
        assert_eq!(
            outcome.requesting.map(|r| r.status),
            Some(ReservationStatus::Approved)
        );
        let requesting = repo.get_reservation(requesting.id).await.unwrap().unwrap();
        assert_eq!(requesting.status, ReservationStatus::Approved);
    }

    #[tokio::test]
    async fn test_accept_with_terminal_requesting_conflicts() {
        let repo = Arc::new(InMemoryRepository::new());
        let (requesting, target, preemption) = contested_slot(&repo).await;
        ReservationLifecycle::new(repo.clone())
            .cancel(requesting.id, &Actor::requester("alice"), None, now())
            .await
            .unwrap();

        let err = PreemptionWorkflow::new(repo.clone())
            .respond(
                preemption.id,
                PreemptionDecision::Accepted,
                &Actor::requester("bob"),
                now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GpuslotError::Conflict(_)));

        let target = repo.get_reservation(target.id).await.unwrap().unwrap();
        assert_eq!(target.status, ReservationStatus::Pending);
        let stored = repo.get_preemption_request(preemption.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PreemptionStatus::Pending);
    }

    #[tokio::test]
    async fn test_pending_for_orders_newest_first_and_hides_expired() {
        let repo = Arc::new(InMemoryRepository::new());
        let target = store_reservation(&repo, "bob", "A100", at(10), at(14), 10.0).await;
        let requesting = store_reservation(&repo, "alice", "A100", at(10), at(14), 90.0).await;

        let older = PreemptionRequest::new(
            &requesting,
            &target,
            "older".into(),
            now(),
            chrono::Duration::hours(24),
        );
        let newer = PreemptionRequest::new(
            &requesting,
            &target,
            "newer".into(),
            now() + chrono::Duration::hours(1),
            chrono::Duration::hours(24),
        );
        let stale = PreemptionRequest::new(
            &requesting,
            &target,
            "stale".into(),
            now() - chrono::Duration::hours(3),
            chrono::Duration::hours(1),
        );
        for request in [older, newer, stale] {
            repo.create_preemption_request(request).await.unwrap();
        }

        let workflow = PreemptionWorkflow::new(repo);
        let pending = workflow
            .pending_for("bob", now() + chrono::Duration::hours(2))
            .await
            .unwrap();
        let texts: Vec<&str> = pending.iter().map(|r| r.justification.as_str()).collect();
        assert_eq!(texts, vec!["newer", "older"]);

        assert!(workflow.pending_for("alice", now()).await.unwrap().is_empty());
    }
}
