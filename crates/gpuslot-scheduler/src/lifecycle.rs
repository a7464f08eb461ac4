//! Reservation lifecycle state machine
//!
//! ```text
//! pending --> approved --> active --> completed
//!    |           |           |
//!    +-> rejected|           |
//!    +-----------+-----------+--> cancelled
//! ```
//!
//! Approve, reject, activate, and complete are administrative. Cancellation
//! is open to the owner as well, but a pending or approved reservation can
//! only be cancelled before its start time. The engine itself (system actor)
//! is exempt from the start-time rule when it yields a slot to a preemption.

use chrono::{DateTime, Utc};
use gpuslot_core::{
    Actor, ActorRole, GpuslotError, GpuslotResult, Reservation, ReservationRepository,
    ReservationStatus,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Check whether `actor` may move `reservation` to `next` at `now`
pub fn check_transition(
    reservation: &Reservation,
    next: ReservationStatus,
    actor: &Actor,
    now: DateTime<Utc>,
) -> GpuslotResult<()> {
    let current = reservation.status;
    if !current.can_transition_to(next) {
        return Err(GpuslotError::Conflict(format!(
            "reservation {} cannot move from {} to {}",
            reservation.id, current, next
        )));
    }

    match next {
        ReservationStatus::Cancelled => {
            if !actor.is_privileged() && !reservation.is_owned_by(&actor.user_id) {
                return Err(GpuslotError::Forbidden(format!(
                    "{} does not own reservation {}",
                    actor.user_id, reservation.id
                )));
            }
            let not_started = matches!(
                current,
                ReservationStatus::Pending | ReservationStatus::Approved
            );
            if not_started && actor.role != ActorRole::System && reservation.start <= now {
                return Err(GpuslotError::Conflict(format!(
                    "reservation {} already started at {}",
                    reservation.id,
                    reservation.start.to_rfc3339()
                )));
            }
        }
        _ => {
            if !actor.is_privileged() {
                return Err(GpuslotError::Forbidden(format!(
                    "only an administrator may mark reservation {} {}",
                    reservation.id, next
                )));
            }
        }
    }

    Ok(())
}

/// Applies validated status transitions through the repository
pub struct ReservationLifecycle {
    repository: Arc<dyn ReservationRepository>,
}

impl ReservationLifecycle {
    pub fn new(repository: Arc<dyn ReservationRepository>) -> Self {
        Self { repository }
    }

    /// Move reservation `id` to `next`. Without an explicit `reason` the
    /// decision reason records who made the change.
    pub async fn transition(
        &self,
        id: Uuid,
        next: ReservationStatus,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> GpuslotResult<Reservation> {
        let reservation = self
            .repository
            .get_reservation(id)
            .await?
            .ok_or_else(|| GpuslotError::reservation_not_found(id))?;

        check_transition(&reservation, next, actor, now)?;

        let reason = reason.unwrap_or_else(|| format!("status changed to {} by {}", next, actor));
        let updated = self
            .repository
            .update_reservation_status(id, reservation.status, next, Some(reason), now)
            .await?;

        info!(
            reservation_id = %id,
            from = %reservation.status,
            to = %next,
            actor = %actor,
            "Reservation status changed"
        );

        Ok(updated)
    }

    pub async fn cancel(
        &self,
        id: Uuid,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> GpuslotResult<Reservation> {
        self.transition(id, ReservationStatus::Cancelled, actor, reason, now)
            .await
    }
}
