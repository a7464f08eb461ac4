//! Admission of new reservations
//!
//! A request is validated, scored, and persisted as pending. Its timeline is
//! then checked for conflicts: a conflict-free high-tier reservation is
//! approved immediately, and every conflicting reservation with a strictly
//! lower score receives a preemption request. If any write after the first
//! one fails, everything written by this admission is deleted again.

use chrono::{DateTime, Utc};
use gpuslot_core::{
    Actor, AdmissionConfig, GpuslotError, GpuslotResult, NewReservation, PreemptionRequest,
    Reservation, ReservationRepository, ReservationStatus, ResourceCatalog, Tier, TimeWindow,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::conflict::ConflictDetector;
use crate::lifecycle::ReservationLifecycle;
use crate::locks::ResourceLocks;
use crate::scoring::{score, PriorityScore};

/// Decision reason recorded on auto-approval
pub const AUTO_APPROVAL_REASON: &str = "auto-approved: high priority with no conflicts";

/// Outcome of one admission
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionResult {
    /// The reservation as last persisted
    pub reservation: Reservation,
    /// Score the reservation was admitted with
    pub score: PriorityScore,
    /// Slot-occupying reservations overlapping the new one
    pub conflicts: Vec<Reservation>,
    /// Whether the reservation was approved without review
    pub auto_approved: bool,
    /// Preemption requests issued against lower-priority conflicts
    pub preemptions_created: Vec<PreemptionRequest>,
}

/// Validates, scores, and settles new reservations
pub struct AdmissionEngine {
    repository: Arc<dyn ReservationRepository>,
    detector: ConflictDetector,
    lifecycle: ReservationLifecycle,
    catalog: ResourceCatalog,
    config: AdmissionConfig,
    locks: ResourceLocks,
}

impl AdmissionEngine {
    pub fn new(
        repository: Arc<dyn ReservationRepository>,
        catalog: ResourceCatalog,
        config: AdmissionConfig,
    ) -> Self {
        let locks = ResourceLocks::new(config.serialize_admissions);
        Self {
            detector: ConflictDetector::new(repository.clone()),
            lifecycle: ReservationLifecycle::new(repository.clone()),
            repository,
            catalog,
            config,
            locks,
        }
    }

    /// Reject malformed requests before anything is persisted
    pub fn validate(
        &self,
        request: &NewReservation,
        now: DateTime<Utc>,
    ) -> GpuslotResult<TimeWindow> {
        if request.requester_id.trim().is_empty() {
            return Err(GpuslotError::Validation(
                "requester id must not be empty".to_string(),
            ));
        }
        self.catalog.validate(&request.resource_type)?;
        let window = TimeWindow::new(request.start, request.end)?;
        if self.config.reject_past_start && window.start < now {
            return Err(GpuslotError::Validation(format!(
                "start ({}) is in the past",
                window.start.to_rfc3339()
            )));
        }
        Ok(window)
    }

    pub async fn admit(&self, request: NewReservation) -> GpuslotResult<AdmissionResult> {
        self.admit_at(request, Utc::now()).await
    }

    /// Admit `request` as of `now`
    pub async fn admit_at(
        &self,
        request: NewReservation,
        now: DateTime<Utc>,
    ) -> GpuslotResult<AdmissionResult> {
        let window = self.validate(&request, now)?;
        let score = score(&request.factors);

        let _token = self.locks.acquire(&request.resource_type).await;

        let mut reservation = Reservation::new(request, score.percentage, now);
        reservation.decision_reason = Some(score.summary());
        let reservation = self.repository.create_reservation(reservation).await?;

        info!(
            reservation_id = %reservation.id,
            requester = %reservation.requester_id,
            resource_type = %reservation.resource_type,
            priority = reservation.priority_score,
            tier = %reservation.tier,
            "Reservation created"
        );

        let mut issued = Vec::new();
        match self
            .settle(reservation.clone(), &window, &score, now, &mut issued)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(
                    reservation_id = %reservation.id,
                    error = %e,
                    "Admission failed, rolling back"
                );
                self.rollback(&reservation, &issued).await;
                Err(e)
            }
        }
    }

    async fn settle(
        &self,
        reservation: Reservation,
        window: &TimeWindow,
        score: &PriorityScore,
        now: DateTime<Utc>,
        issued: &mut Vec<PreemptionRequest>,
    ) -> GpuslotResult<AdmissionResult> {
        let conflicts = self
            .detector
            .find_conflicts_excluding(&reservation.resource_type, window, Some(reservation.id))
            .await?;

        if conflicts.is_empty() {
            if score.tier != Tier::High {
                debug!(reservation_id = %reservation.id, "No conflicts, awaiting review");
                return Ok(AdmissionResult {
                    reservation,
                    score: score.clone(),
                    conflicts,
                    auto_approved: false,
                    preemptions_created: Vec::new(),
                });
            }

            let approved = self
                .lifecycle
                .transition(
                    reservation.id,
                    ReservationStatus::Approved,
                    &Actor::system(),
                    Some(AUTO_APPROVAL_REASON.to_string()),
                    now,
                )
                .await?;

            return Ok(AdmissionResult {
                reservation: approved,
                score: score.clone(),
                conflicts,
                auto_approved: true,
                preemptions_created: Vec::new(),
            });
        }

        for target in conflicts
            .iter()
            .filter(|c| c.priority_score < reservation.priority_score)
        {
            let request = PreemptionRequest::new(
                &reservation,
                target,
                preemption_justification(&reservation, score),
                now,
                self.config.preemption_ttl(),
            );
            let created = self.repository.create_preemption_request(request).await?;

            info!(
                preemption_id = %created.id,
                requesting = %reservation.id,
                target = %target.id,
                target_user = %created.target_user_id,
                "Preemption requested"
            );
            issued.push(created);
        }

        info!(
            reservation_id = %reservation.id,
            conflicts = conflicts.len(),
            preemptions = issued.len(),
            "Reservation conflicts with existing slots"
        );

        Ok(AdmissionResult {
            reservation,
            score: score.clone(),
            conflicts,
            auto_approved: false,
            preemptions_created: issued.clone(),
        })
    }

    /// Best-effort removal of everything an aborted admission wrote
    async fn rollback(&self, reservation: &Reservation, issued: &[PreemptionRequest]) {
        for request in issued {
            if let Err(e) = self.repository.delete_preemption_request(request.id).await {
                warn!(preemption_id = %request.id, error = %e, "Failed to remove preemption request");
            }
        }
        if let Err(e) = self.repository.delete_reservation(reservation.id).await {
            warn!(reservation_id = %reservation.id, error = %e, "Failed to remove reservation");
        }
    }
}

fn preemption_justification(reservation: &Reservation, score: &PriorityScore) -> String {
    let mut text = format!(
        "{} needs {} from {} to {}: {}",
        reservation
            .requester_name
            .as_deref()
            .unwrap_or(&reservation.requester_id),
        reservation.resource_type,
        reservation.start.to_rfc3339(),
        reservation.end.to_rfc3339(),
        score.summary()
    );
    if !score.justification.is_empty() {
        text.push_str("; ");
        text.push_str(&score.justification.join("; "));
    }
    text
}
