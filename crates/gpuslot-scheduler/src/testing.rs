//! Shared fixtures for the scheduler tests

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gpuslot_core::{
    AcademicNovelty, CollaborationType, DataConfidentiality, DeadlineFactors, DeadlineType,
    FundingFactors, FundingType, GpuslotError, GpuslotResult, ImpactFactors, Level,
    NewReservation, Position, PreemptionRequest, PreemptionStatus, PriorityFactors, ProjectScale,
    PublicationTarget, PurposeFactors, Reproducibility, RequesterFactors, ResearchExperience,
    ResearchField, Reservation, ReservationRepository, ReservationStatus, TimeWindow,
    UrgencyLevel, UsageEfficiency, UsageType,
};
use gpuslot_store::InMemoryRepository;
use std::sync::Arc;
use uuid::Uuid;

/// 2030-01-15 at `hour`:00 UTC
pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 15, hour, 0, 0).unwrap()
}

/// The instant admissions are made at; the day before `at`
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 14, 9, 0, 0).unwrap()
}

pub fn new_request(
    user: &str,
    resource_type: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> NewReservation {
    request_with(user, resource_type, start, end, PriorityFactors::default())
}

pub fn request_with(
    user: &str,
    resource_type: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    factors: PriorityFactors,
) -> NewReservation {
    NewReservation {
        requester_id: user.to_string(),
        requester_name: None,
        resource_type: resource_type.to_string(),
        start,
        end,
        purpose: format!("{} experiment", user),
        factors,
    }
}

/// Persist a pending reservation with a fixed score, bypassing admission
pub async fn store_reservation(
    repo: &Arc<InMemoryRepository>,
    user: &str,
    resource_type: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    priority_score: f64,
) -> Reservation {
    let reservation = Reservation::new(
        new_request(user, resource_type, start, end),
        priority_score,
        now(),
    );
    repo.create_reservation(reservation).await.unwrap()
}

/// Scores 85.85 (high tier)
pub fn high_priority_factors() -> PriorityFactors {
    PriorityFactors {
        deadline: DeadlineFactors {
            has_deadline: true,
            days_until_deadline: Some(2.0),
            deadline_type: Some(DeadlineType::PaperSubmission),
            urgency_level: Some(UrgencyLevel::Immediate),
        },
        impact: ImpactFactors {
            research_field: Some(ResearchField::Medical),
            social_contribution: Some(Level::High),
            academic_novelty: Some(AcademicNovelty::Significant),
            publication_target: Some(PublicationTarget::MajorConference),
        },
        funding: FundingFactors {
            has_external_funding: true,
            funding_type: Some(FundingType::GovernmentGrant),
            project_scale: Some(ProjectScale::Medium),
            collaboration_type: Some(CollaborationType::MultiInstitutional),
        },
        purpose: PurposeFactors {
            usage_type: Some(UsageType::ResearchExperiment),
            data_confidentiality: Some(DataConfidentiality::Sensitive),
            reproducibility_requirement: Some(Reproducibility::Important),
            computational_complexity: Some(Level::High),
        },
        requester: Some(RequesterFactors {
            position: Some(Position::Professor),
            research_experience: Some(ResearchExperience::Senior),
            past_usage_efficiency: Some(UsageEfficiency::Good),
            lab_priority: Some(Level::High),
        }),
    }
}

/// Delegates to an in-memory repository but refuses to store preemption
/// requests
pub struct FailingRepository {
    inner: Arc<InMemoryRepository>,
}

impl FailingRepository {
    pub fn failing_preemptions(inner: Arc<InMemoryRepository>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ReservationRepository for FailingRepository {
    async fn create_reservation(&self, reservation: Reservation) -> GpuslotResult<Reservation> {
        self.inner.create_reservation(reservation).await
    }

    async fn get_reservation(&self, id: Uuid) -> GpuslotResult<Option<Reservation>> {
        self.inner.get_reservation(id).await
    }

    async fn list_reservations_by_resource_and_window(
        &self,
        resource_type: &str,
        window: &TimeWindow,
    ) -> GpuslotResult<Vec<Reservation>> {
        self.inner
            .list_reservations_by_resource_and_window(resource_type, window)
            .await
    }

    async fn list_reservations_by_owner(&self, user_id: &str) -> GpuslotResult<Vec<Reservation>> {
        self.inner.list_reservations_by_owner(user_id).await
    }

    async fn list_reservations(&self) -> GpuslotResult<Vec<Reservation>> {
        self.inner.list_reservations().await
    }

    async fn update_reservation_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        status: ReservationStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> GpuslotResult<Reservation> {
        self.inner
            .update_reservation_status(id, expected, status, reason, now)
            .await
    }

    async fn delete_reservation(&self, id: Uuid) -> GpuslotResult<()> {
        self.inner.delete_reservation(id).await
    }

    async fn create_preemption_request(
        &self,
        _request: PreemptionRequest,
    ) -> GpuslotResult<PreemptionRequest> {
        Err(GpuslotError::Upstream("preemption table unavailable".to_string()))
    }

    async fn get_preemption_request(&self, id: Uuid) -> GpuslotResult<Option<PreemptionRequest>> {
        self.inner.get_preemption_request(id).await
    }

    async fn list_pending_preemption_requests(
        &self,
        target_user_id: &str,
    ) -> GpuslotResult<Vec<PreemptionRequest>> {
        self.inner.list_pending_preemption_requests(target_user_id).await
    }

    async fn update_preemption_request_status(
        &self,
        id: Uuid,
        expected: PreemptionStatus,
        status: PreemptionStatus,
    ) -> GpuslotResult<PreemptionRequest> {
        self.inner
            .update_preemption_request_status(id, expected, status)
            .await
    }

    async fn delete_preemption_request(&self, id: Uuid) -> GpuslotResult<()> {
        self.inner.delete_preemption_request(id).await
    }
}
