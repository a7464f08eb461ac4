//! Storage collaborator contract

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    GpuslotResult, PreemptionRequest, PreemptionStatus, Reservation, ReservationStatus, TimeWindow,
};

/// Narrow key/value-style repository used by the scheduling engine.
///
/// Status updates are compare-and-set: they succeed only while the stored
/// status still equals `expected`, and report `Conflict` (reservations) or
/// `AlreadyResolved` (preemption requests) otherwise. Implementations must
/// make each call atomic on its own; nothing spans calls.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Persist a new reservation
    async fn create_reservation(&self, reservation: Reservation) -> GpuslotResult<Reservation>;

    /// Fetch a reservation by id
    async fn get_reservation(&self, id: Uuid) -> GpuslotResult<Option<Reservation>>;

    /// All reservations of a resource type whose interval overlaps `window`,
    /// regardless of status
    async fn list_reservations_by_resource_and_window(
        &self,
        resource_type: &str,
        window: &TimeWindow,
    ) -> GpuslotResult<Vec<Reservation>>;

    /// All reservations owned by a user
    async fn list_reservations_by_owner(&self, user_id: &str) -> GpuslotResult<Vec<Reservation>>;

    /// Every stored reservation
    async fn list_reservations(&self) -> GpuslotResult<Vec<Reservation>>;

    /// Move a reservation from `expected` to `status`, recording `reason`
    /// and stamping `updated_at` with the caller's clock
    async fn update_reservation_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        status: ReservationStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> GpuslotResult<Reservation>;

    /// Remove a reservation; used to undo a failed admission
    async fn delete_reservation(&self, id: Uuid) -> GpuslotResult<()>;

    /// Persist a new preemption request
    async fn create_preemption_request(
        &self,
        request: PreemptionRequest,
    ) -> GpuslotResult<PreemptionRequest>;

    /// Fetch a preemption request by id
    async fn get_preemption_request(&self, id: Uuid) -> GpuslotResult<Option<PreemptionRequest>>;

    /// Requests in `pending` status addressed to `target_user_id`
    async fn list_pending_preemption_requests(
        &self,
        target_user_id: &str,
    ) -> GpuslotResult<Vec<PreemptionRequest>>;

    /// Move a preemption request from `expected` to `status`
    async fn update_preemption_request_status(
        &self,
        id: Uuid,
        expected: PreemptionStatus,
        status: PreemptionStatus,
    ) -> GpuslotResult<PreemptionRequest>;

    /// Remove a preemption request; used to undo a failed admission
    async fn delete_preemption_request(&self, id: Uuid) -> GpuslotResult<()>;
}
