//! Overlap detection on a resource-type timeline

use gpuslot_core::{GpuslotResult, Reservation, ReservationRepository, TimeWindow};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Two reservations conflict when they claim the same resource type over
/// overlapping half-open intervals
pub fn conflicts(a: &Reservation, b: &Reservation) -> bool {
    a.resource_type == b.resource_type && a.window().overlaps(&b.window())
}

/// Finds slot-occupying reservations that overlap a window
pub struct ConflictDetector {
    repository: Arc<dyn ReservationRepository>,
}

impl ConflictDetector {
    pub fn new(repository: Arc<dyn ReservationRepository>) -> Self {
        Self { repository }
    }

    /// Pending, approved, and active reservations of `resource_type` that
    /// overlap `window`
    pub async fn find_conflicts(
        &self,
        resource_type: &str,
        window: &TimeWindow,
    ) -> GpuslotResult<Vec<Reservation>> {
        self.find_conflicts_excluding(resource_type, window, None).await
    }

    /// Same as `find_conflicts`, skipping the reservation `exclude`
    pub async fn find_conflicts_excluding(
        &self,
        resource_type: &str,
        window: &TimeWindow,
        exclude: Option<Uuid>,
    ) -> GpuslotResult<Vec<Reservation>> {
        let candidates = self
            .repository
            .list_reservations_by_resource_and_window(resource_type, window)
            .await?;

        // The repository may over-approximate; re-check everything here.
        let conflicts: Vec<Reservation> = candidates
            .into_iter()
            .filter(|r| Some(r.id) != exclude)
            .filter(|r| r.resource_type == resource_type)
            .filter(|r| r.status.occupies_slot())
            .filter(|r| r.window().overlaps(window))
            .collect();

        debug!(
            resource_type = %resource_type,
            start = %window.start,
            end = %window.end,
            conflicts = conflicts.len(),
            "Conflict scan complete"
        );

        Ok(conflicts)
    }
}
