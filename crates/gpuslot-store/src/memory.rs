//! In-memory reservation repository
//!
//! Primary tables are keyed by UUID. Secondary indexes cover the read paths
//! the engine uses: reservations by owner, reservations per resource type
//! ordered by start time, and preemption requests by target holder. All
//! tables and indexes sit behind one lock, so every call is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpuslot_core::{
    GpuslotError, GpuslotResult, PreemptionRequest, PreemptionStatus, Reservation,
    ReservationRepository, ReservationStatus, TimeWindow,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Serializable copy of every stored record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub reservations: Vec<Reservation>,
    #[serde(default)]
    pub preemption_requests: Vec<PreemptionRequest>,
}

#[derive(Debug, Default)]
struct State {
    reservations: HashMap<Uuid, Reservation>,
    preemptions: HashMap<Uuid, PreemptionRequest>,
    /// Reservation ids per owner
    by_owner: HashMap<String, HashSet<Uuid>>,
    /// (start, id) per resource type
    by_resource: HashMap<String, BTreeSet<(DateTime<Utc>, Uuid)>>,
    /// Preemption request ids per target holder
    by_target: HashMap<String, HashSet<Uuid>>,
}

impl State {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = State::default();
        for reservation in snapshot.reservations {
            state.insert_reservation(reservation);
        }
        for request in snapshot.preemption_requests {
            state.insert_preemption(request);
        }
        state
    }

    fn insert_reservation(&mut self, reservation: Reservation) {
        self.by_owner
            .entry(reservation.requester_id.clone())
            .or_default()
            .insert(reservation.id);
        self.by_resource
            .entry(reservation.resource_type.clone())
            .or_default()
            .insert((reservation.start, reservation.id));
        self.reservations.insert(reservation.id, reservation);
    }

    fn remove_reservation(&mut self, id: Uuid) -> Option<Reservation> {
        let reservation = self.reservations.remove(&id)?;
        if let Some(ids) = self.by_owner.get_mut(&reservation.requester_id) {
            ids.remove(&id);
        }
        if let Some(slots) = self.by_resource.get_mut(&reservation.resource_type) {
            slots.remove(&(reservation.start, id));
        }
        Some(reservation)
    }

    fn insert_preemption(&mut self, request: PreemptionRequest) {
        self.by_target
            .entry(request.target_user_id.clone())
            .or_default()
            .insert(request.id);
        self.preemptions.insert(request.id, request);
    }

    fn remove_preemption(&mut self, id: Uuid) -> Option<PreemptionRequest> {
        let request = self.preemptions.remove(&id)?;
        if let Some(ids) = self.by_target.get_mut(&request.target_user_id) {
            ids.remove(&id);
        }
        Some(request)
    }
}

/// Repository that keeps everything in process memory
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild tables and indexes from a snapshot
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(State::from_snapshot(snapshot)),
        }
    }

    /// Replace every table and index with the contents of `snapshot`
    pub async fn restore(&self, snapshot: Snapshot) {
        let rebuilt = State::from_snapshot(snapshot);
        *self.state.write().await = rebuilt;
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.read().await;
        Snapshot {
            reservations: state.reservations.values().cloned().collect(),
            preemption_requests: state.preemptions.values().cloned().collect(),
        }
    }

    /// Number of stored reservations and preemption requests
    pub async fn counts(&self) -> (usize, usize) {
        let state = self.state.read().await;
        (state.reservations.len(), state.preemptions.len())
    }
}

#[async_trait]
impl ReservationRepository for InMemoryRepository {
    async fn create_reservation(&self, reservation: Reservation) -> GpuslotResult<Reservation> {
        let mut state = self.state.write().await;
        if state.reservations.contains_key(&reservation.id) {
            return Err(GpuslotError::Conflict(format!(
                "reservation {} already exists",
                reservation.id
            )));
        }
        state.insert_reservation(reservation.clone());
        debug!(reservation_id = %reservation.id, "Stored reservation");
        Ok(reservation)
    }

    async fn get_reservation(&self, id: Uuid) -> GpuslotResult<Option<Reservation>> {
        Ok(self.state.read().await.reservations.get(&id).cloned())
    }

    async fn list_reservations_by_resource_and_window(
        &self,
        resource_type: &str,
        window: &TimeWindow,
    ) -> GpuslotResult<Vec<Reservation>> {
        let state = self.state.read().await;
        let Some(slots) = state.by_resource.get(resource_type) else {
            return Ok(Vec::new());
        };

        // Everything starting before the window ends, then trim by end time.
        Ok(slots
            .range(..(window.end, Uuid::nil()))
            .filter_map(|(_, id)| state.reservations.get(id))
            .filter(|r| r.end > window.start)
            .cloned()
            .collect())
    }

    async fn list_reservations_by_owner(&self, user_id: &str) -> GpuslotResult<Vec<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .by_owner
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.reservations.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_reservations(&self) -> GpuslotResult<Vec<Reservation>> {
        Ok(self.state.read().await.reservations.values().cloned().collect())
    }

    async fn update_reservation_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        status: ReservationStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> GpuslotResult<Reservation> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or_else(|| GpuslotError::reservation_not_found(id))?;

        if reservation.status != expected {
            return Err(GpuslotError::Conflict(format!(
                "reservation {} is {}, expected {}",
                id, reservation.status, expected
            )));
        }

        reservation.status = status;
        if reason.is_some() {
            reservation.decision_reason = reason;
        }
        reservation.updated_at = now;
        Ok(reservation.clone())
    }

    async fn delete_reservation(&self, id: Uuid) -> GpuslotResult<()> {
        let mut state = self.state.write().await;
        state
            .remove_reservation(id)
            .map(|_| ())
            .ok_or_else(|| GpuslotError::reservation_not_found(id))
    }

    async fn create_preemption_request(
        &self,
        request: PreemptionRequest,
    ) -> GpuslotResult<PreemptionRequest> {
        let mut state = self.state.write().await;
        if state.preemptions.contains_key(&request.id) {
            return Err(GpuslotError::Conflict(format!(
                "preemption request {} already exists",
                request.id
            )));
        }
        state.insert_preemption(request.clone());
        debug!(preemption_id = %request.id, "Stored preemption request");
        Ok(request)
    }

    async fn get_preemption_request(&self, id: Uuid) -> GpuslotResult<Option<PreemptionRequest>> {
        Ok(self.state.read().await.preemptions.get(&id).cloned())
    }

    async fn list_pending_preemption_requests(
        &self,
        target_user_id: &str,
    ) -> GpuslotResult<Vec<PreemptionRequest>> {
        let state = self.state.read().await;
        Ok(state
            .by_target
            .get(target_user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.preemptions.get(id))
                    .filter(|r| r.status == PreemptionStatus::Pending)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_preemption_request_status(
        &self,
        id: Uuid,
        expected: PreemptionStatus,
        status: PreemptionStatus,
    ) -> GpuslotResult<PreemptionRequest> {
        let mut state = self.state.write().await;
        let request = state
            .preemptions
            .get_mut(&id)
            .ok_or_else(|| GpuslotError::preemption_not_found(id))?;

        if request.status != expected {
            return Err(GpuslotError::AlreadyResolved(format!(
                "{} is {}, expected {}",
                id, request.status, expected
            )));
        }

        request.status = status;
        Ok(request.clone())
    }

    async fn delete_preemption_request(&self, id: Uuid) -> GpuslotResult<()> {
        let mut state = self.state.write().await;
        state
            .remove_preemption(id)
            .map(|_| ())
            .ok_or_else(|| GpuslotError::preemption_not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gpuslot_core::{NewReservation, PriorityFactors};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 15, hour, 0, 0).unwrap()
    }

    fn reservation(user: &str, resource_type: &str, start: u32, end: u32) -> Reservation {
        Reservation::new(
            NewReservation {
                requester_id: user.to_string(),
                requester_name: None,
                resource_type: resource_type.to_string(),
                start: at(start),
                end: at(end),
                purpose: "training".to_string(),
                factors: PriorityFactors::default(),
            },
            40.0,
            at(0),
        )
    }

    fn preemption(requesting: &Reservation, target: &Reservation) -> PreemptionRequest {
        PreemptionRequest::new(
            requesting,
            target,
            "yield".to_string(),
            at(0),
            chrono::Duration::hours(24),
        )
    }

    #[tokio::test]
    async fn test_window_query_uses_half_open_overlap() {
        let repo = InMemoryRepository::new();
        let early = repo.create_reservation(reservation("a", "A100", 8, 10)).await.unwrap();
        let middle = repo.create_reservation(reservation("b", "A100", 9, 13)).await.unwrap();
        let late = repo.create_reservation(reservation("c", "A100", 12, 16)).await.unwrap();
        repo.create_reservation(reservation("d", "H100", 10, 12)).await.unwrap();

        let window = TimeWindow::new(at(10), at(12)).unwrap();
        let found = repo
            .list_reservations_by_resource_and_window("A100", &window)
            .await
            .unwrap();
        let ids: HashSet<Uuid> = found.iter().map(|r| r.id).collect();

        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&middle.id));
        assert!(!ids.contains(&early.id));
        assert!(!ids.contains(&late.id));
    }

    #[tokio::test]
    async fn test_window_query_returns_every_status() {
        let repo = InMemoryRepository::new();
        let r = repo.create_reservation(reservation("a", "A100", 10, 12)).await.unwrap();
        repo.update_reservation_status(r.id, ReservationStatus::Pending, ReservationStatus::Cancelled, None, at(9))
            .await
            .unwrap();

        let window = TimeWindow::new(at(11), at(13)).unwrap();
        let found = repo
            .list_reservations_by_resource_and_window("A100", &window)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_status_update_is_compare_and_set() {
        let repo = InMemoryRepository::new();
        let r = repo.create_reservation(reservation("a", "A100", 10, 12)).await.unwrap();

        let updated = repo
            .update_reservation_status(
                r.id,
                ReservationStatus::Pending,
                ReservationStatus::Approved,
                Some("ok".to_string()),
                at(9),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ReservationStatus::Approved);
        assert_eq!(updated.decision_reason.as_deref(), Some("ok"));
        assert_eq!(updated.updated_at, at(9));

        let err = repo
            .update_reservation_status(r.id, ReservationStatus::Pending, ReservationStatus::Rejected, None, at(9))
            .await
            .unwrap_err();
        assert!(matches!(err, GpuslotError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_preemption_cas_reports_already_resolved() {
        let repo = InMemoryRepository::new();
        let requesting = reservation("alice", "A100", 10, 12);
        let target = reservation("bob", "A100", 10, 12);
        let request = repo
            .create_preemption_request(preemption(&requesting, &target))
            .await
            .unwrap();

        assert_eq!(repo.list_pending_preemption_requests("bob").await.unwrap().len(), 1);

        repo.update_preemption_request_status(
            request.id,
            PreemptionStatus::Pending,
            PreemptionStatus::Declined,
        )
        .await
        .unwrap();
        let err = repo
            .update_preemption_request_status(
                request.id,
                PreemptionStatus::Pending,
                PreemptionStatus::Accepted,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GpuslotError::AlreadyResolved(_)));
        assert!(repo.list_pending_preemption_requests("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_cleans_indexes() {
        let repo = InMemoryRepository::new();
        let r = repo.create_reservation(reservation("a", "A100", 10, 12)).await.unwrap();
        repo.delete_reservation(r.id).await.unwrap();

        assert!(repo.get_reservation(r.id).await.unwrap().is_none());
        assert!(repo.list_reservations_by_owner("a").await.unwrap().is_empty());
        let window = TimeWindow::new(at(10), at(12)).unwrap();
        assert!(repo
            .list_reservations_by_resource_and_window("A100", &window)
            .await
            .unwrap()
            .is_empty());

        let err = repo.delete_reservation(r.id).await.unwrap_err();
        assert!(matches!(err, GpuslotError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_rebuilds_indexes() {
        let repo = InMemoryRepository::new();
        let requesting = repo.create_reservation(reservation("alice", "A100", 10, 12)).await.unwrap();
        let target = repo.create_reservation(reservation("bob", "A100", 11, 13)).await.unwrap();
        repo.create_preemption_request(preemption(&requesting, &target))
            .await
            .unwrap();

        let restored = InMemoryRepository::from_snapshot(repo.snapshot().await);
        assert_eq!(restored.counts().await, (2, 1));
        assert_eq!(restored.list_reservations_by_owner("bob").await.unwrap().len(), 1);
        assert_eq!(
            restored.list_pending_preemption_requests("bob").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_duplicate_ids_conflict() {
        let repo = InMemoryRepository::new();
        let r = reservation("a", "A100", 10, 12);
        repo.create_reservation(r.clone()).await.unwrap();
        assert!(matches!(
            repo.create_reservation(r).await,
            Err(GpuslotError::Conflict(_))
        ));
    }
}
