//! Per-call timeout for any repository
//!
//! A call that does not finish in time fails with a retryable `Upstream`
//! error. The engine does not retry on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpuslot_core::{
    GpuslotError, GpuslotResult, PreemptionRequest, PreemptionStatus, Reservation,
    ReservationRepository, ReservationStatus, TimeWindow,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub struct TimedRepository {
    inner: Arc<dyn ReservationRepository>,
    timeout: Duration,
}

impl TimedRepository {
    pub fn new(inner: Arc<dyn ReservationRepository>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = GpuslotResult<T>> + Send,
    ) -> GpuslotResult<T>
    where
        T: Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation = operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Repository call timed out"
                );
                Err(GpuslotError::Upstream(format!(
                    "repository {} timed out after {}ms",
                    operation,
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl ReservationRepository for TimedRepository {
    async fn create_reservation(&self, reservation: Reservation) -> GpuslotResult<Reservation> {
        self.bounded("create_reservation", self.inner.create_reservation(reservation))
            .await
    }

    async fn get_reservation(&self, id: Uuid) -> GpuslotResult<Option<Reservation>> {
        self.bounded("get_reservation", self.inner.get_reservation(id))
            .await
    }

    async fn list_reservations_by_resource_and_window(
        &self,
        resource_type: &str,
        window: &TimeWindow,
    ) -> GpuslotResult<Vec<Reservation>> {
        self.bounded(
            "list_reservations_by_resource_and_window",
            self.inner
                .list_reservations_by_resource_and_window(resource_type, window),
        )
        .await
    }

    async fn list_reservations_by_owner(&self, user_id: &str) -> GpuslotResult<Vec<Reservation>> {
        self.bounded(
            "list_reservations_by_owner",
            self.inner.list_reservations_by_owner(user_id),
        )
        .await
    }

    async fn list_reservations(&self) -> GpuslotResult<Vec<Reservation>> {
        self.bounded("list_reservations", self.inner.list_reservations())
            .await
    }

    async fn update_reservation_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        status: ReservationStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> GpuslotResult<Reservation> {
        self.bounded(
            "update_reservation_status",
            self.inner
                .update_reservation_status(id, expected, status, reason, now),
        )
        .await
    }

    async fn delete_reservation(&self, id: Uuid) -> GpuslotResult<()> {
        self.bounded("delete_reservation", self.inner.delete_reservation(id))
            .await
    }

    async fn create_preemption_request(
        &self,
        request: PreemptionRequest,
    ) -> GpuslotResult<PreemptionRequest> {
        self.bounded(
            "create_preemption_request",
            self.inner.create_preemption_request(request),
        )
        .await
    }

    async fn get_preemption_request(&self, id: Uuid) -> GpuslotResult<Option<PreemptionRequest>> {
        self.bounded("get_preemption_request", self.inner.get_preemption_request(id))
            .await
    }

    async fn list_pending_preemption_requests(
        &self,
        target_user_id: &str,
    ) -> GpuslotResult<Vec<PreemptionRequest>> {
        self.bounded(
            "list_pending_preemption_requests",
            self.inner.list_pending_preemption_requests(target_user_id),
        )
        .await
    }

    async fn update_preemption_request_status(
        &self,
        id: Uuid,
        expected: PreemptionStatus,
        status: PreemptionStatus,
    ) -> GpuslotResult<PreemptionRequest> {
        self.bounded(
            "update_preemption_request_status",
            self.inner
                .update_preemption_request_status(id, expected, status),
        )
        .await
    }

    async fn delete_preemption_request(&self, id: Uuid) -> GpuslotResult<()> {
        self.bounded(
            "delete_preemption_request",
            self.inner.delete_preemption_request(id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRepository;

    /// Never answers
    struct Stalled;

    #[async_trait]
    impl ReservationRepository for Stalled {
        async fn create_reservation(&self, _: Reservation) -> GpuslotResult<Reservation> {
            std::future::pending().await
        }
        async fn get_reservation(&self, _: Uuid) -> GpuslotResult<Option<Reservation>> {
            std::future::pending().await
        }
        async fn list_reservations_by_resource_and_window(
            &self,
            _: &str,
            _: &TimeWindow,
        ) -> GpuslotResult<Vec<Reservation>> {
            std::future::pending().await
        }
        async fn list_reservations_by_owner(&self, _: &str) -> GpuslotResult<Vec<Reservation>> {
            std::future::pending().await
        }
        async fn list_reservations(&self) -> GpuslotResult<Vec<Reservation>> {
            std::future::pending().await
        }
        async fn update_reservation_status(
            &self,
            _: Uuid,
            _: ReservationStatus,
            _: ReservationStatus,
            _: Option<String>,
            _: DateTime<Utc>,
        ) -> GpuslotResult<Reservation> {
            std::future::pending().await
        }
        async fn delete_reservation(&self, _: Uuid) -> GpuslotResult<()> {
            std::future::pending().await
        }
        async fn create_preemption_request(
            &self,
            _: PreemptionRequest,
        ) -> GpuslotResult<PreemptionRequest> {
            std::future::pending().await
        }
        async fn get_preemption_request(&self, _: Uuid) -> GpuslotResult<Option<PreemptionRequest>> {
            std::future::pending().await
        }
        async fn list_pending_preemption_requests(
            &self,
            _: &str,
        ) -> GpuslotResult<Vec<PreemptionRequest>> {
            std::future::pending().await
        }
        async fn update_preemption_request_status(
            &self,
            _: Uuid,
            _: PreemptionStatus,
            _: PreemptionStatus,
        ) -> GpuslotResult<PreemptionRequest> {
            std::future::pending().await
        }
        async fn delete_preemption_request(&self, _: Uuid) -> GpuslotResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_timeout_is_retryable_upstream() {
        let repo = TimedRepository::new(Arc::new(Stalled), Duration::from_millis(20));
        let err = repo.get_reservation(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, GpuslotError::Upstream(ref msg) if msg.contains("get_reservation")));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fast_calls_pass_through() {
        let repo = TimedRepository::new(
            Arc::new(InMemoryRepository::new()),
            Duration::from_secs(1),
        );
        assert!(repo.get_reservation(Uuid::new_v4()).await.unwrap().is_none());
        assert!(repo.list_reservations().await.unwrap().is_empty());
    }
}
