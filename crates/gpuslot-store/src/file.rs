//! File-backed reservation repository
//!
//! Reads go to an in-memory copy. Every successful write rewrites a JSON
//! snapshot next to the target path and renames it into place, so the file
//! always holds a complete state. A write whose snapshot cannot be stored is
//! undone in memory as well.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpuslot_core::{
    GpuslotResult, PreemptionRequest, PreemptionStatus, Reservation, ReservationRepository,
    ReservationStatus, TimeWindow,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::memory::{InMemoryRepository, Snapshot};

pub struct FileRepository {
    inner: InMemoryRepository,
    path: PathBuf,
    /// Serializes snapshot writes
    write_lock: Mutex<()>,
}

impl FileRepository {
    /// Load the snapshot at `path`, or start empty if there is none
    pub async fn open(path: impl AsRef<Path>) -> GpuslotResult<Self> {
        let path = path.as_ref().to_path_buf();

        let inner = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read(&path).await?;
            let snapshot: Snapshot = serde_json::from_slice(&content)?;
            info!(
                path = %path.display(),
                reservations = snapshot.reservations.len(),
                preemption_requests = snapshot.preemption_requests.len(),
                "Loaded reservation snapshot"
            );
            InMemoryRepository::from_snapshot(snapshot)
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            info!(path = %path.display(), "Starting with an empty reservation store");
            InMemoryRepository::new()
        };

        Ok(Self {
            inner,
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to the in-memory copy and write the result to disk.
    /// If the write fails, the in-memory copy is put back as it was.
    async fn commit<T>(
        &self,
        change: impl Future<Output = GpuslotResult<T>> + Send,
    ) -> GpuslotResult<T>
    where
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot().await;
        let value = change.await?;

        if let Err(e) = self.write_snapshot().await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to persist snapshot, discarding change"
            );
            self.inner.restore(before).await;
            return Err(e);
        }
        Ok(value)
    }

    async fn write_snapshot(&self) -> GpuslotResult<()> {
        let snapshot = self.inner.snapshot().await;
        let content = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), "Persisted reservation snapshot");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

#[async_trait]
impl ReservationRepository for FileRepository {
    async fn create_reservation(&self, reservation: Reservation) -> GpuslotResult<Reservation> {
        self.commit(self.inner.create_reservation(reservation)).await
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
        self.commit(
            self.inner
                .update_reservation_status(id, expected, status, reason, now),
        )
        .await
    }

    async fn delete_reservation(&self, id: Uuid) -> GpuslotResult<()> {
        self.commit(self.inner.delete_reservation(id)).await
    }

    async fn create_preemption_request(
        &self,
        request: PreemptionRequest,
    ) -> GpuslotResult<PreemptionRequest> {
        self.commit(self.inner.create_preemption_request(request))
            .await
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
        self.commit(
            self.inner
                .update_preemption_request_status(id, expected, status),
        )
        .await
    }

    async fn delete_preemption_request(&self, id: Uuid) -> GpuslotResult<()> {
        self.commit(self.inner.delete_preemption_request(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gpuslot_core::{GpuslotError, NewReservation, PriorityFactors};
    use tempfile::TempDir;

    fn reservation(user: &str) -> Reservation {
        Reservation::new(
            NewReservation {
                requester_id: user.to_string(),
                requester_name: Some("Test User".to_string()),
                resource_type: "V100".to_string(),
                start: Utc.with_ymd_and_hms(2030, 1, 15, 10, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2030, 1, 15, 12, 0, 0).unwrap(),
                purpose: "analysis".to_string(),
                factors: PriorityFactors::default(),
            },
            55.0,
            Utc.with_ymd_and_hms(2030, 1, 14, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let repo = FileRepository::open(&path).await.unwrap();
        let created = repo.create_reservation(reservation("alice")).await.unwrap();
        repo.update_reservation_status(
            created.id,
            ReservationStatus::Pending,
            ReservationStatus::Approved,
            Some("approved by root".to_string()),
            Utc.with_ymd_and_hms(2030, 1, 14, 9, 0, 0).unwrap(),
        )
        .await
        .unwrap();
        assert!(path.exists());
        drop(repo);

        let reopened = FileRepository::open(&path).await.unwrap();
        let loaded = reopened.get_reservation(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ReservationStatus::Approved);
        assert_eq!(loaded.decision_reason.as_deref(), Some("approved by root"));
        assert_eq!(reopened.list_reservations_by_owner("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_update_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let repo = FileRepository::open(&path).await.unwrap();
        let created = repo.create_reservation(reservation("alice")).await.unwrap();
        assert!(repo
            .update_reservation_status(
                created.id,
                ReservationStatus::Active,
                ReservationStatus::Completed,
                None,
                Utc::now(),
            )
            .await
            .is_err());

        let reopened = FileRepository::open(&path).await.unwrap();
        let loaded = reopened.get_reservation(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn test_unwritable_snapshot_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let repo = FileRepository::open(&path).await.unwrap();
        let kept = repo.create_reservation(reservation("alice")).await.unwrap();

        // A directory in place of the temp file makes every write fail
        tokio::fs::create_dir(repo.temp_path()).await.unwrap();

        let err = repo.create_reservation(reservation("bob")).await.unwrap_err();
        assert!(matches!(err, GpuslotError::Io(_)));
        assert!(err.is_retryable());
        assert!(repo.list_reservations_by_owner("bob").await.unwrap().is_empty());

        assert!(repo
            .update_reservation_status(
                kept.id,
                ReservationStatus::Pending,
                ReservationStatus::Cancelled,
                None,
                Utc::now(),
            )
            .await
            .is_err());
        assert!(repo.delete_reservation(kept.id).await.is_err());

        let stored = repo.get_reservation(kept.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Pending);
        assert_eq!(repo.list_reservations().await.unwrap().len(), 1);

        // Writes go through again once the path is clear
        tokio::fs::remove_dir(repo.temp_path()).await.unwrap();
        repo.create_reservation(reservation("bob")).await.unwrap();
        let reopened = FileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.list_reservations().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        assert!(FileRepository::open(&path).await.is_err());
    }
}
