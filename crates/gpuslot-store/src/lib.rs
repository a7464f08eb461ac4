//! gpuslot-store: Reservation storage
//!
//! This crate provides implementations of the reservation repository:
//! - In-memory tables with secondary indexes
//! - A JSON snapshot file on top of the in-memory tables
//! - A per-call timeout wrapper

pub mod file;
pub mod memory;
pub mod timed;

pub use file::FileRepository;
pub use memory::{InMemoryRepository, Snapshot};
pub use timed::TimedRepository;

use gpuslot_core::{GpuslotResult, ReservationRepository, StorageBackend, StorageConfig};
use std::sync::Arc;
use tracing::info;

/// Open the configured backend, bounded by the configured per-call timeout
pub async fn open_repository(
    config: &StorageConfig,
) -> GpuslotResult<Arc<dyn ReservationRepository>> {
    let backend: Arc<dyn ReservationRepository> = match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory reservation store");
            Arc::new(InMemoryRepository::new())
        }
        StorageBackend::File => Arc::new(FileRepository::open(&config.path).await?),
    };

    Ok(Arc::new(TimedRepository::new(
        backend,
        config.operation_timeout(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_memory_backend() {
        let repo = open_repository(&StorageConfig::default()).await.unwrap();
        assert!(repo.list_reservations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_file_backend() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::File,
            path: dir.path().join("state.json"),
            ..Default::default()
        };
        let repo = open_repository(&config).await.unwrap();
        assert!(repo.list_pending_preemption_requests("bob").await.unwrap().is_empty());
    }
}
