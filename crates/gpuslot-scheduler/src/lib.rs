//! gpuslot-scheduler: Priority scoring and slot admission for gpuslot
//!
//! This crate provides the reservation engine:
//! - Multi-factor priority scoring
//! - Conflict detection on per-resource-type timelines
//! - Admission with auto-approval and preemption requests
//! - The preemption response workflow and reservation lifecycle

pub mod admission;
pub mod conflict;
pub mod lifecycle;
pub mod locks;
pub mod preemption;
pub mod scheduler;
pub mod scoring;

#[cfg(test)]
mod testing;

pub use admission::{AdmissionEngine, AdmissionResult};
pub use conflict::ConflictDetector;
pub use lifecycle::ReservationLifecycle;
pub use locks::ResourceLocks;
pub use preemption::{PreemptionOutcome, PreemptionWorkflow};
pub use scheduler::{ReservationFilter, Scheduler};
pub use scoring::{score, Category, CategoryScore, PriorityScore};
