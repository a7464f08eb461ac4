//! gpuslot-core: Core types and traits for gpuslot
//!
//! This crate provides the fundamental types used throughout the gpuslot system:
//! - Priority factors and reservation/preemption records
//! - The reservation lifecycle status machine edges
//! - The repository contract for the storage collaborator
//! - Configuration types
//! - Error handling
//! - The GPU resource catalog

pub mod config;
pub mod error;
pub mod factors;
pub mod gpu;
pub mod model;
pub mod repository;

pub use self::config::*;
pub use self::error::*;
pub use self::factors::*;
pub use self::gpu::*;
pub use self::model::*;
pub use self::repository::ReservationRepository;
