//! gpuslot-api: REST API server for gpuslot
//!
//! This crate provides the REST API for interacting with the scheduler:
//! - Structured and free-text reservation admission
//! - Cancellation, administrative transitions, and preemption responses
//! - Scoring, resource catalog, extraction usage, and status

pub mod error;
pub mod rest;

pub use error::ApiError;
pub use rest::{create_router, with_layers, AppState};
