//! Error types for gpuslot

use thiserror::Error;

/// Main error type for gpuslot
#[derive(Error, Debug)]
pub enum GpuslotError {
    /// Malformed request, rejected before anything is persisted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown reservation or preemption request
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The current state forbids the requested action
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Preemption request has already been answered
    #[error("Preemption request already resolved: {0}")]
    AlreadyResolved(String),

    /// Preemption request is past its expiry
    #[error("Preemption request expired: {0}")]
    Expired(String),

    /// Actor is not allowed to act on the target
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Repository or extraction service failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for gpuslot operations
pub type GpuslotResult<T> = Result<T, GpuslotError>;

impl GpuslotError {
    pub fn reservation_not_found(id: impl ToString) -> Self {
        GpuslotError::NotFound {
            entity: "Reservation",
            id: id.to_string(),
        }
    }

    pub fn preemption_not_found(id: impl ToString) -> Self {
        GpuslotError::NotFound {
            entity: "Preemption request",
            id: id.to_string(),
        }
    }

    /// Stable label used by API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            GpuslotError::Validation(_) => "validation",
            GpuslotError::NotFound { .. } => "not_found",
            GpuslotError::Conflict(_) => "conflict",
            GpuslotError::AlreadyResolved(_) => "already_resolved",
            GpuslotError::Expired(_) => "expired",
            GpuslotError::Forbidden(_) => "forbidden",
            GpuslotError::Upstream(_) | GpuslotError::Io(_) => "upstream",
            GpuslotError::Config(_) => "config",
            GpuslotError::Serialization(_) => "serialization",
            GpuslotError::Internal(_) => "internal",
        }
    }

    /// Only I/O failures against collaborators are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, GpuslotError::Upstream(_) | GpuslotError::Io(_))
    }
}

impl From<serde_json::Error> for GpuslotError {
    fn from(err: serde_json::Error) -> Self {
        GpuslotError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GpuslotError {
    fn from(err: toml::de::Error) -> Self {
        GpuslotError::Config(err.to_string())
    }
}

impl From<config::ConfigError> for GpuslotError {
    fn from(err: config::ConfigError) -> Self {
        GpuslotError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GpuslotError::Validation("start must be before end".to_string());
        assert_eq!(err.to_string(), "Validation error: start must be before end");

        let err = GpuslotError::reservation_not_found("abc");
        assert_eq!(err.to_string(), "Reservation not found: abc");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GpuslotError = io_err.into();
        assert!(matches!(err, GpuslotError::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_only_upstream_is_retryable() {
        assert!(GpuslotError::Upstream("timeout".into()).is_retryable());
        assert!(!GpuslotError::Expired("x".into()).is_retryable());
        assert!(!GpuslotError::Conflict("x".into()).is_retryable());
        assert_eq!(GpuslotError::AlreadyResolved("x".into()).kind(), "already_resolved");
    }
}
