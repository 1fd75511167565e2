//! Error types for greslet

use thiserror::Error;

/// Main error type for greslet
#[derive(Error, Debug)]
pub enum GresletError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reservation raced with a newer view of the cluster
    #[error("Reservation conflict: {0}")]
    Conflict(String),

    /// Node report is older than the staleness threshold
    #[error("Stale node: {0}")]
    StaleNode(String),

    /// No node can currently satisfy a job's resource request
    #[error("Capacity unavailable: {0}")]
    CapacityUnavailable(String),

    /// Forced termination could not be confirmed
    #[error("Termination failed: {0}")]
    TerminationFailed(String),

    /// A durable write (spool or acknowledgment) did not persist
    #[error("Durable write failed: {0}")]
    DurableWrite(String),

    /// Script dispatch failed
    #[error("Launch failed: {0}")]
    Launch(String),

    /// Allocation not found
    #[error("Allocation not found: {0}")]
    AllocationNotFound(String),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

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

/// Result type for greslet operations
pub type GresletResult<T> = Result<T, GresletError>;

impl From<serde_json::Error> for GresletError {
    fn from(err: serde_json::Error) -> Self {
        GresletError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GresletError {
    fn from(err: toml::de::Error) -> Self {
        GresletError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GresletError::Conflict("gpu 3 on torrnode2 already reserved".to_string());
        assert_eq!(
            err.to_string(),
            "Reservation conflict: gpu 3 on torrnode2 already reserved"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GresletError = io_err.into();
        assert!(matches!(err, GresletError::Io(_)));
    }
}
