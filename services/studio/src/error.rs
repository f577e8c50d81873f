//! services/studio/src/error.rs
//!
//! Defines the primary error type surfaced to everything that drives the
//! studio: the CLI, the workflows and any UI built on top of them.

use crate::config::ConfigError;
use studio_core::ports::PortError;
use studio_core::validation::ValidationError;

/// The primary error type for the `studio` service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StudioError {
    /// Local, field-scoped input error. Never reaches the network.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The session could not be (re-)authenticated and has been cleared.
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    /// The organization's usage quota rejected the request. Retrying will not help.
    #[error("Usage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Network or server trouble; the user may retry manually.
    #[error("Temporary failure: {0}")]
    Transient(String),

    /// The backend failed while generating, editing or analyzing.
    #[error("Processing failed: {0}")]
    Processing(String),

    /// The backend refused the request for another 4xx reason.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("No active session")]
    NoSession,

    #[error("No active organization")]
    NoOrganization,

    /// The active organization changed while the request was in flight; its
    /// outcome belongs to a context that no longer exists.
    #[error("Active organization changed; result discarded")]
    OrganizationChanged,

    /// An operation was attempted from a workflow state that does not allow it.
    #[error("Invalid workflow state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl StudioError {
    /// Whether a bounded automatic retry may be attempted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StudioError::Transient(_))
    }

    /// Maps backend failures of generation/analysis requests: server errors
    /// there mean the processing itself failed.
    pub(crate) fn from_processing(err: PortError) -> Self {
        match err {
            PortError::Server { message, .. } => StudioError::Processing(message),
            other => other.into(),
        }
    }
}

impl From<PortError> for StudioError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => StudioError::NotFound(what),
            PortError::Unauthorized => StudioError::Unauthenticated,
            PortError::Forbidden(msg) => StudioError::Forbidden(msg),
            PortError::QuotaExceeded(msg) => StudioError::QuotaExceeded(msg),
            PortError::Rejected { message, .. } => StudioError::Rejected(message),
            e @ (PortError::Server { .. } | PortError::Network(_)) => StudioError::Transient(e.to_string()),
            PortError::Storage(msg) => StudioError::Storage(msg),
            PortError::Unexpected(msg) => StudioError::Internal(msg),
        }
    }
}

impl From<ConfigError> for StudioError {
    fn from(err: ConfigError) -> Self {
        StudioError::Config(err.to_string())
    }
}

pub type StudioResult<T> = Result<T, StudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        let server: StudioError = PortError::Server { status: 503, message: "busy".into() }.into();
        let network: StudioError = PortError::Network("reset".into()).into();
        let rejected: StudioError = PortError::Rejected { status: 422, message: "bad".into() }.into();
        let quota: StudioError = PortError::QuotaExceeded("daily".into()).into();
        assert!(server.is_retryable());
        assert!(network.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(!quota.is_retryable());
    }

    #[test]
    fn processing_failures_are_distinct_from_transport_failures() {
        let err = StudioError::from_processing(PortError::Server { status: 500, message: "model error".into() });
        assert!(matches!(err, StudioError::Processing(ref m) if m == "model error"));
        let err = StudioError::from_processing(PortError::Network("timeout".into()));
        assert!(matches!(err, StudioError::Transient(_)));
    }
}
