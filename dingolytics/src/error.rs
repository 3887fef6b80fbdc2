//! Error types for the Dingolytics SDK
//!
//! Errors fall into two groups:
//! - Capability errors (storage, environment) surface from
//!   [`TrackerBuilder::build`](crate::TrackerBuilder::build) and are fatal
//!   at construction time.
//! - Delivery errors (assembly, serialization, runtime, transport) never
//!   escape a tracking call; they reach the caller only through the
//!   delivery callback.

use thiserror::Error;

/// Result type for SDK operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Errors that can occur in the SDK
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Storage capability failed to read or write
    #[error("Storage error: {0}")]
    Storage(String),

    /// Host environment facts could not be read
    #[error("Environment unavailable: {0}")]
    Environment(String),

    /// Transport failed to complete the request
    #[error("Transport error: {0}")]
    Transport(String),

    /// Collector answered with a non-success status
    #[error("Collector responded with HTTP {status}")]
    HttpStatus { status: u16 },

    /// Tracking call issued outside a tokio runtime
    #[error("No async runtime available to deliver the event")]
    NoRuntime,

    /// Event properties were not a JSON object
    #[error("Invalid event properties: {0}")]
    InvalidProperties(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// Stable error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            TrackerError::Storage(_) => "STORAGE_ERROR",
            TrackerError::Environment(_) => "ENVIRONMENT_UNAVAILABLE",
            TrackerError::Transport(_) => "TRANSPORT_ERROR",
            TrackerError::HttpStatus { .. } => "HTTP_STATUS",
            TrackerError::NoRuntime => "NO_RUNTIME",
            TrackerError::InvalidProperties(_) => "INVALID_PROPERTIES",
            TrackerError::Serialization(_) => "SERIALIZATION_ERROR",
            TrackerError::Io(_) => "IO_ERROR",
        }
    }

    /// Returns true if this error came out of the delivery path
    /// rather than from a capability at construction time
    pub fn is_delivery_error(&self) -> bool {
        matches!(
            self,
            TrackerError::Transport(_)
                | TrackerError::HttpStatus { .. }
                | TrackerError::NoRuntime
                | TrackerError::InvalidProperties(_)
                | TrackerError::Serialization(_)
        )
    }
}
