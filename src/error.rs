//! Error types for S7 endpoint operations

use thiserror::Error;

/// Result type alias for endpoint operations
pub type Result<T> = std::result::Result<T, EndpointError>;

/// Error types for endpoint and driver operations
#[derive(Error, Debug)]
pub enum EndpointError {
    /// Configuration errors (invalid TSAP components, invalid link mode)
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid input on a runtime command (e.g. a bad cycle time interval)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Connection establishment errors
    #[error("connection error: {0}")]
    Connection(String),

    /// Cyclic read errors
    #[error("read error: {0}")]
    Read(String),

    /// Variable write errors
    #[error("write error: {0}")]
    Write(String),

    /// The device stopped answering cyclic reads
    #[error("device unresponsive: {0}")]
    Unresponsive(String),

    /// Operation on an endpoint that has been shut down
    #[error("endpoint closed: {0}")]
    Closed(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("{0}")]
    Generic(#[from] anyhow::Error),
}

impl EndpointError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a read error
    pub fn read<S: Into<String>>(msg: S) -> Self {
        Self::Read(msg.into())
    }

    /// Create a write error
    pub fn write<S: Into<String>>(msg: S) -> Self {
        Self::Write(msg.into())
    }

    /// Create an unresponsive device error
    pub fn unresponsive<S: Into<String>>(msg: S) -> Self {
        Self::Unresponsive(msg.into())
    }

    /// Create a closed endpoint error
    pub fn closed<S: Into<String>>(msg: S) -> Self {
        Self::Closed(msg.into())
    }

    /// Check if the error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EndpointError::Connection(_)
                | EndpointError::Read(_)
                | EndpointError::Write(_)
                | EndpointError::Unresponsive(_)
                | EndpointError::Io(_)
        )
    }

    /// Check if the error was caused by bad configuration or input
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EndpointError::Config(_) | EndpointError::InvalidInput(_)
        )
    }
}
