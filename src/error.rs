//! Error types for the Chrome debug MCP server

use thiserror::Error;

/// Main error type for the Chrome debug MCP server
#[derive(Error, Debug)]
pub enum CdpError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Target discovery failed: {0}")]
    Discovery(String),

    #[error("No debuggable page targets available")]
    NoTargets,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Command '{method}' timed out after {timeout_secs}s")]
    CommandTimeout { method: String, timeout_secs: u64 },

    #[error("Failed to persist binary payload: {0}")]
    ExtractionWrite(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for CdpError {
    fn from(error: reqwest::Error) -> Self {
        CdpError::Discovery(error.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        CdpError::ConnectionFailed(error.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, CdpError>;
