//! Plugin error types

use std::fmt;

/// Error reported by a plugin collaborator (supervisor or instance client)
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin path does not exist or is not executable
    #[error("Invalid plugin path: {0}")]
    InvalidPath(String),

    /// Plugin process failed to start
    #[error("Plugin failed to start: {0}")]
    StartFailed(String),

    /// Plugin did not complete the handshake
    #[error("Plugin handshake failed: {0}")]
    HandshakeFailed(String),

    /// Plugin process could not be stopped
    #[error("Plugin failed to stop: {0}")]
    StopFailed(String),

    /// Remote call to a running instance failed
    #[error("Plugin call failed: {0}")]
    CallFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

impl PluginError {
    /// Create a new invalid path error
    pub fn invalid_path(path: impl fmt::Display) -> Self {
        Self::InvalidPath(path.to_string())
    }

    /// Create a new start failure
    pub fn start_failed(msg: impl fmt::Display) -> Self {
        Self::StartFailed(msg.to_string())
    }

    /// Create a new handshake failure
    pub fn handshake(msg: impl fmt::Display) -> Self {
        Self::HandshakeFailed(msg.to_string())
    }

    /// Create a new stop failure
    pub fn stop_failed(msg: impl fmt::Display) -> Self {
        Self::StopFailed(msg.to_string())
    }

    /// Create a new call failure
    pub fn call(msg: impl fmt::Display) -> Self {
        Self::CallFailed(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::ConfigError(msg.to_string())
    }
}
