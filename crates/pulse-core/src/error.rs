//! Error types for Pulse

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the shared Pulse types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Namespace could not be parsed or is empty
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Plugin key is not of the form `name:version`
    #[error("Invalid plugin key: {0}")]
    InvalidPluginKey(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }
}
