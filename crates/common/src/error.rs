//! Common error types for the VRRP agent.

use std::fmt;

/// A specialized Result type for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for agent operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Dataplane error: {0}")]
    Dataplane(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new codec error.
    pub fn codec(msg: impl fmt::Display) -> Self {
        Error::Codec(msg.to_string())
    }

    /// Create a new dataplane error.
    pub fn dataplane(msg: impl fmt::Display) -> Self {
        Error::Dataplane(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }
}
