//! Error types for the gateway.

use std::io;

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (parse or semantic validation failure)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity failure (token exchange, malformed ID token, unverified email)
    #[error("Identity error: {0}")]
    Identity(String),

    /// Forwarding failure (backend dial, handshake, bad internal URL)
    #[error("Forwarding error: {0}")]
    Forward(String),

    /// Listener failure (bind, TLS setup)
    #[error("Listener error: {0}")]
    Listener(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Upstream HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
