//! Error types for the Gatekeeper service.

use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Gatekeeper operations.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared counter store failed or could not be reached
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    /// A store round-trip did not complete in time
    #[error("Counter store {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The identity key handed to the limiter was empty
    #[error("Identity key must not be empty")]
    InvalidKey,

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
