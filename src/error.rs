//! Error types for the tinyurl service.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for tinyurl operations.
#[derive(Error, Debug)]
pub enum TinyUrlError {
    /// Empty long URL or short code
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested short code is already mapped
    #[error("{0}")]
    CodeConflict(String),

    /// Unknown or expired short code
    #[error("{0}")]
    NotFound(String),

    /// Collision-checked allocation ran out of attempts
    #[error("No free short code found after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    /// The backing store failed or timed out
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for tinyurl operations.
pub type Result<T> = std::result::Result<T, TinyUrlError>;
