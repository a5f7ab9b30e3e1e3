//! Error types shared across the bhav crates

use thiserror::Error;

/// Result type alias for bhav operations
pub type Result<T> = std::result::Result<T, BhavError>;

/// Main error type for bhav
#[derive(Error, Debug)]
pub enum BhavError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid time of day '{0}': expected HH:MM (24-hour)")]
    InvalidTime(String),
}
