//! Error types for store backends

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors a store backend can report
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("append rejected: {0}")]
    AppendRejected(String),

    #[error("store backend error: {0}")]
    Backend(String),
}
