//! Error types for the check engine

use ferrymq_store::StoreError;
use thiserror::Error;

/// Result type for check-engine operations
pub type Result<T> = std::result::Result<T, CheckError>;

/// Errors that break the scan of a single queue
///
/// A broken queue is logged and skipped; the remaining queues still scan.
#[derive(Debug, Error, Clone)]
pub enum CheckError {
    #[error("illegal consume offsets for {queue}: half={half_offset}, op={op_offset}")]
    IllegalConsumeOffset {
        queue: String,
        half_offset: i64,
        op_offset: i64,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
