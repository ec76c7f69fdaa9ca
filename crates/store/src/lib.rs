//! Store bridge for the FerryMQ transaction subsystem
//!
//! The check engine never talks to the log store directly; it goes through
//! the [`StoreBridge`] trait defined here. Backends implement pull-by-offset
//! over half and op queues, appends, consume-offset bookkeeping, and
//! commit-log lookup. The bundled in-memory backend lives in
//! `ferrymq-store-memory`.

mod bridge;
mod error;
mod result;

pub use bridge::StoreBridge;
pub use error::{Result, StoreError};
pub use result::{PullResult, PullStatus, PutReceipt};
