//! Common types for FerryMQ
//!
//! This crate defines:
//! - Physical timestamps (milliseconds since Unix epoch)
//! - Queue identities and the transactional system topics
//! - Message types and the transaction-related user properties

mod message;
mod queue;
mod timestamp;

pub use message::{Message, REMOVE_TAG, StoredMessage, keys};
pub use queue::{HALF_TOPIC, MessageQueue, OP_HALF_TOPIC};
pub use timestamp::Timestamp;
