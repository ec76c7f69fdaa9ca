//! Store bridge trait
//!
//! The seam between the check engine and the underlying log store.
//!
//! Note: all methods are synchronous. Half-queue scanning must be ordered
//! and sequential; each offset is fully classified before the next one is
//! looked at.

use crate::{PullResult, PutReceipt, Result};
use ferrymq_common::{Message, MessageQueue, StoredMessage, keys};

/// Adapter over the log store backing the transaction subsystem
pub trait StoreBridge: Send + Sync {
    /// All half queues currently present under the half topic
    fn fetch_half_queues(&self) -> Vec<MessageQueue>;

    /// Pull up to `max_count` half messages starting at `offset`
    fn pull_half(&self, queue: &MessageQueue, offset: i64, max_count: usize) -> Result<PullResult>;

    /// Pull up to `max_count` op records starting at `offset`
    fn pull_op(&self, queue: &MessageQueue, offset: i64, max_count: usize) -> Result<PullResult>;

    /// Append a message to the half topic
    fn append_half(&self, message: Message) -> Result<PutReceipt>;

    /// Append an op record resolving `half` to the paired op queue
    ///
    /// The record's body is the ASCII-decimal queue offset of `half`.
    fn append_op(&self, half: &StoredMessage, tag: &str) -> Result<()>;

    /// Durable consume offset of `queue`, or the queue's minimum offset
    /// when none has been stored yet; negative only when the stored value
    /// itself is corrupt
    fn read_consume_offset(&self, queue: &MessageQueue) -> i64;

    /// Persist the consume offset of `queue`
    fn write_consume_offset(&self, queue: &MessageQueue, offset: i64);

    /// Resolve a message by its physical commit-log offset
    fn lookup_by_commit_log_offset(&self, commit_log_offset: i64) -> Option<StoredMessage>;

    /// File retention window in hours; halves older than this are skipped
    /// by the scanner
    fn file_reserved_hours(&self) -> u64 {
        72
    }

    /// Copy a half message for re-append.
    ///
    /// The copy keeps the born timestamp and user properties; the store
    /// assigns a fresh message id, queue offset, and commit-log offset when
    /// the copy is appended.
    fn renew_half(&self, half: &StoredMessage) -> Message {
        half.message.clone()
    }

    /// Copy a half message for re-append during its immunity window,
    /// stamping the copy's `PreparedQueueOffset` with the offset of the
    /// copy it replaces.
    ///
    /// Each immunity re-append pushes the chain forward by one hop: the
    /// stamp always names the immediately previous offset, never the
    /// original one.
    fn renew_immunity_half(&self, half: &StoredMessage) -> Message {
        let mut renewed = self.renew_half(half);
        renewed.set_property(
            keys::TRANSACTION_PREPARED_QUEUE_OFFSET,
            half.queue_offset.to_string(),
        );
        renewed
    }
}
