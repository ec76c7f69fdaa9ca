//! Pull and put result types

use ferrymq_common::{StoredMessage, Timestamp};
use serde::{Deserialize, Serialize};

/// Outcome of a pull-by-offset request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullStatus {
    /// Messages were found at the requested offset
    Found,
    /// The requested offset is at the head of the queue; nothing new yet
    NoNewMsg,
    /// Messages exist in the range but none survived filtering
    NoMatchedMsg,
    /// The requested offset is outside the queue's valid range
    OffsetIllegal,
}

/// Result of pulling messages from a queue
///
/// `next_begin_offset` is always the offset the caller should continue
/// from, including when the requested offset was rejected.
#[derive(Debug, Clone)]
pub struct PullResult {
    pub status: PullStatus,
    pub messages: Vec<StoredMessage>,
    pub next_begin_offset: i64,
}

impl PullResult {
    pub fn found(messages: Vec<StoredMessage>, next_begin_offset: i64) -> Self {
        Self {
            status: PullStatus::Found,
            messages,
            next_begin_offset,
        }
    }

    pub fn no_new_msg(next_begin_offset: i64) -> Self {
        Self {
            status: PullStatus::NoNewMsg,
            messages: Vec::new(),
            next_begin_offset,
        }
    }

    pub fn no_matched_msg(next_begin_offset: i64) -> Self {
        Self {
            status: PullStatus::NoMatchedMsg,
            messages: Vec::new(),
            next_begin_offset,
        }
    }

    pub fn offset_illegal(next_begin_offset: i64) -> Self {
        Self {
            status: PullStatus::OffsetIllegal,
            messages: Vec::new(),
            next_begin_offset,
        }
    }
}

/// Receipt for a successful append
#[derive(Debug, Clone)]
pub struct PutReceipt {
    pub queue_offset: i64,
    pub commit_log_offset: i64,
    pub msg_id: String,
    pub store_ts: Timestamp,
}
