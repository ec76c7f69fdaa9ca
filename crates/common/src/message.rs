//! Message types
//!
//! A [`Message`] is what a producer hands to the broker: topic, body, and
//! string-keyed user properties. A [`StoredMessage`] is a message the store
//! has accepted, with its assigned queue offset, commit-log offset, store
//! timestamp, and message id.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tag carried by valid op records; anything else is logged and ignored
pub const REMOVE_TAG: &str = "REMOVE";

/// User-property keys read and written by the transaction subsystem
pub mod keys {
    /// Number of back-checks already dispatched for this half
    pub const TRANSACTION_CHECK_TIMES: &str = "TRANSACTION_CHECK_TIMES";

    /// Producer-requested immunity window in seconds; `-1` means "use the
    /// broker's transaction timeout"
    pub const CHECK_IMMUNITY_TIME_IN_SECONDS: &str = "CHECK_IMMUNITY_TIME_IN_SECONDS";

    /// Queue offset of the previous copy of the same logical half
    pub const TRANSACTION_PREPARED_QUEUE_OFFSET: &str = "TRANSACTION_PREPARED_QUEUE_OFFSET";

    /// Original topic of a prepared message, stashed while it sits in the
    /// half topic
    pub const REAL_TOPIC: &str = "REAL_TOPIC";

    /// Original queue id of a prepared message
    pub const REAL_QUEUE_ID: &str = "REAL_QUEUE_ID";

    /// Producer group that sent the message; back-check routing key
    pub const PRODUCER_GROUP: &str = "PRODUCER_GROUP";

    /// Client-assigned unique key, stable across re-appends
    pub const UNIQ_KEY: &str = "UNIQ_KEY";
}

/// A message as handed to the store for appending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub queue_id: u32,
    pub tag: Option<String>,
    pub body: Vec<u8>,
    pub born_ts: Timestamp,
    pub properties: HashMap<String, String>,
}

impl Message {
    /// Create a message born now with no tag or properties
    pub fn new(topic: impl Into<String>, queue_id: u32, body: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            queue_id,
            tag: None,
            body,
            born_ts: Timestamp::now(),
            properties: HashMap::new(),
        }
    }

    /// Set the tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the born timestamp
    pub fn with_born_ts(mut self, born_ts: Timestamp) -> Self {
        self.born_ts = born_ts;
        self
    }

    /// Add a user property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Get a user property value
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|s| s.as_str())
    }

    /// Insert or overwrite a user property
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }
}

/// A message persisted by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message: Message,

    /// Logical position within its queue
    pub queue_offset: i64,

    /// Physical position within the commit log
    pub commit_log_offset: i64,

    /// When the store persisted this copy
    pub store_ts: Timestamp,

    /// Store-assigned id of this copy; re-appending assigns a fresh one
    pub msg_id: String,
}

impl StoredMessage {
    pub fn topic(&self) -> &str {
        &self.message.topic
    }

    pub fn queue_id(&self) -> u32 {
        self.message.queue_id
    }

    pub fn born_ts(&self) -> Timestamp {
        self.message.born_ts
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.message.property(key)
    }
}
