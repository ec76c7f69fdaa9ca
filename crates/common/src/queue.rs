//! Queue identity and the transactional system topics

use serde::{Deserialize, Serialize};
use std::fmt;

/// System topic holding prepared (half) messages, invisible to consumers
pub const HALF_TOPIC: &str = "SYS_TRANS_HALF_TOPIC";

/// System topic holding commit/rollback tombstones (op records)
///
/// Each op queue mirrors a half queue by `(broker_name, queue_id)`.
pub const OP_HALF_TOPIC: &str = "SYS_TRANS_OP_HALF_TOPIC";

/// Identity of a single physical queue on a broker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageQueue {
    pub topic: String,
    pub broker_name: String,
    pub queue_id: u32,
}

impl MessageQueue {
    pub fn new(topic: impl Into<String>, broker_name: impl Into<String>, queue_id: u32) -> Self {
        Self {
            topic: topic.into(),
            broker_name: broker_name.into(),
            queue_id,
        }
    }
}

impl fmt::Display for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.topic, self.broker_name, self.queue_id)
    }
}
