//! In-memory log store backend
//!
//! Queues are plain vectors indexed by logical offset; a process-wide
//! counter stands in for the commit log, with every appended message
//! registered under its commit-log offset for lookup. Used by tests and
//! embedded deployments; durable backends implement the same
//! [`StoreBridge`] trait.

use ferrymq_common::{
    HALF_TOPIC, Message, MessageQueue, OP_HALF_TOPIC, StoredMessage, Timestamp,
};
use ferrymq_store::{PullResult, PutReceipt, Result, StoreBridge};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory message store for a single broker
pub struct MemoryStore {
    broker_name: String,
    file_reserved_hours: u64,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// (topic, queue_id) -> messages in queue-offset order
    logs: HashMap<(String, u32), Vec<StoredMessage>>,

    /// commit-log offset -> location of the message
    commit_index: HashMap<i64, (String, u32, usize)>,

    /// Next physical offset to hand out
    next_commit_log_offset: i64,

    /// Durable consume offsets
    consume_offsets: HashMap<MessageQueue, i64>,
}

impl MemoryStore {
    pub fn new(broker_name: impl Into<String>) -> Self {
        Self {
            broker_name: broker_name.into(),
            file_reserved_hours: 72,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Override the retention window reported to the scanner
    pub fn with_file_reserved_hours(mut self, hours: u64) -> Self {
        self.file_reserved_hours = hours;
        self
    }

    pub fn broker_name(&self) -> &str {
        &self.broker_name
    }

    /// Append a message to its `(topic, queue_id)` queue, assigning the
    /// queue offset, commit-log offset, store timestamp, and message id
    pub fn put_message(&self, message: Message) -> PutReceipt {
        let mut inner = self.inner.lock();

        let key = (message.topic.clone(), message.queue_id);
        let commit_log_offset = inner.next_commit_log_offset;
        inner.next_commit_log_offset += 1;

        let log = inner.logs.entry(key.clone()).or_default();
        let queue_offset = log.len() as i64;
        let store_ts = Timestamp::now();
        let msg_id = Uuid::now_v7().to_string();

        let stored = StoredMessage {
            message,
            queue_offset,
            commit_log_offset,
            store_ts,
            msg_id: msg_id.clone(),
        };
        log.push(stored);
        let slot = log.len() - 1;
        inner
            .commit_index
            .insert(commit_log_offset, (key.0, key.1, slot));

        PutReceipt {
            queue_offset,
            commit_log_offset,
            msg_id,
            store_ts,
        }
    }

    fn pull(&self, topic: &str, queue_id: u32, offset: i64, max_count: usize) -> PullResult {
        if offset < 0 {
            return PullResult::offset_illegal(0);
        }

        let inner = self.inner.lock();
        let Some(log) = inner.logs.get(&(topic.to_string(), queue_id)) else {
            return PullResult::no_new_msg(offset);
        };

        let len = log.len() as i64;
        if offset >= len {
            return PullResult::no_new_msg(len);
        }

        let end = len.min(offset + max_count as i64);
        let messages = log[offset as usize..end as usize].to_vec();
        PullResult::found(messages, end)
    }
}

impl StoreBridge for MemoryStore {
    fn fetch_half_queues(&self) -> Vec<MessageQueue> {
        let inner = self.inner.lock();
        let mut queues: Vec<MessageQueue> = inner
            .logs
            .keys()
            .filter(|(topic, _)| topic == HALF_TOPIC)
            .map(|(topic, queue_id)| {
                MessageQueue::new(topic.clone(), self.broker_name.clone(), *queue_id)
            })
            .collect();
        queues.sort_by_key(|q| q.queue_id);
        queues
    }

    fn pull_half(&self, queue: &MessageQueue, offset: i64, max_count: usize) -> Result<PullResult> {
        Ok(self.pull(&queue.topic, queue.queue_id, offset, max_count))
    }

    fn pull_op(&self, queue: &MessageQueue, offset: i64, max_count: usize) -> Result<PullResult> {
        Ok(self.pull(&queue.topic, queue.queue_id, offset, max_count))
    }

    fn append_half(&self, message: Message) -> Result<PutReceipt> {
        Ok(self.put_message(message))
    }

    fn append_op(&self, half: &StoredMessage, tag: &str) -> Result<()> {
        let body = half.queue_offset.to_string().into_bytes();
        let op = Message::new(OP_HALF_TOPIC, half.queue_id(), body).with_tag(tag);
        let receipt = self.put_message(op);
        tracing::debug!(
            "op record appended: half offset={} op offset={}",
            half.queue_offset,
            receipt.queue_offset
        );
        Ok(())
    }

    fn read_consume_offset(&self, queue: &MessageQueue) -> i64 {
        let inner = self.inner.lock();
        // Unknown queues start at the queue minimum, which is always 0 here
        inner.consume_offsets.get(queue).copied().unwrap_or(0)
    }

    fn write_consume_offset(&self, queue: &MessageQueue, offset: i64) {
        let mut inner = self.inner.lock();
        inner.consume_offsets.insert(queue.clone(), offset);
    }

    fn lookup_by_commit_log_offset(&self, commit_log_offset: i64) -> Option<StoredMessage> {
        let inner = self.inner.lock();
        let (topic, queue_id, slot) = inner.commit_index.get(&commit_log_offset)?;
        inner
            .logs
            .get(&(topic.clone(), *queue_id))
            .and_then(|log| log.get(*slot))
            .cloned()
    }

    fn file_reserved_hours(&self) -> u64 {
        self.file_reserved_hours
    }
}
