//! Common test utilities for integration tests

use ferrymq_common::{HALF_TOPIC, Message, MessageQueue, OP_HALF_TOPIC, StoredMessage, Timestamp};
use ferrymq_store::StoreBridge;
use ferrymq_store_memory::MemoryStore;
use ferrymq_txn::{CheckListener, TransactionalMessageService};
use parking_lot::Mutex;
use std::time::Duration;

pub const TT: Duration = Duration::from_secs(6);
pub const TCM: u32 = 3;

/// Listener that records every scanner decision
#[derive(Default)]
pub struct RecordingListener {
    pub checks: Mutex<Vec<StoredMessage>>,
    pub discards: Mutex<Vec<StoredMessage>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_count(&self) -> usize {
        self.checks.lock().len()
    }

    pub fn discard_count(&self) -> usize {
        self.discards.lock().len()
    }
}

impl CheckListener for RecordingListener {
    fn resolve_half(&self, half: StoredMessage) {
        self.checks.lock().push(half);
    }

    fn resolve_discard(&self, half: StoredMessage) {
        self.discards.lock().push(half);
    }
}

pub fn service() -> TransactionalMessageService<MemoryStore> {
    TransactionalMessageService::new(MemoryStore::new("broker-a"))
}

pub fn half_queue() -> MessageQueue {
    MessageQueue::new(HALF_TOPIC, "broker-a", 0)
}

pub fn op_queue() -> MessageQueue {
    MessageQueue::new(OP_HALF_TOPIC, "broker-a", 0)
}

/// Prepare a producer message born at `born` and return the stored half
pub fn prepare_half(
    service: &TransactionalMessageService<MemoryStore>,
    born: Timestamp,
    properties: &[(&str, &str)],
) -> StoredMessage {
    let mut message = Message::new("orders", 0, b"order-payload".to_vec()).with_born_ts(born);
    for (key, value) in properties {
        message.set_property(*key, *value);
    }
    let receipt = service.prepare_message(message).unwrap();
    service
        .bridge()
        .lookup_by_commit_log_offset(receipt.commit_log_offset)
        .unwrap()
}

/// Seed a half message directly into the half topic, bypassing the
/// prepare re-addressing (for halves that already carry scan state)
pub fn seed_half(
    service: &TransactionalMessageService<MemoryStore>,
    born: Timestamp,
    properties: &[(&str, &str)],
) -> StoredMessage {
    let mut message = Message::new(HALF_TOPIC, 0, b"order-payload".to_vec()).with_born_ts(born);
    for (key, value) in properties {
        message.set_property(*key, *value);
    }
    let receipt = service.bridge().append_half(message).unwrap();
    service
        .bridge()
        .lookup_by_commit_log_offset(receipt.commit_log_offset)
        .unwrap()
}

/// Let the wall clock move past the most recent append, so the next scan
/// does not see it as freshly stored
pub fn settle() {
    std::thread::sleep(Duration::from_millis(5));
}
