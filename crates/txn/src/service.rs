//! Transactional message service
//!
//! The injectable top-level value owning the store bridge. It drives the
//! periodic check over every half queue and carries the broker-facing
//! entry points: prepare, commit, rollback, and the op-record write that
//! marks a half resolved.

use crate::error::{CheckError, Result};
use crate::listener::CheckListener;
use crate::op_index::{ScanState, fill_op_remove_map};
use crate::scanner::{HalfScanner, QueueProgress};
use ferrymq_common::{
    HALF_TOPIC, Message, MessageQueue, OP_HALF_TOPIC, REMOVE_TAG, StoredMessage, Timestamp, keys,
};
use ferrymq_store::{PutReceipt, StoreBridge};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Header of a producer's commit or rollback request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndTransactionRequest {
    /// Commit-log offset of the prepared message being ended
    pub commit_log_offset: i64,

    /// Message id the producer saw when preparing
    pub msg_id: String,

    /// Producer group ending the transaction
    pub producer_group: String,

    /// Whether this request answers a broker-initiated back-check
    pub from_check: bool,
}

/// Response code of a commit/rollback resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    SystemError,
}

/// Result of resolving a commit/rollback request to its prepared message
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub prepared: Option<StoredMessage>,
    pub code: ResponseCode,
    pub remark: Option<String>,
}

/// The check engine and broker-facing transaction surface
pub struct TransactionalMessageService<B> {
    bridge: B,

    /// Memoized half-queue to op-queue pairing; entries are pure and never
    /// invalidated
    op_queues: RwLock<HashMap<MessageQueue, MessageQueue>>,
}

impl<B: StoreBridge> TransactionalMessageService<B> {
    pub fn new(bridge: B) -> Self {
        Self {
            bridge,
            op_queues: RwLock::new(HashMap::new()),
        }
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Persist a producer's prepared message into the half topic.
    ///
    /// The real destination is stashed into user properties so the message
    /// stays invisible to consumers until committed.
    pub fn prepare_message(&self, message: Message) -> Result<PutReceipt> {
        Ok(self.bridge.append_half(to_half_message(message))?)
    }

    /// Scan every half queue once, dispatching back-checks through
    /// `listener`.
    ///
    /// Never fails: a queue whose scan breaks is logged and skipped, and
    /// the next queue proceeds. Callers schedule this periodically with at
    /// most one invocation in flight.
    pub fn check<L: CheckListener>(
        &self,
        transaction_timeout: Duration,
        transaction_check_max: u32,
        listener: &L,
    ) {
        let half_queues = self.bridge.fetch_half_queues();
        if half_queues.is_empty() {
            tracing::warn!("no queues under the half topic {}", HALF_TOPIC);
            return;
        }
        tracing::info!(
            "transaction check start: topic={} queues={}",
            HALF_TOPIC,
            half_queues.len()
        );

        for queue in &half_queues {
            match self.check_queue(queue, transaction_timeout, transaction_check_max, listener) {
                Ok(progress) => {
                    tracing::debug!("[{}] scan finished: {:?}", queue, progress);
                }
                Err(e) => {
                    tracing::error!("[{}] scan broken: {}", queue, e);
                }
            }
        }
    }

    fn check_queue<L: CheckListener>(
        &self,
        queue: &MessageQueue,
        transaction_timeout: Duration,
        transaction_check_max: u32,
        listener: &L,
    ) -> Result<QueueProgress> {
        let start_time = Timestamp::now();
        let op_queue = self.op_queue(queue);

        let half_offset = self.bridge.read_consume_offset(queue);
        let op_offset = self.bridge.read_consume_offset(&op_queue);
        tracing::info!(
            "[{}] before check: half offset={} op offset={}",
            queue,
            half_offset,
            op_offset
        );
        if half_offset < 0 || op_offset < 0 {
            return Err(CheckError::IllegalConsumeOffset {
                queue: queue.to_string(),
                half_offset,
                op_offset,
            });
        }

        let mut state = ScanState::new();
        let initial_pull =
            fill_op_remove_map(&self.bridge, &mut state, &op_queue, op_offset, half_offset)?;

        let scanner = HalfScanner::new(
            &self.bridge,
            listener,
            transaction_timeout,
            transaction_check_max,
        );
        scanner.scan_queue(
            queue,
            &op_queue,
            half_offset,
            op_offset,
            &mut state,
            initial_pull,
            start_time,
        )
    }

    /// The op queue paired with `half_queue`: same broker and queue id,
    /// op topic
    pub fn op_queue(&self, half_queue: &MessageQueue) -> MessageQueue {
        if let Some(queue) = self.op_queues.read().get(half_queue) {
            return queue.clone();
        }
        let op_queue = MessageQueue::new(
            OP_HALF_TOPIC,
            half_queue.broker_name.clone(),
            half_queue.queue_id,
        );
        self.op_queues
            .write()
            .entry(half_queue.clone())
            .or_insert(op_queue)
            .clone()
    }

    /// Resolve a commit request to its prepared message
    pub fn commit_message(&self, request: &EndTransactionRequest) -> OperationResult {
        self.half_by_commit_log_offset(request.commit_log_offset)
    }

    /// Resolve a rollback request to its prepared message; the tombstone
    /// itself is written by [`Self::delete_prepare_message`]
    pub fn rollback_message(&self, request: &EndTransactionRequest) -> OperationResult {
        self.half_by_commit_log_offset(request.commit_log_offset)
    }

    fn half_by_commit_log_offset(&self, commit_log_offset: i64) -> OperationResult {
        match self.bridge.lookup_by_commit_log_offset(commit_log_offset) {
            Some(prepared) => OperationResult {
                prepared: Some(prepared),
                code: ResponseCode::Success,
                remark: None,
            },
            None => OperationResult {
                prepared: None,
                code: ResponseCode::SystemError,
                remark: Some("find prepared transaction message failed".to_string()),
            },
        }
    }

    /// Write the op record that marks `half` committed or rolled back.
    ///
    /// Semantically idempotent: duplicate records for the same half all
    /// land on the same `remove_map` entry.
    pub fn delete_prepare_message(&self, half: &StoredMessage) -> bool {
        match self.bridge.append_op(half, REMOVE_TAG) {
            Ok(()) => {
                tracing::info!(
                    "transaction op record written: id={} queue={} offset={}",
                    half.msg_id,
                    half.queue_id(),
                    half.queue_offset
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    "transaction op record write failed: id={} queue={}: {}",
                    half.msg_id,
                    half.queue_id(),
                    e
                );
                false
            }
        }
    }
}

/// Re-address a producer message to the half topic, stashing its real
/// destination into user properties
fn to_half_message(mut message: Message) -> Message {
    let real_topic = std::mem::take(&mut message.topic);
    message
        .properties
        .insert(keys::REAL_TOPIC.to_string(), real_topic);
    message
        .properties
        .insert(keys::REAL_QUEUE_ID.to_string(), message.queue_id.to_string());
    if !message.properties.contains_key(keys::UNIQ_KEY) {
        message
            .properties
            .insert(keys::UNIQ_KEY.to_string(), Uuid::now_v7().to_string());
    }
    message.topic = HALF_TOPIC.to_string();
    message.queue_id = 0;
    message
}
