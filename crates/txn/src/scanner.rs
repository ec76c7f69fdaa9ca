//! Half-queue scanner
//!
//! Walks one half queue from its consume offset and classifies every
//! prepared message: already resolved by an op record, discarded for too
//! many checks, skipped for age, deferred because it is too fresh or still
//! inside its immunity window, or re-appended and handed to the listener
//! for a back-check. The walk is strictly ordered; the consume offset only
//! ever lands on the smallest offset that is still undecided.

use crate::error::Result;
use crate::listener::CheckListener;
use crate::op_index::{ScanState, calculate_op_offset, fill_op_remove_map, parse_long};
use ferrymq_common::{MessageQueue, StoredMessage, Timestamp, keys};
use ferrymq_store::{PullResult, PullStatus, StoreBridge};
use std::time::Duration;

/// Wall-clock budget per queue per tick
pub(crate) const MAX_PROCESS_TIME_LIMIT_MS: i64 = 60_000;

/// Consecutive empty half pulls tolerated before the scan ends
pub(crate) const MAX_RETRY_COUNT_WHEN_HALF_NULL: u32 = 1;

/// Half messages fetched per pull; classification is one-at-a-time
pub(crate) const HALF_PULL_BATCH: usize = 1;

/// How a queue's scan ended
///
/// Errors surface separately as a broken queue, which the service logs and
/// skips without touching the remaining queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueProgress {
    /// At least one consume offset moved
    Advanced,
    /// No offset moved; everything pending retries on a later tick
    Deferred,
}

/// Scanner for a single tick, borrowing the bridge and listener
pub struct HalfScanner<'a, B, L> {
    bridge: &'a B,
    listener: &'a L,
    transaction_timeout_ms: i64,
    transaction_check_max: u32,
    file_reserved_ms: i64,
}

struct GetResult {
    pull: PullResult,
    msg: Option<StoredMessage>,
}

impl<'a, B: StoreBridge, L: CheckListener> HalfScanner<'a, B, L> {
    pub fn new(
        bridge: &'a B,
        listener: &'a L,
        transaction_timeout: Duration,
        transaction_check_max: u32,
    ) -> Self {
        let file_reserved_ms = bridge.file_reserved_hours() as i64 * 3_600 * 1_000;
        Self {
            bridge,
            listener,
            transaction_timeout_ms: transaction_timeout.as_millis() as i64,
            transaction_check_max,
            file_reserved_ms,
        }
    }

    /// Walk `queue` from `half_offset`, then persist whatever offsets moved.
    ///
    /// `state` must already hold the result of one op-index fill starting
    /// at `op_offset`, and `initial_pull` is that fill's pull result; the
    /// need-check predicate reads the latest op batch from it.
    pub fn scan_queue(
        &self,
        queue: &MessageQueue,
        op_queue: &MessageQueue,
        half_offset: i64,
        op_offset: i64,
        state: &mut ScanState,
        initial_pull: PullResult,
        start_time: Timestamp,
    ) -> Result<QueueProgress> {
        let mut pull_result = initial_pull;
        let mut get_message_null_count = 1u32;
        let mut new_half_offset = half_offset;
        let mut i = half_offset;

        loop {
            if Timestamp::now().millis_since(start_time) > MAX_PROCESS_TIME_LIMIT_MS {
                tracing::info!(
                    "[{}] scan budget of {}ms reached",
                    queue,
                    MAX_PROCESS_TIME_LIMIT_MS
                );
                break;
            }

            if let Some(done_op) = state.remove_map.remove(&i) {
                tracing::debug!(
                    "[{}] half offset {} already committed or rolled back",
                    queue,
                    i
                );
                state.done_op_offset.push(done_op);
            } else {
                let got = self.get_half(queue, i)?;
                let Some(half) = got.msg else {
                    let nulls = get_message_null_count;
                    get_message_null_count += 1;
                    if nulls > MAX_RETRY_COUNT_WHEN_HALF_NULL {
                        break;
                    }
                    if got.pull.status == PullStatus::NoNewMsg {
                        tracing::debug!("[{}] no new half message at offset {}", queue, i);
                        break;
                    }
                    tracing::info!(
                        "[{}] half offset {} rejected ({:?}), forwarding to {}",
                        queue,
                        i,
                        got.pull.status,
                        got.pull.next_begin_offset
                    );
                    i = got.pull.next_begin_offset;
                    new_half_offset = i;
                    continue;
                };

                if self.needs_discard(&half) || self.needs_skip(&half) {
                    self.listener.resolve_discard(half);
                    new_half_offset = i + 1;
                    i += 1;
                    continue;
                }

                if half.store_ts >= start_time {
                    tracing::debug!(
                        "[{}] half offset {} was stored during this scan, deferring",
                        queue,
                        i
                    );
                    break;
                }

                let age = Timestamp::now().millis_since(half.born_ts());
                let mut check_immunity_ms = self.transaction_timeout_ms;

                if let Some(raw) = half.property(keys::CHECK_IMMUNITY_TIME_IN_SECONDS) {
                    check_immunity_ms = immunity_millis(raw, self.transaction_timeout_ms);
                    if age < check_immunity_ms {
                        if self.check_prepare_queue_offset(state, &half, check_immunity_ms) {
                            new_half_offset = i + 1;
                            i += 1;
                            continue;
                        }
                        // Neither resolvable nor re-appendable inside the
                        // immunity window; leave the offset and retry on a
                        // later tick.
                        break;
                    }
                } else if 0 <= age && age < check_immunity_ms {
                    tracing::debug!(
                        "[{}] half offset {} is {}ms old, still in immunity",
                        queue,
                        i,
                        age
                    );
                    break;
                }

                // A missing tombstone only means something once either the
                // half has outlived its immunity, or the op queue is caught
                // up past the scan start. A negative age is a producer
                // clock running ahead; check it rather than waiting for a
                // window that may never be reached.
                let op_messages = &pull_result.messages;
                let need_check = (op_messages.is_empty() && age > check_immunity_ms)
                    || op_messages.last().is_some_and(|op| {
                        op.born_ts().millis_since(start_time) > self.transaction_timeout_ms
                    })
                    || age <= -1;

                if need_check {
                    let Some(resent) = self.put_back_half(&half, i) else {
                        // Re-append failed; retry the same offset while the
                        // budget lasts.
                        continue;
                    };
                    self.listener.resolve_half(resent);
                } else {
                    pull_result = fill_op_remove_map(
                        self.bridge,
                        state,
                        op_queue,
                        pull_result.next_begin_offset,
                        half_offset,
                    )?;
                    tracing::debug!(
                        "[{}] half offset {} undecided, pulled op records up to {}",
                        queue,
                        i,
                        pull_result.next_begin_offset
                    );
                    continue;
                }
            }

            new_half_offset = i + 1;
            i += 1;
        }

        if new_half_offset != half_offset {
            self.bridge.write_consume_offset(queue, new_half_offset);
        }
        let new_op_offset = calculate_op_offset(&mut state.done_op_offset, op_offset);
        if new_op_offset != op_offset {
            self.bridge.write_consume_offset(op_queue, new_op_offset);
        }

        if new_half_offset != half_offset || new_op_offset != op_offset {
            Ok(QueueProgress::Advanced)
        } else {
            Ok(QueueProgress::Deferred)
        }
    }

    fn get_half(&self, queue: &MessageQueue, offset: i64) -> Result<GetResult> {
        let pull = self.bridge.pull_half(queue, offset, HALF_PULL_BATCH)?;
        let msg = pull.messages.first().cloned();
        Ok(GetResult { pull, msg })
    }

    /// The persisted check count is authoritative: it was written by the
    /// re-append of back-check number N, so reaching the maximum means the
    /// last permitted check has already been dispatched.
    fn needs_discard(&self, half: &StoredMessage) -> bool {
        let Some(raw) = half.property(keys::TRANSACTION_CHECK_TIMES) else {
            return false;
        };
        let times = parse_long(raw);
        if times >= self.transaction_check_max as i64 {
            tracing::info!(
                "half message reached {} checks, discarding: id={}",
                times,
                half.msg_id
            );
            true
        } else {
            false
        }
    }

    fn needs_skip(&self, half: &StoredMessage) -> bool {
        let age = Timestamp::now().millis_since(half.born_ts());
        if age > self.file_reserved_ms {
            tracing::info!(
                "half message older than the retention window, skipping: id={} born={}",
                half.msg_id,
                half.born_ts()
            );
            true
        } else {
            false
        }
    }

    /// Immunity handling for a half that carries an explicit immunity
    /// window. Returns true when the scanner may advance past it.
    ///
    /// A first-seen copy is re-appended with its own offset stamped as
    /// `PreparedQueueOffset`. A copy whose stamped predecessor shows up in
    /// `remove_map` is resolved transitively: the producer already
    /// committed or rolled back the earlier copy. Anything else is
    /// re-appended again, pushing the chain one hop forward.
    fn check_prepare_queue_offset(
        &self,
        state: &mut ScanState,
        half: &StoredMessage,
        check_immunity_ms: i64,
    ) -> bool {
        let age = Timestamp::now().millis_since(half.born_ts());
        if age >= check_immunity_ms {
            return true;
        }

        match half.property(keys::TRANSACTION_PREPARED_QUEUE_OFFSET) {
            None => self.put_immunity_back(half),
            Some(raw) => {
                let prepared_offset = parse_long(raw);
                if prepared_offset == -1 {
                    false
                } else if let Some(done_op) = state.remove_map.remove(&prepared_offset) {
                    state.done_op_offset.push(done_op);
                    true
                } else {
                    self.put_immunity_back(half)
                }
            }
        }
    }

    /// Re-append `half` with its check count incremented, returning the
    /// stored copy to hand to the listener
    fn put_back_half(&self, half: &StoredMessage, offset: i64) -> Option<StoredMessage> {
        let mut renewed = self.bridge.renew_half(half);
        let dispatched = stored_check_times(half) + 1;
        renewed.set_property(keys::TRANSACTION_CHECK_TIMES, dispatched.to_string());

        match self.bridge.append_half(renewed.clone()) {
            Ok(receipt) => {
                tracing::info!(
                    "send check message: offset {} re-appended at queue offset {} commit log offset {} new id {} uniq key {:?}",
                    offset,
                    receipt.queue_offset,
                    receipt.commit_log_offset,
                    receipt.msg_id,
                    renewed.property(keys::UNIQ_KEY)
                );
                Some(StoredMessage {
                    message: renewed,
                    queue_offset: receipt.queue_offset,
                    commit_log_offset: receipt.commit_log_offset,
                    store_ts: receipt.store_ts,
                    msg_id: receipt.msg_id,
                })
            }
            Err(e) => {
                tracing::error!(
                    "half re-append failed: topic={} queue={} id={}: {}",
                    half.topic(),
                    half.queue_id(),
                    half.msg_id,
                    e
                );
                None
            }
        }
    }

    fn put_immunity_back(&self, half: &StoredMessage) -> bool {
        let renewed = self.bridge.renew_immunity_half(half);
        match self.bridge.append_half(renewed) {
            Ok(receipt) => {
                tracing::info!(
                    "immunity half re-appended: offset {} -> {}, new id {}",
                    half.queue_offset,
                    receipt.queue_offset,
                    receipt.msg_id
                );
                true
            }
            Err(e) => {
                tracing::warn!("immunity half re-append failed: id={}: {}", half.msg_id, e);
                false
            }
        }
    }
}

/// Producer-requested immunity window in milliseconds; `-1` and malformed
/// values both fall back to the broker's transaction timeout
fn immunity_millis(raw: &str, transaction_timeout_ms: i64) -> i64 {
    let seconds = parse_long(raw);
    if seconds == -1 {
        transaction_timeout_ms
    } else {
        seconds * 1_000
    }
}

fn stored_check_times(half: &StoredMessage) -> i64 {
    half.property(keys::TRANSACTION_CHECK_TIMES)
        .map(parse_long)
        .unwrap_or(0)
}
