//! Op-record index for a single half-queue scan
//!
//! Each scan tick rebuilds its decision state from the two logs: the
//! [`ScanState`] maps half offsets known resolved by an op record
//! (`remove_map`) and collects op offsets that are finished with
//! (`done_op_offset`). Nothing survives across ticks; a cache of per-half
//! state would only ever be a hint.

use crate::error::Result;
use ferrymq_common::{MessageQueue, REMOVE_TAG};
use ferrymq_store::{PullResult, PullStatus, StoreBridge};
use std::collections::HashMap;

/// Op records pulled per call; callers re-invoke when more evidence is
/// needed, so each call stays bounded in work and memory
pub const OP_PULL_BATCH: usize = 32;

/// Transient per-queue scan state, rebuilt on every tick
#[derive(Debug, Default)]
pub struct ScanState {
    /// Half offsets resolved by some op record: half offset -> op offset.
    /// Duplicate op records for the same half overwrite (last wins); the
    /// value is only ever moved into `done_op_offset`.
    pub remove_map: HashMap<i64, i64>,

    /// Op offsets whose work is done: their half offset was already below
    /// the scan floor, or their `remove_map` entry was consumed
    pub done_op_offset: Vec<i64>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Pull a batch of op records and index them into `state`.
///
/// `half_floor` is the half queue's consume offset at scan start: op
/// records naming a half below it are already consumed past and only their
/// own op offset matters. On a rejected op offset the op queue's consume
/// offset is forwarded past the gap.
pub fn fill_op_remove_map<B: StoreBridge>(
    bridge: &B,
    state: &mut ScanState,
    op_queue: &MessageQueue,
    pull_offset: i64,
    half_floor: i64,
) -> Result<PullResult> {
    let pull = bridge.pull_op(op_queue, pull_offset, OP_PULL_BATCH)?;

    match pull.status {
        PullStatus::OffsetIllegal | PullStatus::NoMatchedMsg => {
            tracing::warn!(
                "[{}] op offset {} rejected ({:?}), forwarding consume offset to {}",
                op_queue,
                pull_offset,
                pull.status,
                pull.next_begin_offset
            );
            bridge.write_consume_offset(op_queue, pull.next_begin_offset);
            return Ok(pull);
        }
        PullStatus::NoNewMsg => {
            tracing::debug!("[{}] no op records at offset {}", op_queue, pull_offset);
            return Ok(pull);
        }
        PullStatus::Found => {}
    }

    if pull.messages.is_empty() {
        tracing::warn!("[{}] op pull at {} returned no messages", op_queue, pull_offset);
        return Ok(pull);
    }

    for op in &pull.messages {
        if op.message.tag.as_deref() != Some(REMOVE_TAG) {
            tracing::error!(
                "[{}] unexpected tag {:?} on op offset {}",
                op_queue,
                op.message.tag,
                op.queue_offset
            );
            continue;
        }

        let body = String::from_utf8_lossy(&op.message.body);
        let half_offset = parse_long(&body);
        tracing::debug!(
            "[{}] op offset {} names half offset {}",
            op_queue,
            op.queue_offset,
            half_offset
        );

        if half_offset < half_floor {
            state.done_op_offset.push(op.queue_offset);
        } else {
            state.remove_map.insert(half_offset, op.queue_offset);
        }
    }

    Ok(pull)
}

/// Advance the op consume offset over the contiguous prefix of processed
/// op offsets.
///
/// Sorts `done_op_offset` ascending and counts how many elements match
/// `old_offset, old_offset + 1, ...` exactly; the first gap stops the
/// advance, leaving later offsets for a future tick.
pub fn calculate_op_offset(done_op_offset: &mut Vec<i64>, old_offset: i64) -> i64 {
    done_op_offset.sort_unstable();
    let mut new_offset = old_offset;
    for &offset in done_op_offset.iter() {
        if offset == new_offset {
            new_offset += 1;
        } else {
            break;
        }
    }
    new_offset
}

/// Parse an ASCII decimal, logging and returning the `-1` sentinel on
/// malformed input
pub(crate) fn parse_long(raw: &str) -> i64 {
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::error!("malformed decimal value: {:?}", raw);
            -1
        }
    }
}
