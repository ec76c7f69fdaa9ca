//! Back-check dispatch seam
//!
//! The scanner decides *that* a half message needs a back-check or has been
//! abandoned; the listener decides *how* that is communicated to the
//! producer side. Implementations must not block: the scanner calls these
//! methods from its sequential per-queue loop.

use ferrymq_common::StoredMessage;
use tokio::sync::mpsc;

/// Receives the scanner's per-half decisions
pub trait CheckListener: Send + Sync {
    /// A back-check is required for `half`; issue the producer-facing
    /// check RPC asynchronously. The half has already been re-appended at
    /// a higher offset with its check count incremented.
    fn resolve_half(&self, half: StoredMessage);

    /// `half` has been permanently abandoned (too many checks, or older
    /// than the retention window)
    fn resolve_discard(&self, half: StoredMessage);
}

/// A scanner decision forwarded to the dispatch side
#[derive(Debug, Clone)]
pub enum CheckEvent {
    /// Ask the producer group for the transaction outcome
    BackCheck(StoredMessage),
    /// The half was abandoned
    Discard(StoredMessage),
}

/// Listener that forwards decisions over an unbounded channel
///
/// The send never blocks, so the scanner keeps its budget regardless of how
/// slow the consuming side is. A dropped receiver is logged and the event
/// discarded; the half will be re-examined on a later tick anyway.
pub struct ChannelCheckListener {
    events: mpsc::UnboundedSender<CheckEvent>,
}

impl ChannelCheckListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CheckEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl CheckListener for ChannelCheckListener {
    fn resolve_half(&self, half: StoredMessage) {
        if self.events.send(CheckEvent::BackCheck(half)).is_err() {
            tracing::warn!("back-check receiver dropped, event discarded");
        }
    }

    fn resolve_discard(&self, half: StoredMessage) {
        if self.events.send(CheckEvent::Discard(half)).is_err() {
            tracing::warn!("back-check receiver dropped, discard event lost");
        }
    }
}
