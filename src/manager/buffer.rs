//! Outbound message buffer.
//!
//! Frames produced by `subscribe`/`unsubscribe` while a connection is not
//! open wait here and are drained, in order, on the transition to open.

use std::collections::VecDeque;

use crate::protocol::{Descriptor, SubscriptionAction};

/// An encoded frame waiting for the transport to open.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingFrame {
    pub action: SubscriptionAction,
    pub descriptor: Descriptor,
    pub text: String,
}

/// Per-connection FIFO of pending frames.
#[derive(Debug, Default)]
pub(crate) struct OutboundBuffer {
    queue: VecDeque<PendingFrame>,
}

impl OutboundBuffer {
    pub(crate) fn enqueue(&mut self, frame: PendingFrame) {
        self.queue.push_back(frame);
    }

    /// Removes every frame, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<PendingFrame> {
        self.queue.drain(..).collect()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
