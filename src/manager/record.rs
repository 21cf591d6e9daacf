//! Per-connection state.
//!
//! A [`ConnectionRecord`] lives from `open` until explicit close, shutdown,
//! clean remote close or reconnect exhaustion. Its id survives reconnects;
//! its transport handle does not.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::identifiers::{Address, ConnectionId};
use crate::protocol::Descriptor;
use crate::transport::{Frame, TransportHandle};

use super::buffer::OutboundBuffer;
use super::config::OpenOptions;
use super::timer::TimerSlot;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection record.
///
/// ```text
/// Connecting ──► Open ──► Closing ──► Closed
///     ▲                                  │ unclean
///     └──────────── reconnect ───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Transport requested, not yet open.
    Connecting,
    /// Transport open; frames flow.
    Open,
    /// Explicit teardown in progress.
    Closing,
    /// Transport gone; a reconnect may be pending.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ConnectionInfo
// ============================================================================

/// Read-only view of a connection record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    /// Connection id.
    pub id: ConnectionId,
    /// Remote endpoint.
    pub address: Address,
    /// Current state.
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open.
    pub reconnect_attempts: u32,
    /// Active subscriptions, in insertion order.
    pub subscriptions: Vec<Descriptor>,
    /// Frames waiting for the connection to open.
    pub pending: usize,
    /// Whether a reconnect is scheduled.
    pub reconnect_pending: bool,
}

// ============================================================================
// ConnectionRecord
// ============================================================================

/// One logical connection.
#[derive(Debug)]
pub(crate) struct ConnectionRecord {
    pub id: ConnectionId,
    pub address: Address,
    pub options: OpenOptions,
    pub state: ConnectionState,
    /// Current transport, replaced on each reconnect.
    pub handle: Option<TransportHandle>,
    /// Bumped whenever the current handle is replaced or invalidated.
    pub generation: u64,
    pub last_activity_at: Instant,
    pub reconnect_attempts: u32,
    /// Whether the record has reached `Open` at least once.
    pub opened_before: bool,
    /// Delay of the reconnect currently scheduled.
    pub pending_delay: Duration,
    subscriptions: Vec<Descriptor>,
    pub pending: OutboundBuffer,
    pub heartbeat: TimerSlot,
    pub reconnect: TimerSlot,
}

impl ConnectionRecord {
    pub(crate) fn new(id: ConnectionId, address: Address, options: OpenOptions) -> Self {
        Self {
            id,
            address,
            options,
            state: ConnectionState::Connecting,
            handle: None,
            generation: 0,
            last_activity_at: Instant::now(),
            reconnect_attempts: 0,
            opened_before: false,
            pending_delay: Duration::ZERO,
            subscriptions: Vec::new(),
            pending: OutboundBuffer::default(),
            heartbeat: TimerSlot::default(),
            reconnect: TimerSlot::default(),
        }
    }

    /// Invalidates outstanding transport and timer signals.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    #[inline]
    pub(crate) fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    #[inline]
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_activity_at = now;
    }

    /// Sends a frame on the current transport.
    pub(crate) fn send(&self, frame: Frame) -> Result<()> {
        match &self.handle {
            Some(handle) => handle.send(frame),
            None => Err(Error::transport_send(self.id, "no transport attached")),
        }
    }

    /// Drops the current transport, closing it first.
    pub(crate) fn release_transport(&mut self, clean: bool) {
        if let Some(handle) = self.handle.take() {
            handle.close(clean);
        }
    }

    /// Cancels both timers.
    pub(crate) fn cancel_timers(&mut self) {
        self.heartbeat.cancel();
        self.reconnect.cancel();
    }

    #[inline]
    pub(crate) fn subscriptions(&self) -> &[Descriptor] {
        &self.subscriptions
    }

    #[inline]
    pub(crate) fn has_subscription(&self, descriptor: &Descriptor) -> bool {
        self.subscriptions.contains(descriptor)
    }

    /// Adds a subscription. Returns `false` if already present.
    pub(crate) fn add_subscription(&mut self, descriptor: Descriptor) -> bool {
        if self.has_subscription(&descriptor) {
            return false;
        }
        self.subscriptions.push(descriptor);
        true
    }

    /// Removes a subscription. Returns `false` if it was absent.
    pub(crate) fn remove_subscription(&mut self, descriptor: &Descriptor) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|existing| existing != descriptor);
        self.subscriptions.len() != before
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            address: self.address.clone(),
            state: self.state,
            reconnect_attempts: self.reconnect_attempts,
            subscriptions: self.subscriptions.clone(),
            pending: self.pending.len(),
            reconnect_pending: self.reconnect.is_active(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::transport::Outbound;

    fn record() -> ConnectionRecord {
        ConnectionRecord::new(
            ConnectionId::from_raw(1),
            Address::parse("wss://x").unwrap(),
            OpenOptions::default(),
        )
    }

    #[test]
    fn test_new_record_is_connecting() {
        let record = record();
        assert_eq!(record.state, ConnectionState::Connecting);
        assert_eq!(record.reconnect_attempts, 0);
        assert!(!record.opened_before);
        assert!(record.pending.is_empty());
        assert!(!record.heartbeat.is_active());
        assert!(!record.reconnect.is_active());
    }

    #[test]
    fn test_subscriptions_are_unique_and_ordered() {
        let mut record = record();
        assert!(record.add_subscription(json!({ "topic": "a" })));
        assert!(record.add_subscription(json!({ "topic": "b" })));
        assert!(!record.add_subscription(json!({ "topic": "a" })));
        assert_eq!(
            record.subscriptions(),
            &[json!({ "topic": "a" }), json!({ "topic": "b" })]
        );

        assert!(record.remove_subscription(&json!({ "topic": "a" })));
        assert!(!record.remove_subscription(&json!({ "topic": "a" })));
        assert_eq!(record.subscriptions(), &[json!({ "topic": "b" })]);
    }

    #[test]
    fn test_send_without_transport_fails() {
        let record = record();
        let err = record.send(Frame::Text("x".into())).unwrap_err();
        assert!(matches!(err, Error::TransportSend { .. }));
    }

    #[test]
    fn test_release_transport_closes_handle() {
        let mut record = record();
        let (handle, mut outbound_rx) = TransportHandle::pair(record.id);
        record.handle = Some(handle);

        record.release_transport(false);

        assert!(record.handle.is_none());
        assert_eq!(outbound_rx.try_recv().unwrap(), Outbound::Close { clean: false });
    }

    #[test]
    fn test_generation_increments() {
        let mut record = record();
        assert_eq!(record.next_generation(), 1);
        assert_eq!(record.next_generation(), 2);
        assert_eq!(record.generation, 2);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_info_snapshot() {
        let mut record = record();
        record.add_subscription(json!("ticker"));
        let info = record.info();
        assert_eq!(info.id, record.id);
        assert_eq!(info.state, ConnectionState::Connecting);
        assert_eq!(info.subscriptions, vec![json!("ticker")]);
        assert_eq!(info.pending, 0);
        assert!(!info.reconnect_pending);
    }
}
