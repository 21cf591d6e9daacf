//! Transport boundary.
//!
//! The manager needs four primitives from a transport: open an address,
//! send a frame, close cleanly or abruptly, and report open/message/error/
//! close back. This module defines that boundary and ships the WebSocket
//! implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  TransportHandle (Outbound)  ┌──────────────────┐
//! │  Manager loop    │─────────────────────────────►│  Transport task  │
//! │  (single owner)  │◄─────────────────────────────│  (per handle)    │
//! └──────────────────┘  TransportSink (Signal)      └──────────────────┘
//! ```
//!
//! Every handle is tagged with the `generation` it was opened under.
//! Signals from a superseded generation are dropped by the manager, so a
//! late close from an old socket never disturbs its replacement.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | `tokio-tungstenite` connector and event loop |

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::{Address, ConnectionId};

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket transport.
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::WebSocketConnector;

// ============================================================================
// Frame
// ============================================================================

/// A transport-level message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Binary(Vec<u8>),
    /// Ping control frame.
    Ping(Vec<u8>),
    /// Pong control frame.
    Pong(Vec<u8>),
}

impl Frame {
    /// Returns the text content, if this is a text frame.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Instructions from the manager to a transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write a frame.
    Frame(Frame),
    /// Close the transport. `clean` selects a close handshake over an abort.
    Close {
        /// Whether to perform a clean close.
        clean: bool,
    },
}

// ============================================================================
// TransportHandle
// ============================================================================

/// Manager-side handle to one transport instance.
///
/// Sending never blocks: frames are queued to the transport task, which
/// writes them in order.
#[derive(Debug)]
pub struct TransportHandle {
    /// Connection the handle belongs to.
    id: ConnectionId,
    /// Channel into the transport task.
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

impl TransportHandle {
    /// Creates a handle and the receiver the transport task drains.
    #[must_use]
    pub fn pair(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (Self { id, outbound_tx }, outbound_rx)
    }

    /// Queues a frame for the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportSend`] if the transport task has stopped.
    pub fn send(&self, frame: Frame) -> Result<()> {
        self.outbound_tx
            .send(Outbound::Frame(frame))
            .map_err(|_| Error::transport_send(self.id, "transport is not running"))
    }

    /// Asks the transport to close. Never fails.
    pub fn close(&self, clean: bool) {
        if self.outbound_tx.send(Outbound::Close { clean }).is_err() {
            trace!(id = %self.id, "Close requested on stopped transport");
        }
    }

    /// Returns `true` if the transport task has gone away.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound_tx.is_closed()
    }
}

// ============================================================================
// TransportEvent / TransportSignal
// ============================================================================

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Transport is ready for frames.
    Opened,
    /// Inbound frame, control frames included.
    Message(Frame),
    /// Transport failed. Nothing further follows from this handle.
    Error(String),
    /// Transport closed. Nothing further follows from this handle.
    Closed {
        /// Close code, if known.
        code: Option<u16>,
        /// Close reason.
        reason: String,
        /// Whether the peer closed cleanly.
        clean: bool,
    },
}

/// A [`TransportEvent`] addressed to a connection and generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSignal {
    /// Connection the transport belongs to.
    pub id: ConnectionId,
    /// Handle generation the event came from.
    pub generation: u64,
    /// The event.
    pub event: TransportEvent,
}

// ============================================================================
// TransportSink
// ============================================================================

/// Reporting side handed to a transport on connect.
#[derive(Debug, Clone)]
pub struct TransportSink {
    id: ConnectionId,
    generation: u64,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
}

impl TransportSink {
    /// Creates a sink reporting into `signal_tx`.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        generation: u64,
        signal_tx: mpsc::UnboundedSender<TransportSignal>,
    ) -> Self {
        Self {
            id,
            generation,
            signal_tx,
        }
    }

    /// Connection this sink reports for.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Handle generation this sink reports for.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Reports that the transport is open.
    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    /// Reports an inbound frame.
    pub fn message(&self, frame: Frame) {
        self.emit(TransportEvent::Message(frame));
    }

    /// Reports a transport failure.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(TransportEvent::Error(message.into()));
    }

    /// Reports a close.
    pub fn closed(&self, code: Option<u16>, reason: impl Into<String>, clean: bool) {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
            clean,
        });
    }

    fn emit(&self, event: TransportEvent) {
        let signal = TransportSignal {
            id: self.id,
            generation: self.generation,
            event,
        };

        if self.signal_tx.send(signal).is_err() {
            trace!(id = %self.id, "Manager gone, dropping transport signal");
        }
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens transports.
///
/// `connect` must not block: it returns a handle right away and reports
/// progress through the sink.
pub trait Connector: Send + Sync + 'static {
    /// Starts opening a transport to `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportOpen`] when the attempt cannot even be
    /// started. The manager treats it like an asynchronous open failure.
    fn connect(&self, address: &Address, sink: TransportSink) -> Result<TransportHandle>;
}

// ============================================================================
// Tests
// ============================================================================
