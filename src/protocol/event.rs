//! Manager → host events.
//!
//! Every state change the manager makes is reported as an [`Event`].
//! Events for one connection are emitted in the order their transitions
//! happened; no ordering is implied across connections.
//!
//! # Event Types
//!
//! | Group | Events |
//! |-------|--------|
//! | Pool | `opened`, `connection_reused`, `pool_exhausted`, `not_found` |
//! | Subscriptions | `subscribed`, `queued`, `unsubscribed` |
//! | Traffic | `message_received` |
//! | Lifecycle | `closed`, `reconnect_attempt`, `reconnect_exhausted`, `shutdown_complete` |
//! | Errors | `connection_error`, `internal_error` |

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::identifiers::{Address, ConnectionId, CorrelationId};

use super::Descriptor;

// ============================================================================
// Payload
// ============================================================================

/// Inbound message payload.
///
/// Text that parses as JSON is delivered structured; anything else is
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Text frame holding valid JSON.
    Json(Value),
    /// Text frame that failed to decode.
    Raw(String),
    /// Binary frame, base64 encoded when serialized.
    Binary(#[serde(serialize_with = "serialize_base64")] Vec<u8>),
}

impl Payload {
    /// Returns the structured value, if decoding succeeded.
    #[inline]
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

// ============================================================================
// SubscriptionAction
// ============================================================================

/// Which subscription operation a queued frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionAction {
    /// `subscribe`
    Subscribe,
    /// `unsubscribe`
    Unsubscribe,
}

// ============================================================================
// Event
// ============================================================================

/// A notification from the manager to the host.
///
/// # Format
///
/// ```json
/// { "type": "reconnect_attempt", "id": 1, "attempt": 2, "delay_ms": 2000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Transport reached `Open`.
    Opened {
        /// Connection id.
        id: ConnectionId,
        /// Remote endpoint.
        address: Address,
    },

    /// `open` matched an existing record; no transport was created.
    ConnectionReused {
        /// Existing connection id.
        id: ConnectionId,
        /// Remote endpoint.
        address: Address,
    },

    /// `open` rejected because the pool is full.
    PoolExhausted {
        /// Rejected address.
        address: String,
    },

    /// Command referenced an id with no record.
    NotFound {
        /// Unknown id.
        id: ConnectionId,
    },

    /// Subscription frame was sent on an open transport.
    Subscribed {
        /// Connection id.
        id: ConnectionId,
        /// Subscription payload.
        descriptor: Descriptor,
    },

    /// Frame buffered until the connection opens.
    Queued {
        /// Connection id.
        id: ConnectionId,
        /// Subscription payload.
        descriptor: Descriptor,
        /// Operation that was queued.
        action: SubscriptionAction,
    },

    /// Unsubscription frame was sent on an open transport.
    Unsubscribed {
        /// Connection id.
        id: ConnectionId,
        /// Subscription payload.
        descriptor: Descriptor,
    },

    /// Inbound application message.
    MessageReceived {
        /// Connection id.
        id: ConnectionId,
        /// Decoded or raw payload.
        payload: Payload,
        /// Receive time.
        timestamp: DateTime<Utc>,
    },

    /// Transport or command failure scoped to one connection.
    ConnectionError {
        /// Connection id, absent when no record was created.
        id: Option<ConnectionId>,
        /// Remote endpoint.
        address: String,
        /// Error classification.
        kind: ErrorKind,
        /// Human readable description.
        error: String,
    },

    /// Transport closed.
    Closed {
        /// Connection id.
        id: ConnectionId,
        /// WebSocket close code, when one was received or sent.
        code: Option<u16>,
        /// Close reason.
        reason: String,
        /// Whether the close was clean (no reconnection follows).
        clean: bool,
    },

    /// A reconnection attempt has started.
    ReconnectAttempt {
        /// Connection id.
        id: ConnectionId,
        /// 1-based attempt number.
        attempt: u32,
        /// Backoff delay that preceded this attempt.
        delay_ms: u64,
    },

    /// Reconnection budget exhausted; the record was destroyed.
    ReconnectExhausted {
        /// Destroyed connection id.
        id: ConnectionId,
    },

    /// `shutdown_all` finished closing every connection.
    ShutdownComplete,

    /// Unexpected failure inside the manager.
    InternalError {
        /// Description.
        error: String,
    },
}

impl Event {
    /// Returns the connection this event concerns, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            Self::Opened { id, .. }
            | Self::ConnectionReused { id, .. }
            | Self::NotFound { id }
            | Self::Subscribed { id, .. }
            | Self::Queued { id, .. }
            | Self::Unsubscribed { id, .. }
            | Self::MessageReceived { id, .. }
            | Self::Closed { id, .. }
            | Self::ReconnectAttempt { id, .. }
            | Self::ReconnectExhausted { id } => Some(*id),
            Self::ConnectionError { id, .. } => *id,
            Self::PoolExhausted { .. } | Self::ShutdownComplete | Self::InternalError { .. } => {
                None
            }
        }
    }

    /// Returns the wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "opened",
            Self::ConnectionReused { .. } => "connection_reused",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::NotFound { .. } => "not_found",
            Self::Subscribed { .. } => "subscribed",
            Self::Queued { .. } => "queued",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::MessageReceived { .. } => "message_received",
            Self::ConnectionError { .. } => "connection_error",
            Self::Closed { .. } => "closed",
            Self::ReconnectAttempt { .. } => "reconnect_attempt",
            Self::ReconnectExhausted { .. } => "reconnect_exhausted",
            Self::ShutdownComplete => "shutdown_complete",
            Self::InternalError { .. } => "internal_error",
        }
    }
}

// ============================================================================
// EventEnvelope
// ============================================================================

/// An event plus the correlation id of the command that triggered it.
///
/// Events caused by timers or the transport carry no correlation id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    /// Correlation id of the triggering command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationId>,

    /// The event.
    #[serde(flatten)]
    pub event: Event,
}

// ============================================================================
// Tests
// ============================================================================
