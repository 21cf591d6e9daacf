//! wsmux - Multiplexed reconnecting WebSocket connection manager.
//!
//! A host opens logical connections to remote streaming endpoints,
//! attaches subscriptions to them, and receives their messages as events.
//! The manager keeps at most one connection per address, bounds the pool,
//! probes liveness, and reconnects with exponential backoff while
//! replaying subscriptions.
//!
//! # Architecture
//!
//! The manager is a single task that owns every connection record:
//!
//! - **Host side**: [`ManagerHandle`] sends commands, [`EventStream`] yields events
//! - **Transport side**: a [`Connector`] opens transports that report back
//!   through a [`transport::TransportSink`]
//!
//! Key design principles:
//!
//! - One record per normalized [`Address`], deduplicated on `open`
//! - Commands, transport signals and timers are serialized through one loop
//! - Transport handles carry a generation; superseded handles are ignored
//! - Frames sent before a connection opens are queued and drained in order
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use wsmux::{Event, Manager, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (handle, mut events) = Manager::builder()
//!         .max_connections(3)
//!         .spawn_websocket()?;
//!
//!     let id = handle.open("wss://stream.example.com/ws").await?;
//!     handle.subscribe(id, json!({ "topic": "trades" })).await?;
//!
//!     while let Some(envelope) = events.recv().await {
//!         if let Event::MessageReceived { payload, .. } = envelope.event {
//!             println!("{payload:?}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`manager`] | Manager loop, handle, configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Connection ids, correlation ids, addresses |
//! | [`protocol`] | Commands, events, frame codec |
//! | [`transport`] | Transport boundary and WebSocket connector |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers keep connection ids, correlation ids and addresses apart.
pub mod identifiers;

/// Connection manager.
///
/// Use [`Manager::builder()`] to configure and start one.
pub mod manager;

/// Command and event protocol.
///
/// Host-facing message types and the subscription frame codec.
pub mod protocol;

/// Transport layer.
///
/// The [`Connector`] boundary and its WebSocket implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Manager types
pub use manager::{
    ConnectionInfo, ConnectionState, EventStream, Manager, ManagerBuilder, ManagerConfig,
    ManagerHandle, OpenOptions, ReconnectPolicy,
};

// Protocol types
pub use protocol::{
    Command, CommandOutcome, Descriptor, Event, EventEnvelope, FrameCodec, JsonCodec, Payload,
    Request, SubscriptionAction,
};

// Transport types
pub use transport::{Connector, Frame, WebSocketConnector};

// Error types
pub use error::{Error, ErrorKind, Result};

// Identifier types
pub use identifiers::{Address, ConnectionId, CorrelationId};
