//! Command/event protocol between the host and the manager.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Host → Manager | Command plus correlation id |
//! | `EventEnvelope` | Manager → Host | State change notification |
//!
//! Both directions serialize to JSON objects tagged by `type`, so hosts
//! living across a process boundary can drive the manager too.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions |
//! | `event` | Event, payload and envelope types |
//! | `request` | Request envelope and outcomes |
//! | `codec` | Subscription and heartbeat frame encoding |

// ============================================================================
// Submodules
// ============================================================================

/// Frame codec for subscriptions and heartbeats.
pub mod codec;

/// Host commands.
pub mod command;

/// Manager events.
pub mod event;

/// Request envelope.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{FrameCodec, JsonCodec};
pub use command::{Command, Descriptor};
pub use event::{Event, EventEnvelope, Payload, SubscriptionAction};
pub use request::{CommandOutcome, Request};
