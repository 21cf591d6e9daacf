//! Connection manager.
//!
//! A single task owns every connection record and applies commands,
//! transport signals and timer signals to them one at a time.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Manager loop, [`ManagerHandle`], [`EventStream`] |
//! | `builder` | [`ManagerBuilder`] |
//! | `config` | [`ManagerConfig`], [`OpenOptions`] |
//! | `pool` | Record registry and dispatcher |
//! | `record` | Per-connection state |
//! | `buffer` | Outbound queue for not-yet-open connections |
//! | `liveness` | Heartbeat and staleness |
//! | `backoff` | Reconnect delays |
//! | `timer` | Cancellable timer tasks |

// ============================================================================
// Submodules
// ============================================================================

mod backoff;
mod buffer;
mod builder;
mod config;
mod core;
mod liveness;
mod pool;
mod record;
mod timer;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::ReconnectPolicy;
pub use builder::ManagerBuilder;
pub use config::{ManagerConfig, OpenOptions};
pub use core::{EventStream, Manager, ManagerHandle};
pub use record::{ConnectionInfo, ConnectionState};
