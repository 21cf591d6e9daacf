//! Host → manager commands.
//!
//! | Command | Fields | Effect |
//! |---------|--------|--------|
//! | `open` | address, options | Create or reuse a connection |
//! | `subscribe` | id, descriptor | Send now or queue until open |
//! | `unsubscribe` | id, descriptor | Send now or queue until open |
//! | `close` | id | Tear down, idempotent |
//! | `shutdown_all` | - | Close everything, stop the manager |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::ConnectionId;
use crate::manager::OpenOptions;

// ============================================================================
// Descriptor
// ============================================================================

/// Host-supplied subscription request payload.
///
/// Membership in a connection's subscription set is by JSON equality.
pub type Descriptor = Value;

// ============================================================================
// Command
// ============================================================================

/// A command issued by the host.
///
/// # Format
///
/// ```json
/// { "type": "subscribe", "id": 3, "descriptor": { "topic": "trades" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Open a connection or reuse the existing one for `address`.
    Open {
        /// Remote endpoint URL.
        address: String,
        /// Per-connection overrides.
        #[serde(default)]
        options: OpenOptions,
    },

    /// Subscribe a connection to `descriptor`.
    Subscribe {
        /// Target connection.
        id: ConnectionId,
        /// Subscription payload.
        descriptor: Descriptor,
    },

    /// Unsubscribe a connection from `descriptor`.
    Unsubscribe {
        /// Target connection.
        id: ConnectionId,
        /// Subscription payload.
        descriptor: Descriptor,
    },

    /// Close a connection. Unknown ids are a no-op.
    Close {
        /// Target connection.
        id: ConnectionId,
    },

    /// Close every connection and stop the manager.
    ShutdownAll,
}

impl Command {
    /// Returns the wire name of the command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Close { .. } => "close",
            Self::ShutdownAll => "shutdown_all",
        }
    }

    /// Returns the target connection, if the command addresses one.
    #[must_use]
    pub const fn target(&self) -> Option<ConnectionId> {
        match self {
            Self::Subscribe { id, .. } | Self::Unsubscribe { id, .. } | Self::Close { id } => {
                Some(*id)
            }
            Self::Open { .. } | Self::ShutdownAll => None,
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

    #[test]
    fn test_subscribe_wire_format() {
        let command = Command::Subscribe {
            id: ConnectionId::from_raw(3),
            descriptor: json!({ "topic": "a" }),
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(
            value,
            json!({ "type": "subscribe", "id": 3, "descriptor": { "topic": "a" } })
        );
    }

    #[test]
    fn test_open_defaults_options() {
        let command: Command =
            serde_json::from_value(json!({ "type": "open", "address": "wss://x" })).unwrap();
        match command {
            Command::Open { address, options } => {
                assert_eq!(address, "wss://x");
                assert_eq!(options, OpenOptions::default());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_shutdown_all_parses() {
        let command: Command = serde_json::from_value(json!({ "type": "shutdown_all" })).unwrap();
        assert_eq!(command, Command::ShutdownAll);
        assert_eq!(command.name(), "shutdown_all");
        assert_eq!(command.target(), None);
    }

    #[test]
    fn test_target() {
        let id = ConnectionId::from_raw(9);
        assert_eq!(Command::Close { id }.target(), Some(id));
    }
}
