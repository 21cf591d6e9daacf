//! Request envelope and command outcome.
//!
//! Every command travels inside a [`Request`] carrying a [`CorrelationId`].
//! Events produced while handling the command echo that id.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::{ConnectionId, CorrelationId};

use super::Command;

// ============================================================================
// Request
// ============================================================================

/// A command tagged with its correlation id.
///
/// # Format
///
/// ```json
/// {
///   "correlation": "uuid",
///   "type": "close",
///   "id": 4
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id echoed on resulting events.
    pub correlation: CorrelationId,

    /// The command itself.
    #[serde(flatten)]
    pub command: Command,
}

impl Request {
    /// Creates a new request with auto-generated correlation id.
    #[inline]
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            correlation: CorrelationId::generate(),
            command,
        }
    }

    /// Creates a new request with specific correlation id.
    #[inline]
    #[must_use]
    pub fn with_correlation(correlation: CorrelationId, command: Command) -> Self {
        Self {
            correlation,
            command,
        }
    }
}

// ============================================================================
// CommandOutcome
// ============================================================================

/// Successful result of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// `open` resolved to this connection (new or reused).
    Connection(ConnectionId),
    /// Command applied, queued, or was a no-op.
    Done,
}

impl CommandOutcome {
    /// Returns the connection id, if any.
    #[inline]
    #[must_use]
    pub const fn connection_id(self) -> Option<ConnectionId> {
        match self {
            Self::Connection(id) => Some(id),
            Self::Done => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
