//! Error types for the connection manager.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wsmux::{Result, Error};
//!
//! async fn example(handle: &ManagerHandle) -> Result<()> {
//!     let id = handle.open("wss://stream.example.com").await?;
//!     handle.subscribe(id, serde_json::json!({ "topic": "trades" })).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Pool | [`Error::PoolExhausted`], [`Error::NotFound`], [`Error::InvalidAddress`] |
//! | Transport | [`Error::TransportOpen`], [`Error::TransportSend`], [`Error::ReconnectExhausted`] |
//! | Payload | [`Error::Decode`] |
//! | Lifecycle | [`Error::Config`], [`Error::ManagerStopped`], [`Error::Internal`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde::Serialize;
use thiserror::Error;

use crate::identifiers::ConnectionId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Every failure is scoped to a single connection or a single command.
/// Nothing here is process-fatal.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Pool Errors
    // ========================================================================
    /// The pool already holds `max_connections` records.
    ///
    /// Not retried by the manager. The host must close a connection first.
    #[error("Connection pool exhausted ({max} connections), rejected: {address}")]
    PoolExhausted {
        /// Address that was rejected.
        address: String,
        /// Configured pool bound.
        max: usize,
    },

    /// No connection record exists for the given id.
    #[error("Connection not found: {id}")]
    NotFound {
        /// The unknown connection id.
        id: ConnectionId,
    },

    /// Address could not be parsed as a URL.
    #[error("Invalid address '{address}': {message}")]
    InvalidAddress {
        /// The rejected input.
        address: String,
        /// Parser message.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Transport could not be opened.
    ///
    /// Counted against the reconnect budget of the connection.
    #[error("Failed to open transport to {address}: {message}")]
    TransportOpen {
        /// Remote address.
        address: String,
        /// Description of the failure.
        message: String,
    },

    /// A frame could not be handed to the transport.
    #[error("Failed to send on connection {id}: {message}")]
    TransportSend {
        /// Connection the send was issued on.
        id: ConnectionId,
        /// Description of the failure.
        message: String,
    },

    /// Reconnection budget exhausted; the logical connection is gone.
    #[error("Reconnect attempts exhausted for connection {id} after {attempts} attempts")]
    ReconnectExhausted {
        /// The destroyed connection.
        id: ConnectionId,
        /// Attempts performed.
        attempts: u32,
    },

    // ========================================================================
    // Payload Errors
    // ========================================================================
    /// Inbound payload could not be decoded.
    ///
    /// Never drops the message: the raw payload is still delivered.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when manager configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// The manager loop is no longer running.
    #[error("Connection manager stopped")]
    ManagerStopped,

    /// The manager answered a command in a way the handle did not expect.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// ErrorKind
// ============================================================================

/// Serializable classification of an [`enum@Error`], carried in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`Error::PoolExhausted`].
    PoolExhausted,
    /// See [`Error::NotFound`].
    NotFound,
    /// See [`Error::InvalidAddress`].
    InvalidAddress,
    /// See [`Error::TransportOpen`].
    TransportOpen,
    /// See [`Error::TransportSend`].
    TransportSend,
    /// Transport failed after it was opened (socket error, abnormal close).
    Transport,
    /// See [`Error::ReconnectExhausted`].
    ReconnectExhausted,
    /// See [`Error::Decode`].
    Decode,
    /// Anything else.
    Internal,
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a pool exhausted error.
    #[inline]
    pub fn pool_exhausted(address: impl Into<String>, max: usize) -> Self {
        Self::PoolExhausted {
            address: address.into(),
            max,
        }
    }

    /// Creates a not found error.
    #[inline]
    pub fn not_found(id: ConnectionId) -> Self {
        Self::NotFound { id }
    }

    /// Creates an invalid address error.
    #[inline]
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a transport open error.
    #[inline]
    pub fn transport_open(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransportOpen {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a transport send error.
    #[inline]
    pub fn transport_send(id: ConnectionId, message: impl Into<String>) -> Self {
        Self::TransportSend {
            id,
            message: message.into(),
        }
    }

    /// Creates a reconnect exhausted error.
    #[inline]
    pub fn reconnect_exhausted(id: ConnectionId, attempts: u32) -> Self {
        Self::ReconnectExhausted { id, attempts }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the serializable kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PoolExhausted { .. } => ErrorKind::PoolExhausted,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            Self::TransportOpen { .. } => ErrorKind::TransportOpen,
            Self::TransportSend { .. } => ErrorKind::TransportSend,
            Self::ReconnectExhausted { .. } => ErrorKind::ReconnectExhausted,
            Self::Decode { .. } | Self::Json(_) => ErrorKind::Decode,
            Self::Config { .. } | Self::ManagerStopped | Self::Internal { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::TransportOpen { .. }
                | Self::TransportSend { .. }
                | Self::ReconnectExhausted { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed if the host retries the command later.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransportSend { .. } | Self::TransportOpen { .. } | Self::NotFound { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
