//! Builder pattern for manager configuration.
//!
//! Provides a fluent API for configuring and spawning a [`Manager`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wsmux::Manager;
//!
//! # async fn example() -> wsmux::Result<()> {
//! let (handle, events) = Manager::builder()
//!     .max_connections(8)
//!     .heartbeat_interval(Duration::from_secs(15))
//!     .max_reconnect_attempts(10)
//!     .spawn_websocket()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::protocol::{FrameCodec, JsonCodec};
use crate::transport::{Connector, WebSocketConnector};

use super::config::ManagerConfig;
use super::core::{EventStream, Manager, ManagerHandle};

// ============================================================================
// ManagerBuilder
// ============================================================================

/// Builder for configuring a [`Manager`].
///
/// Use [`Manager::builder()`] to create a new builder.
#[derive(Clone)]
pub struct ManagerBuilder {
    /// Pool-wide settings.
    config: ManagerConfig,
    /// Subscription and heartbeat encoding.
    codec: Arc<dyn FrameCodec>,
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self {
            config: ManagerConfig::default(),
            codec: Arc::new(JsonCodec),
        }
    }
}

impl fmt::Debug for ManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ManagerBuilder Implementation
// ============================================================================

impl ManagerBuilder {
    /// Creates a builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the maximum number of connection records.
    #[inline]
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Sets the liveness interval.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval_ms = duration_ms(interval);
        self
    }

    /// Sets the first reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_base_delay_ms = duration_ms(delay);
        self
    }

    /// Caps the reconnect delay. `None` removes the cap.
    #[inline]
    #[must_use]
    pub fn reconnect_max_delay(mut self, cap: Option<Duration>) -> Self {
        self.config.reconnect_max_delay_ms = cap.map(duration_ms);
        self
    }

    /// Sets the reconnect jitter fraction.
    #[inline]
    #[must_use]
    pub fn reconnect_jitter(mut self, factor: f64) -> Self {
        self.config.reconnect_jitter = factor;
        self
    }

    /// Sets the reconnect budget.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Enables or disables re-subscription after reconnect.
    #[inline]
    #[must_use]
    pub fn resubscribe_on_reconnect(mut self, enabled: bool) -> Self {
        self.config.resubscribe_on_reconnect = enabled;
        self
    }

    /// Sets the frame codec.
    #[inline]
    #[must_use]
    pub fn codec(mut self, codec: impl FrameCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Returns the configuration built so far.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &ManagerConfig {
        &self.config
    }

    /// Validates the configuration and starts the manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration
    /// is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(self, connector: impl Connector) -> Result<(ManagerHandle, EventStream)> {
        self.config.validate()?;
        Ok(Manager::spawn(self.config, Arc::new(connector), self.codec))
    }

    /// Starts the manager over WebSocket transports.
    ///
    /// # Errors
    ///
    /// See [`spawn`](Self::spawn).
    pub fn spawn_websocket(self) -> Result<(ManagerHandle, EventStream)> {
        self.spawn(WebSocketConnector::new())
    }
}

/// Converts a duration to whole milliseconds, saturating.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
