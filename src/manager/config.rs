//! Manager and per-connection configuration.
//!
//! [`ManagerConfig`] holds pool-wide settings and deserializes from any
//! serde source, with every field defaulted. [`OpenOptions`] overrides a
//! subset of them for one connection.
//!
//! # Example
//!
//! ```ignore
//! use wsmux::{ManagerConfig, OpenOptions};
//!
//! let config: ManagerConfig = serde_json::from_str(r#"{ "max_connections": 8 }"#)?;
//! config.validate()?;
//!
//! let options = OpenOptions::new()
//!     .with_heartbeat_interval(Duration::from_secs(10))
//!     .with_max_reconnect_attempts(3);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Largest accepted liveness interval (one day).
pub(crate) const MAX_HEARTBEAT_INTERVAL_MS: u64 = 86_400_000;

// ============================================================================
// Defaults
// ============================================================================

fn default_max_connections() -> usize {
    3
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> Option<u64> {
    Some(30_000)
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_resubscribe_on_reconnect() -> bool {
    true
}

// ============================================================================
// ManagerConfig
// ============================================================================

/// Pool-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of connection records, reconnecting ones included.
    /// Default: 3
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Liveness interval in milliseconds. A connection idle for more than
    /// twice this value is considered stale.
    /// Default: 30000
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Delay before the first reconnect, doubled on every further attempt.
    /// Default: 1000
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Upper bound on the reconnect delay. `None` leaves it unbounded.
    /// Default: 30000
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: Option<u64>,

    /// Random jitter applied to reconnect delays, as a fraction in
    /// `[0.0, 1.0]`.
    /// Default: 0.0 (exact delays)
    #[serde(default)]
    pub reconnect_jitter: f64,

    /// Reconnect attempts allowed before the connection is given up.
    /// Default: 5
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Re-send every remembered subscription after a reconnect.
    /// Default: true
    #[serde(default = "default_resubscribe_on_reconnect")]
    pub resubscribe_on_reconnect: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_jitter: 0.0,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            resubscribe_on_reconnect: default_resubscribe_on_reconnect(),
        }
    }
}

impl ManagerConfig {
    /// Checks the configuration for values the manager cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::config("max_connections must be at least 1"));
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(Error::config("heartbeat_interval_ms must be greater than 0"));
        }

        if self.heartbeat_interval_ms > MAX_HEARTBEAT_INTERVAL_MS {
            return Err(Error::config(format!(
                "heartbeat_interval_ms must be at most {MAX_HEARTBEAT_INTERVAL_MS}, got {}",
                self.heartbeat_interval_ms
            )));
        }

        if self.reconnect_base_delay_ms == 0 {
            return Err(Error::config(
                "reconnect_base_delay_ms must be greater than 0",
            ));
        }

        if let Some(max) = self.reconnect_max_delay_ms
            && max < self.reconnect_base_delay_ms
        {
            return Err(Error::config(format!(
                "reconnect_max_delay_ms ({max}) is below reconnect_base_delay_ms ({})",
                self.reconnect_base_delay_ms
            )));
        }

        if !(0.0..=1.0).contains(&self.reconnect_jitter) {
            return Err(Error::config(format!(
                "reconnect_jitter must be within 0.0..=1.0, got {}",
                self.reconnect_jitter
            )));
        }

        Ok(())
    }

    /// Liveness interval.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// First reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    /// Reconnect delay cap.
    #[inline]
    #[must_use]
    pub fn reconnect_max_delay(&self) -> Option<Duration> {
        self.reconnect_max_delay_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// OpenOptions
// ============================================================================

/// Per-connection overrides supplied with `open`.
///
/// Unset fields fall back to the [`ManagerConfig`]. Options are only read
/// when a record is created; reusing an existing connection ignores them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOptions {
    /// Liveness interval override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_ms: Option<u64>,

    /// Reconnect budget override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,

    /// Re-subscription override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resubscribe_on_reconnect: Option<bool>,
}

impl OpenOptions {
    /// Creates options that defer everything to the manager config.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heartbeat_interval_ms: None,
            max_reconnect_attempts: None,
            resubscribe_on_reconnect: None,
        }
    }

    /// Overrides the liveness interval.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Overrides the reconnect budget. Zero disables reconnection.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Overrides re-subscription after reconnect.
    #[inline]
    #[must_use]
    pub fn with_resubscribe_on_reconnect(mut self, enabled: bool) -> Self {
        self.resubscribe_on_reconnect = Some(enabled);
        self
    }

    /// Effective liveness interval. Overrides that are zero or above one
    /// day are ignored.
    #[must_use]
    pub fn heartbeat_interval(&self, config: &ManagerConfig) -> Duration {
        match self.heartbeat_interval_ms {
            Some(ms) if (1..=MAX_HEARTBEAT_INTERVAL_MS).contains(&ms) => Duration::from_millis(ms),
            _ => config.heartbeat_interval(),
        }
    }

    /// Effective reconnect budget.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(&self, config: &ManagerConfig) -> u32 {
        self.max_reconnect_attempts
            .unwrap_or(config.max_reconnect_attempts)
    }

    /// Effective re-subscription flag.
    #[inline]
    #[must_use]
    pub fn resubscribe_on_reconnect(&self, config: &ManagerConfig) -> bool {
        self.resubscribe_on_reconnect
            .unwrap_or(config.resubscribe_on_reconnect)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.reconnect_base_delay(), Duration::from_secs(1));
        assert_eq!(config.reconnect_max_delay(), Some(Duration::from_secs(30)));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert!(config.resubscribe_on_reconnect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: ManagerConfig =
            serde_json::from_str(r#"{ "max_connections": 8, "reconnect_max_delay_ms": null }"#)
                .unwrap();
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.reconnect_max_delay(), None);
        assert_eq!(config.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let config = ManagerConfig {
            max_connections: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_connections"));
    }

    #[test]
    fn test_validate_rejects_unbounded_heartbeat() {
        let config = ManagerConfig {
            heartbeat_interval_ms: u64::MAX,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeat_interval_ms"));

        let config = ManagerConfig {
            heartbeat_interval_ms: MAX_HEARTBEAT_INTERVAL_MS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_open_options_ignore_out_of_range_heartbeat() {
        let config = ManagerConfig::default();
        let options = OpenOptions {
            heartbeat_interval_ms: Some(u64::MAX),
            ..OpenOptions::new()
        };
        assert_eq!(options.heartbeat_interval(&config), Duration::from_secs(30));

        let zero = OpenOptions {
            heartbeat_interval_ms: Some(0),
            ..OpenOptions::new()
        };
        assert_eq!(zero.heartbeat_interval(&config), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_cap_below_base() {
        let config = ManagerConfig {
            reconnect_base_delay_ms: 5_000,
            reconnect_max_delay_ms: Some(1_000),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_jitter_out_of_range() {
        let config = ManagerConfig {
            reconnect_jitter: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_open_options_fall_back() {
        let config = ManagerConfig::default();
        let options = OpenOptions::new();
        assert_eq!(options.heartbeat_interval(&config), Duration::from_secs(30));
        assert_eq!(options.max_reconnect_attempts(&config), 5);
        assert!(options.resubscribe_on_reconnect(&config));
    }

    #[test]
    fn test_open_options_override() {
        let config = ManagerConfig::default();
        let options = OpenOptions::new()
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_max_reconnect_attempts(0)
            .with_resubscribe_on_reconnect(false);
        assert_eq!(options.heartbeat_interval(&config), Duration::from_secs(5));
        assert_eq!(options.max_reconnect_attempts(&config), 0);
        assert!(!options.resubscribe_on_reconnect(&config));
    }

    #[test]
    fn test_open_options_serialize_compactly() {
        let json = serde_json::to_string(&OpenOptions::new().with_max_reconnect_attempts(2)).unwrap();
        assert_eq!(json, r#"{"max_reconnect_attempts":2}"#);
    }
}
