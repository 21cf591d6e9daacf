//! Reconnection scheduler.
//!
//! `delay = base × 2^attempts`, optionally capped and jittered. With the
//! cap removed and jitter at zero the sequence is exactly
//! `base, 2·base, 4·base, ...`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;

use crate::identifiers::ConnectionId;

use super::config::ManagerConfig;
use super::timer::{Timer, TimerSignal};

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Exponential backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect.
    pub base_delay: Duration,
    /// Upper bound on any delay. `None` means unbounded.
    pub max_delay: Option<Duration>,
    /// Jitter factor in `[0.0, 1.0]`. Zero disables jitter.
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ManagerConfig::default())
    }
}

impl ReconnectPolicy {
    /// Builds the policy described by `config`.
    #[must_use]
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            base_delay: config.reconnect_base_delay(),
            max_delay: config.reconnect_max_delay(),
            jitter_factor: config.reconnect_jitter,
        }
    }

    /// Returns the delay before the reconnect that follows `attempts`
    /// previous attempts.
    #[must_use]
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        let mut delay_ms = base_ms.saturating_mul(factor);

        if let Some(max) = self.max_delay {
            let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
            delay_ms = delay_ms.min(max_ms);
        }

        if self.jitter_factor > 0.0 && delay_ms > 0 {
            let range = delay_ms as f64 * self.jitter_factor;
            let offset = rand::rng().random_range(-range..=range);
            delay_ms = (delay_ms as f64 + offset).max(1.0) as u64;
        }

        Duration::from_millis(delay_ms)
    }
}

/// Starts a one-shot reconnect timer.
pub(crate) fn schedule_reconnect(
    id: ConnectionId,
    generation: u64,
    delay: Duration,
    timer_tx: mpsc::UnboundedSender<TimerSignal>,
) -> Timer {
    Timer::new(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = timer_tx.send(TimerSignal::ReconnectDue { id, generation });
    }))
}

// ============================================================================
// Tests
// ============================================================================
