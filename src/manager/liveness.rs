//! Liveness monitor.
//!
//! While a connection is open a heartbeat timer ticks every `interval`.
//! Each tick either declares the connection stale (idle for more than two
//! intervals) or sends a probe. A failed probe is not fatal; the next
//! tick's staleness check decides.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::identifiers::ConnectionId;

use super::timer::{Timer, TimerSignal};

// ============================================================================
// Constants
// ============================================================================

/// Idle time, in intervals, after which a connection is stale.
const STALE_AFTER_INTERVALS: u32 = 2;

// ============================================================================
// Liveness
// ============================================================================

/// Outcome of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    /// Recent enough; send a probe.
    Alive,
    /// No activity for `idle`; force an unclean close.
    Stale { idle: Duration },
}

/// Classifies a connection given its last activity.
pub(crate) fn check(last_activity_at: Instant, now: Instant, interval: Duration) -> Liveness {
    let idle = now.saturating_duration_since(last_activity_at);

    if idle > interval.saturating_mul(STALE_AFTER_INTERVALS) {
        Liveness::Stale { idle }
    } else {
        Liveness::Alive
    }
}

/// Starts the heartbeat timer for one open connection.
///
/// The first tick fires one full `interval` after start.
pub(crate) fn spawn_heartbeat(
    id: ConnectionId,
    generation: u64,
    interval: Duration,
    timer_tx: mpsc::UnboundedSender<TimerSignal>,
) -> Timer {
    Timer::new(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if timer_tx
                .send(TimerSignal::HeartbeatTick { id, generation })
                .is_err()
            {
                break;
            }
        }
    }))
}

// ============================================================================
// Tests
// ============================================================================
