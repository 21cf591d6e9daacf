//! Background timers owned by connection records.
//!
//! Timers never touch connection state. They only post a [`TimerSignal`]
//! into the manager loop, which re-validates it against the record's
//! current generation before acting.

// ============================================================================
// Imports
// ============================================================================

use tokio::task::JoinHandle;

use crate::identifiers::ConnectionId;

// ============================================================================
// TimerSignal
// ============================================================================

/// Signal posted by a timer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerSignal {
    /// Liveness interval elapsed.
    HeartbeatTick {
        id: ConnectionId,
        generation: u64,
    },
    /// Reconnect backoff elapsed.
    ReconnectDue {
        id: ConnectionId,
        generation: u64,
    },
}

// ============================================================================
// Timer
// ============================================================================

/// A spawned timer task, aborted on drop.
#[derive(Debug)]
pub(crate) struct Timer {
    task: JoinHandle<()>,
}

impl Timer {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// TimerSlot
// ============================================================================

/// Holds at most one active timer.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    active: Option<Timer>,
}

impl TimerSlot {
    /// Installs `timer`, aborting the previous one first.
    pub(crate) fn set(&mut self, timer: Timer) {
        self.cancel();
        self.active = Some(timer);
    }

    /// Aborts the active timer. Returns `true` if one was active.
    pub(crate) fn cancel(&mut self) -> bool {
        self.active.take().is_some()
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::sync::oneshot;

    /// Spawns a timer that reports through `tx` if it is ever allowed to finish.
    fn sleeper(tx: oneshot::Sender<()>) -> Timer {
        Timer::new(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.send(());
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_cancels_previous() {
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();

        let mut slot = TimerSlot::default();
        slot.set(sleeper(first_tx));
        slot.set(sleeper(second_tx));
        assert!(slot.is_active());

        // The aborted timer drops its sender without sending
        assert!(first_rx.await.is_err());
        assert!(second_rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts() {
        let (tx, rx) = oneshot::channel();
        let mut slot = TimerSlot::default();
        slot.set(sleeper(tx));

        assert!(slot.cancel());
        assert!(!slot.cancel());
        assert!(!slot.is_active());
        assert!(rx.await.is_err());
    }
}
