//! Pool manager and dispatcher.
//!
//! Owns every [`ConnectionRecord`], keyed by id and by address, and applies
//! commands, transport signals and timer signals to them. The pool is only
//! ever touched by the manager loop, so records need no locks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                    Pool                      │
//! │  by_address: wss://a/ → conn-1               │
//! │              wss://b/ → conn-2               │
//! │  by_id:      conn-1 → ConnectionRecord       │
//! │              conn-2 → ConnectionRecord       │
//! └──────────────────────────────────────────────┘
//!        ▲ commands    ▲ transport    ▲ timers
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::identifiers::{Address, ConnectionId, CorrelationId};
use crate::protocol::{
    Command, CommandOutcome, Descriptor, Event, EventEnvelope, FrameCodec, Request,
    SubscriptionAction,
};
use crate::transport::{
    Connector, Frame, TransportEvent, TransportSignal, TransportSink,
};

use super::backoff::{ReconnectPolicy, schedule_reconnect};
use super::buffer::PendingFrame;
use super::config::{ManagerConfig, OpenOptions};
use super::liveness::{self, Liveness};
use super::record::{ConnectionInfo, ConnectionRecord, ConnectionState};
use super::timer::TimerSignal;

// ============================================================================
// Constants
// ============================================================================

/// Close code sent when the host closes a connection.
const CLOSE_NORMAL: u16 = 1000;

// ============================================================================
// Types
// ============================================================================

/// Read-only mirror of every record, published for [`ManagerHandle`](super::ManagerHandle).
pub(crate) type Snapshot = Arc<RwLock<FxHashMap<ConnectionId, ConnectionInfo>>>;

// ============================================================================
// EventSink
// ============================================================================

/// Outbound event channel to the host.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    events_tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl EventSink {
    pub(crate) fn new(events_tx: mpsc::UnboundedSender<EventEnvelope>) -> Self {
        Self { events_tx }
    }

    pub(crate) fn emit(&self, correlation: Option<CorrelationId>, event: Event) {
        trace!(event = event.name(), "Emitting event");
        if self
            .events_tx
            .send(EventEnvelope { correlation, event })
            .is_err()
        {
            trace!("Event receiver dropped");
        }
    }
}

// ============================================================================
// Pool
// ============================================================================

/// All connection records plus the collaborators needed to drive them.
pub(crate) struct Pool {
    config: ManagerConfig,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    codec: Arc<dyn FrameCodec>,

    by_address: FxHashMap<Address, ConnectionId>,
    by_id: FxHashMap<ConnectionId, ConnectionRecord>,

    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    timer_tx: mpsc::UnboundedSender<TimerSignal>,
    events: EventSink,
    snapshot: Snapshot,
}

// ============================================================================
// Pool - Constructor
// ============================================================================

impl Pool {
    pub(crate) fn new(
        config: ManagerConfig,
        connector: Arc<dyn Connector>,
        codec: Arc<dyn FrameCodec>,
        signal_tx: mpsc::UnboundedSender<TransportSignal>,
        timer_tx: mpsc::UnboundedSender<TimerSignal>,
        events: EventSink,
        snapshot: Snapshot,
    ) -> Self {
        Self {
            policy: ReconnectPolicy::from_config(&config),
            config,
            connector,
            codec,
            by_address: FxHashMap::default(),
            by_id: FxHashMap::default(),
            signal_tx,
            timer_tx,
            events,
            snapshot,
        }
    }

    /// Number of live records.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }
}

// ============================================================================
// Pool - Commands
// ============================================================================

impl Pool {
    /// Applies one host command.
    pub(crate) fn handle_command(&mut self, request: Request) -> Result<CommandOutcome> {
        let correlation = Some(request.correlation);
        trace!(
            command = request.command.name(),
            correlation = %request.correlation,
            "Dispatching command"
        );

        match request.command {
            Command::Open { address, options } => self
                .open(correlation, &address, options)
                .map(CommandOutcome::Connection),

            Command::Subscribe { id, descriptor } => self
                .apply_subscription(correlation, id, descriptor, SubscriptionAction::Subscribe)
                .map(|()| CommandOutcome::Done),

            Command::Unsubscribe { id, descriptor } => self
                .apply_subscription(
                    correlation,
                    id,
                    descriptor,
                    SubscriptionAction::Unsubscribe,
                )
                .map(|()| CommandOutcome::Done),

            Command::Close { id } => {
                self.close(correlation, id);
                Ok(CommandOutcome::Done)
            }

            Command::ShutdownAll => {
                self.shutdown_all(correlation);
                Ok(CommandOutcome::Done)
            }
        }
    }

    /// Opens a connection to `raw_address` or reuses the existing one.
    fn open(
        &mut self,
        correlation: Option<CorrelationId>,
        raw_address: &str,
        options: OpenOptions,
    ) -> Result<ConnectionId> {
        let address = match Address::parse(raw_address) {
            Ok(address) => address,
            Err(e) => {
                warn!(address = raw_address, error = %e, "Rejected open");
                self.events.emit(
                    correlation,
                    Event::ConnectionError {
                        id: None,
                        address: raw_address.to_owned(),
                        kind: e.kind(),
                        error: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        if let Some(&id) = self.by_address.get(&address) {
            debug!(%id, %address, "Reusing existing connection");
            self.events
                .emit(correlation, Event::ConnectionReused { id, address });
            return Ok(id);
        }

        let max = self.config.max_connections;
        if self.by_id.len() >= max {
            warn!(%address, max, "Connection pool exhausted");
            self.events.emit(
                correlation,
                Event::PoolExhausted {
                    address: address.to_string(),
                },
            );
            return Err(Error::pool_exhausted(address.as_str(), max));
        }

        let id = ConnectionId::next();
        self.by_address.insert(address.clone(), id);
        self.by_id
            .insert(id, ConnectionRecord::new(id, address.clone(), options));

        info!(%id, %address, pool = self.by_id.len(), "Connection created");

        self.start_transport(id, correlation);
        Ok(id)
    }

    /// Sends or queues a subscribe/unsubscribe frame.
    fn apply_subscription(
        &mut self,
        correlation: Option<CorrelationId>,
        id: ConnectionId,
        descriptor: Descriptor,
        action: SubscriptionAction,
    ) -> Result<()> {
        let Some(record) = self.by_id.get_mut(&id) else {
            debug!(%id, "Subscription change for unknown connection");
            self.events.emit(correlation, Event::NotFound { id });
            return Err(Error::not_found(id));
        };

        let encoded = match action {
            SubscriptionAction::Subscribe => self.codec.encode_subscribe(&descriptor),
            SubscriptionAction::Unsubscribe => self.codec.encode_unsubscribe(&descriptor),
        };
        let text = match encoded {
            Ok(text) => text,
            Err(e) => {
                warn!(%id, error = %e, "Failed to encode descriptor");
                self.events.emit(
                    correlation,
                    Event::InternalError {
                        error: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        if !record.is_open() {
            if action == SubscriptionAction::Unsubscribe {
                record.remove_subscription(&descriptor);
            }
            record.pending.enqueue(PendingFrame {
                action,
                descriptor: descriptor.clone(),
                text,
            });
            debug!(%id, state = %record.state, pending = record.pending.len(), "Frame queued");
            self.events.emit(
                correlation,
                Event::Queued {
                    id,
                    descriptor,
                    action,
                },
            );
            self.publish(id);
            return Ok(());
        }

        // Already subscribed: acknowledge without resending
        if action == SubscriptionAction::Subscribe && record.has_subscription(&descriptor) {
            self.events
                .emit(correlation, Event::Subscribed { id, descriptor });
            return Ok(());
        }

        if let Err(e) = record.send(Frame::Text(text)) {
            warn!(%id, error = %e, "Failed to send subscription frame");
            self.events.emit(
                correlation,
                Event::ConnectionError {
                    id: Some(id),
                    address: record.address.to_string(),
                    kind: e.kind(),
                    error: e.to_string(),
                },
            );
            return Err(e);
        }

        let event = match action {
            SubscriptionAction::Subscribe => {
                record.add_subscription(descriptor.clone());
                Event::Subscribed { id, descriptor }
            }
            SubscriptionAction::Unsubscribe => {
                record.remove_subscription(&descriptor);
                Event::Unsubscribed { id, descriptor }
            }
        };
        self.events.emit(correlation, event);
        self.publish(id);

        Ok(())
    }

    /// Tears a connection down. Unknown ids are ignored.
    pub(crate) fn close(&mut self, correlation: Option<CorrelationId>, id: ConnectionId) {
        let Some(mut record) = self.remove(id) else {
            debug!(%id, "Close for unknown connection ignored");
            return;
        };

        record.state = ConnectionState::Closing;
        record.cancel_timers();
        record.release_transport(true);
        record.state = ConnectionState::Closed;

        info!(%id, address = %record.address, "Connection closed by host");
        self.events.emit(
            correlation,
            Event::Closed {
                id,
                code: Some(CLOSE_NORMAL),
                reason: "closed by host".to_owned(),
                clean: true,
            },
        );
    }

    /// Closes every connection, then reports completion.
    pub(crate) fn shutdown_all(&mut self, correlation: Option<CorrelationId>) {
        let mut ids: Vec<_> = self.by_id.keys().copied().collect();
        ids.sort_unstable();

        info!(connections = ids.len(), "Shutting down all connections");

        for id in ids {
            self.close(correlation, id);
        }

        self.events.emit(correlation, Event::ShutdownComplete);
    }
}

// ============================================================================
// Pool - Transport Signals
// ============================================================================

impl Pool {
    /// Applies a transport signal, dropping ones from superseded handles.
    pub(crate) fn handle_transport(&mut self, signal: TransportSignal) {
        let TransportSignal {
            id,
            generation,
            event,
        } = signal;

        match self.by_id.get(&id) {
            Some(record) if record.generation == generation => {}
            Some(_) => {
                trace!(%id, generation, "Dropping signal from superseded transport");
                return;
            }
            None => {
                trace!(%id, "Dropping signal for removed connection");
                return;
            }
        }

        match event {
            TransportEvent::Opened => self.on_opened(id),
            TransportEvent::Message(frame) => self.on_frame(id, frame),
            TransportEvent::Error(message) => self.on_transport_error(id, message),
            TransportEvent::Closed {
                code,
                reason,
                clean,
            } => self.on_remote_close(id, code, reason, clean),
        }
    }

    /// `Connecting → Open`.
    fn on_opened(&mut self, id: ConnectionId) {
        let Some(record) = self.by_id.get_mut(&id) else {
            return;
        };
        if record.state != ConnectionState::Connecting {
            return;
        }

        let reconnected = record.opened_before;
        record.state = ConnectionState::Open;
        record.opened_before = true;
        record.reconnect_attempts = 0;
        record.touch(Instant::now());

        info!(%id, address = %record.address, reconnected, "Connection open");
        self.events.emit(
            None,
            Event::Opened {
                id,
                address: record.address.clone(),
            },
        );

        // Subscriptions remembered from before the drop go out first
        let mut resent: Vec<Descriptor> = Vec::new();
        if reconnected && record.options.resubscribe_on_reconnect(&self.config) {
            for descriptor in record.subscriptions().to_vec() {
                let sent = self
                    .codec
                    .encode_subscribe(&descriptor)
                    .and_then(|text| record.send(Frame::Text(text)));

                match sent {
                    Ok(()) => {
                        self.events.emit(
                            None,
                            Event::Subscribed {
                                id,
                                descriptor: descriptor.clone(),
                            },
                        );
                        resent.push(descriptor);
                    }
                    Err(e) => {
                        warn!(%id, error = %e, "Failed to re-subscribe");
                        self.events.emit(
                            None,
                            Event::ConnectionError {
                                id: Some(id),
                                address: record.address.to_string(),
                                kind: e.kind(),
                                error: e.to_string(),
                            },
                        );
                    }
                }
            }
            debug!(%id, count = resent.len(), "Re-subscribed after reconnect");
        }

        if !record.pending.is_empty() {
            debug!(%id, pending = record.pending.len(), "Draining queued frames");
        }
        for pending in record.pending.drain() {
            let PendingFrame {
                action,
                descriptor,
                text,
            } = pending;

            // Covered by the re-subscription above, which already reported it
            if action == SubscriptionAction::Subscribe && resent.contains(&descriptor) {
                trace!(%id, "Queued subscribe already re-sent");
                continue;
            }

            if let Err(e) = record.send(Frame::Text(text)) {
                warn!(%id, error = %e, "Failed to flush queued frame");
                self.events.emit(
                    None,
                    Event::ConnectionError {
                        id: Some(id),
                        address: record.address.to_string(),
                        kind: e.kind(),
                        error: e.to_string(),
                    },
                );
                continue;
            }

            let event = match action {
                SubscriptionAction::Subscribe => {
                    record.add_subscription(descriptor.clone());
                    Event::Subscribed { id, descriptor }
                }
                SubscriptionAction::Unsubscribe => {
                    record.remove_subscription(&descriptor);
                    Event::Unsubscribed { id, descriptor }
                }
            };
            self.events.emit(None, event);
        }

        let interval = record.options.heartbeat_interval(&self.config);
        record.heartbeat.set(liveness::spawn_heartbeat(
            id,
            record.generation,
            interval,
            self.timer_tx.clone(),
        ));

        self.publish(id);
    }

    /// Inbound frame: refresh activity and forward application payloads.
    fn on_frame(&mut self, id: ConnectionId, frame: Frame) {
        let Some(record) = self.by_id.get_mut(&id) else {
            return;
        };
        record.touch(Instant::now());

        if let Some(payload) = self.codec.decode(frame) {
            self.events.emit(
                None,
                Event::MessageReceived {
                    id,
                    payload,
                    timestamp: Utc::now(),
                },
            );
        }
    }

    fn on_transport_error(&mut self, id: ConnectionId, message: String) {
        let Some(record) = self.by_id.get(&id) else {
            return;
        };

        let kind = if record.state == ConnectionState::Connecting {
            ErrorKind::TransportOpen
        } else {
            ErrorKind::Transport
        };

        warn!(%id, address = %record.address, ?kind, error = %message, "Transport failed");
        self.events.emit(
            None,
            Event::ConnectionError {
                id: Some(id),
                address: record.address.to_string(),
                kind,
                error: message.clone(),
            },
        );

        self.enter_unclean_close(id, None, message);
    }

    fn on_remote_close(&mut self, id: ConnectionId, code: Option<u16>, reason: String, clean: bool) {
        if !clean {
            self.enter_unclean_close(id, code, reason);
            return;
        }

        let Some(mut record) = self.remove(id) else {
            return;
        };
        record.cancel_timers();
        record.handle = None;
        record.state = ConnectionState::Closed;

        info!(%id, address = %record.address, ?code, "Connection closed cleanly by remote");
        self.events.emit(
            None,
            Event::Closed {
                id,
                code,
                reason,
                clean: true,
            },
        );
    }
}

// ============================================================================
// Pool - Timers
// ============================================================================

impl Pool {
    /// Applies a timer signal, dropping ones that no longer match the record.
    pub(crate) fn handle_timer(&mut self, signal: TimerSignal) {
        match signal {
            TimerSignal::HeartbeatTick { id, generation } => self.on_heartbeat(id, generation),
            TimerSignal::ReconnectDue { id, generation } => self.on_reconnect_due(id, generation),
        }
    }

    fn on_heartbeat(&mut self, id: ConnectionId, generation: u64) {
        let Some(record) = self.by_id.get_mut(&id) else {
            return;
        };
        if record.generation != generation || !record.is_open() {
            return;
        }

        let interval = record.options.heartbeat_interval(&self.config);
        let now = Instant::now();

        match liveness::check(record.last_activity_at, now, interval) {
            Liveness::Stale { idle } => {
                warn!(%id, idle_ms = idle.as_millis() as u64, "Connection stale, forcing close");
                self.enter_unclean_close(id, None, "stale connection".to_owned());
            }
            Liveness::Alive => match record.send(self.codec.heartbeat()) {
                Ok(()) => {
                    record.touch(now);
                    trace!(%id, "Heartbeat sent");
                }
                Err(e) => {
                    debug!(%id, error = %e, "Heartbeat send failed");
                    self.events.emit(
                        None,
                        Event::ConnectionError {
                            id: Some(id),
                            address: record.address.to_string(),
                            kind: ErrorKind::TransportSend,
                            error: e.to_string(),
                        },
                    );
                }
            },
        }
    }

    /// `Closed(unclean) → Connecting`.
    fn on_reconnect_due(&mut self, id: ConnectionId, generation: u64) {
        let Some(record) = self.by_id.get_mut(&id) else {
            return;
        };
        if record.generation != generation || record.state != ConnectionState::Closed {
            return;
        }

        record.reconnect.cancel();
        record.reconnect_attempts += 1;
        let attempt = record.reconnect_attempts;
        let delay_ms = u64::try_from(record.pending_delay.as_millis()).unwrap_or(u64::MAX);

        info!(%id, address = %record.address, attempt, delay_ms, "Reconnecting");
        self.events.emit(
            None,
            Event::ReconnectAttempt {
                id,
                attempt,
                delay_ms,
            },
        );

        self.start_transport(id, None);
    }
}

// ============================================================================
// Pool - Internals
// ============================================================================

impl Pool {
    /// Asks the connector for a fresh transport under a new generation.
    fn start_transport(&mut self, id: ConnectionId, correlation: Option<CorrelationId>) {
        let Some(record) = self.by_id.get_mut(&id) else {
            return;
        };

        let generation = record.next_generation();
        record.state = ConnectionState::Connecting;
        let sink = TransportSink::new(id, generation, self.signal_tx.clone());

        match self.connector.connect(&record.address, sink) {
            Ok(handle) => {
                record.handle = Some(handle);
                debug!(%id, generation, "Transport requested");
                self.publish(id);
            }
            Err(e) => {
                warn!(%id, address = %record.address, error = %e, "Transport open failed");
                self.events.emit(
                    correlation,
                    Event::ConnectionError {
                        id: Some(id),
                        address: record.address.to_string(),
                        kind: ErrorKind::TransportOpen,
                        error: e.to_string(),
                    },
                );
                self.enter_unclean_close(id, None, e.to_string());
            }
        }
    }

    /// Unclean close: report, then schedule a reconnect or give up.
    fn enter_unclean_close(&mut self, id: ConnectionId, code: Option<u16>, reason: String) {
        let Some(record) = self.by_id.get_mut(&id) else {
            return;
        };

        record.heartbeat.cancel();
        record.release_transport(false);
        let generation = record.next_generation();
        record.state = ConnectionState::Closed;

        self.events.emit(
            None,
            Event::Closed {
                id,
                code,
                reason,
                clean: false,
            },
        );

        let max_attempts = record.options.max_reconnect_attempts(&self.config);
        if record.reconnect_attempts < max_attempts {
            let delay = self.policy.delay_for(record.reconnect_attempts);
            record.pending_delay = delay;
            record.reconnect.set(schedule_reconnect(
                id,
                generation,
                delay,
                self.timer_tx.clone(),
            ));

            debug!(
                %id,
                attempts = record.reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnect scheduled"
            );
            self.publish(id);
            return;
        }

        let attempts = record.reconnect_attempts;
        if let Some(mut record) = self.remove(id) {
            record.cancel_timers();
        }

        let err = Error::reconnect_exhausted(id, attempts);
        warn!(%id, error = %err, "Giving up on connection");
        self.events.emit(None, Event::ReconnectExhausted { id });
    }

    /// Removes a record from both maps and the snapshot.
    fn remove(&mut self, id: ConnectionId) -> Option<ConnectionRecord> {
        let record = self.by_id.remove(&id)?;
        self.by_address.remove(&record.address);
        self.snapshot.write().remove(&id);
        Some(record)
    }

    /// Mirrors the record into the snapshot.
    fn publish(&self, id: ConnectionId) {
        if let Some(record) = self.by_id.get(&id) {
            self.snapshot.write().insert(id, record.info());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
