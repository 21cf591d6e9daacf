//! Manager loop and host-facing handle.
//!
//! [`Manager::spawn`] starts a single task that owns the [`Pool`] and
//! serializes everything that can touch it: host commands, transport
//! signals and timer signals. The host talks to it through a cloneable
//! [`ManagerHandle`] and observes it through an [`EventStream`].
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use wsmux::Manager;
//!
//! # async fn example() -> wsmux::Result<()> {
//! let (handle, mut events) = Manager::builder()
//!     .max_connections(4)
//!     .spawn_websocket()?;
//!
//! let id = handle.open("wss://stream.example.com/ws").await?;
//! handle.subscribe(id, json!({ "topic": "trades" })).await?;
//!
//! while let Some(envelope) = events.recv().await {
//!     println!("{:?}", envelope.event);
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, CorrelationId};
use crate::protocol::{Command, CommandOutcome, Descriptor, EventEnvelope, FrameCodec, Request};
use crate::transport::{Connector, TransportSignal};

use super::builder::ManagerBuilder;
use super::config::{ManagerConfig, OpenOptions};
use super::pool::{EventSink, Pool, Snapshot};
use super::record::ConnectionInfo;
use super::timer::TimerSignal;

// ============================================================================
// Types
// ============================================================================

/// A request together with the channel its outcome is returned on.
struct PendingRequest {
    request: Request,
    reply_tx: oneshot::Sender<Result<CommandOutcome>>,
}

// ============================================================================
// Manager
// ============================================================================

/// The manager task.
///
/// Not constructed directly; use [`Manager::builder`] or [`Manager::spawn`].
pub struct Manager {
    pool: Pool,
    requests_rx: mpsc::UnboundedReceiver<PendingRequest>,
    signal_rx: mpsc::UnboundedReceiver<TransportSignal>,
    timer_rx: mpsc::UnboundedReceiver<TimerSignal>,
}

impl Manager {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Starts the manager on the current tokio runtime.
    ///
    /// The configuration is used as given; [`ManagerBuilder`] validates it
    /// first.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(
        config: ManagerConfig,
        connector: Arc<dyn Connector>,
        codec: Arc<dyn FrameCodec>,
    ) -> (ManagerHandle, EventStream) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let snapshot = Snapshot::default();

        info!(
            max_connections = config.max_connections,
            heartbeat_ms = config.heartbeat_interval_ms,
            max_reconnect_attempts = config.max_reconnect_attempts,
            "Starting connection manager"
        );

        let pool = Pool::new(
            config,
            connector,
            codec,
            signal_tx,
            timer_tx,
            EventSink::new(events_tx),
            Arc::clone(&snapshot),
        );

        let manager = Self {
            pool,
            requests_rx,
            signal_rx,
            timer_rx,
        };
        tokio::spawn(manager.run());

        let handle = ManagerHandle {
            inner: Arc::new(HandleInner {
                requests_tx,
                snapshot,
            }),
        };

        (handle, EventStream { events_rx })
    }

    /// Runs until `ShutdownAll` or until every handle is dropped.
    async fn run(mut self) {
        debug!("Manager loop started");

        loop {
            tokio::select! {
                biased;

                Some(signal) = self.signal_rx.recv() => {
                    self.pool.handle_transport(signal);
                }

                Some(signal) = self.timer_rx.recv() => {
                    self.pool.handle_timer(signal);
                }

                pending = self.requests_rx.recv() => {
                    let Some(PendingRequest { request, reply_tx }) = pending else {
                        debug!("All handles dropped, shutting down");
                        self.pool.shutdown_all(None);
                        break;
                    };

                    let stop = matches!(request.command, Command::ShutdownAll);
                    let outcome = self.pool.handle_command(request);
                    let _ = reply_tx.send(outcome);

                    if stop {
                        break;
                    }
                }
            }
        }

        info!(remaining = self.pool.len(), "Manager loop terminated");
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("connections", &self.pool.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ManagerHandle
// ============================================================================

struct HandleInner {
    requests_tx: mpsc::UnboundedSender<PendingRequest>,
    snapshot: Snapshot,
}

/// Cloneable handle for issuing commands to a running manager.
///
/// Every command method resolves once the manager has applied the command.
/// Events caused by the command are already on the [`EventStream`] by then.
#[derive(Clone)]
pub struct ManagerHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerHandle")
            .field("running", &self.is_running())
            .field("connection_count", &self.connection_count())
            .finish()
    }
}

// ============================================================================
// ManagerHandle - Commands
// ============================================================================

impl ManagerHandle {
    /// Sends a request and waits for its outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::ManagerStopped`] if the manager is no longer running
    /// - Any error produced by the command itself
    pub async fn dispatch(&self, request: Request) -> Result<CommandOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.inner
            .requests_tx
            .send(PendingRequest { request, reply_tx })
            .map_err(|_| Error::ManagerStopped)?;

        reply_rx.await.map_err(|_| Error::ManagerStopped)?
    }

    /// Sends a command under a fresh correlation id.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn request(&self, command: Command) -> Result<CommandOutcome> {
        self.dispatch(Request::new(command)).await
    }

    /// Sends a command under a caller-chosen correlation id.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn request_with(
        &self,
        correlation: CorrelationId,
        command: Command,
    ) -> Result<CommandOutcome> {
        self.dispatch(Request::with_correlation(correlation, command))
            .await
    }

    /// Opens a connection, or returns the existing one for the address.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] if `address` does not parse
    /// - [`Error::PoolExhausted`] if the pool is full
    pub async fn open(&self, address: impl Into<String>) -> Result<ConnectionId> {
        self.open_with(address, OpenOptions::default()).await
    }

    /// Opens a connection with per-connection overrides.
    ///
    /// Options are ignored when an existing connection is reused.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub async fn open_with(
        &self,
        address: impl Into<String>,
        options: OpenOptions,
    ) -> Result<ConnectionId> {
        let outcome = self
            .request(Command::Open {
                address: address.into(),
                options,
            })
            .await?;

        outcome
            .connection_id()
            .ok_or_else(|| Error::internal("open resolved without a connection id"))
    }

    /// Subscribes, or queues the subscription until the connection opens.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `id` is unknown
    /// - [`Error::TransportSend`] if the open transport rejected the frame
    pub async fn subscribe(&self, id: ConnectionId, descriptor: Descriptor) -> Result<()> {
        self.request(Command::Subscribe { id, descriptor })
            .await
            .map(drop)
    }

    /// Unsubscribes, or queues the request until the connection opens.
    ///
    /// # Errors
    ///
    /// See [`subscribe`](Self::subscribe).
    pub async fn unsubscribe(&self, id: ConnectionId, descriptor: Descriptor) -> Result<()> {
        self.request(Command::Unsubscribe { id, descriptor })
            .await
            .map(drop)
    }

    /// Closes a connection. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManagerStopped`] if the manager is no longer running.
    pub async fn close(&self, id: ConnectionId) -> Result<()> {
        self.request(Command::Close { id }).await.map(drop)
    }

    /// Closes every connection and stops the manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManagerStopped`] if the manager already stopped.
    pub async fn shutdown_all(&self) -> Result<()> {
        self.request(Command::ShutdownAll).await.map(drop)
    }
}

// ============================================================================
// ManagerHandle - Queries
// ============================================================================

impl ManagerHandle {
    /// Returns every connection, ordered by id.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<_> = self.inner.snapshot.read().values().cloned().collect();
        infos.sort_unstable_by_key(|info| info.id);
        infos
    }

    /// Returns one connection.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.inner.snapshot.read().get(&id).cloned()
    }

    /// Returns the number of connection records.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.snapshot.read().len()
    }

    /// Returns `true` while the manager accepts commands.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.inner.requests_tx.is_closed()
    }
}

// ============================================================================
// EventStream
// ============================================================================

/// Events emitted by the manager, in emission order.
///
/// Ends once the manager has stopped and every queued event was read.
#[derive(Debug)]
pub struct EventStream {
    events_rx: mpsc::UnboundedReceiver<EventEnvelope>,
}

impl EventStream {
    /// Waits for the next event.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.events_rx.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.events_rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = EventEnvelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events_rx.poll_recv(cx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::StreamExt;
    use serde_json::json;
    use tokio::time::{Instant, timeout};
    use tokio_test::{assert_err, assert_ok};

    use crate::error::ErrorKind;
    use crate::manager::ConnectionState;
    use crate::protocol::{Event, JsonCodec, Payload, SubscriptionAction};
    use crate::transport::mock::{MockConnector, MockLink, next_link};
    use crate::transport::{Frame, Outbound};

    struct Fixture {
        handle: ManagerHandle,
        events: EventStream,
        connector: MockConnector,
        links: mpsc::UnboundedReceiver<MockLink>,
    }

    impl Fixture {
        fn new(config: ManagerConfig) -> Self {
            let (connector, links) = MockConnector::new();
            let (handle, events) =
                Manager::spawn(config, Arc::new(connector.clone()), Arc::new(JsonCodec));
            Self {
                handle,
                events,
                connector,
                links,
            }
        }

        async fn next_event(&mut self) -> Event {
            timeout(Duration::from_secs(600), self.events.recv())
                .await
                .expect("event in time")
                .expect("manager running")
                .event
        }

        /// Skips heartbeat failures and returns the next other event.
        async fn next_significant(&mut self) -> Event {
            loop {
                match self.next_event().await {
                    Event::ConnectionError {
                        kind: ErrorKind::TransportSend,
                        ..
                    } => continue,
                    event => return event,
                }
            }
        }

        async fn link(&mut self) -> MockLink {
            next_link(&mut self.links).await
        }

        /// Opens `address` and drives its first transport to open.
        async fn open_live(&mut self, address: &str) -> (ConnectionId, MockLink) {
            let id = assert_ok!(self.handle.open(address).await);
            let link = self.link().await;
            link.sink.opened();
            assert!(matches!(self.next_event().await, Event::Opened { id: opened, .. } if opened == id));
            (id, link)
        }
    }

    fn exact_backoff(max_reconnect_attempts: u32) -> ManagerConfig {
        ManagerConfig {
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: None,
            max_reconnect_attempts,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_before_open_drain_in_order() {
        let mut fx = Fixture::new(ManagerConfig::default());

        let id = fx.handle.open("wss://x").await.unwrap();
        fx.handle.subscribe(id, json!({ "topic": "a" })).await.unwrap();
        fx.handle.subscribe(id, json!({ "topic": "b" })).await.unwrap();

        for topic in ["a", "b"] {
            assert_eq!(
                fx.next_event().await,
                Event::Queued {
                    id,
                    descriptor: json!({ "topic": topic }),
                    action: SubscriptionAction::Subscribe,
                }
            );
        }
        assert_eq!(fx.handle.connection(id).unwrap().pending, 2);

        let mut link = fx.link().await;
        assert_eq!(link.address.as_str(), "wss://x/");
        link.sink.opened();

        assert!(matches!(fx.next_event().await, Event::Opened { .. }));
        assert_eq!(
            fx.next_event().await,
            Event::Subscribed {
                id,
                descriptor: json!({ "topic": "a" })
            }
        );
        assert_eq!(
            fx.next_event().await,
            Event::Subscribed {
                id,
                descriptor: json!({ "topic": "b" })
            }
        );

        assert_eq!(link.next_text().await, r#"{"topic":"a"}"#);
        assert_eq!(link.next_text().await, r#"{"topic":"b"}"#);

        let info = fx.handle.connection(id).unwrap();
        assert_eq!(info.pending, 0);
        assert_eq!(
            info.subscriptions,
            vec![json!({ "topic": "a" }), json!({ "topic": "b" })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_same_address_twice_connects_once() {
        let mut fx = Fixture::new(ManagerConfig::default());

        let first = fx.handle.open("wss://x").await.unwrap();
        let second = fx.handle.open("wss://x").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.connector.connects(), 1);
        assert_eq!(fx.handle.connection_count(), 1);
        assert!(matches!(
            fx.next_event().await,
            Event::ConnectionReused { id, .. } if id == first
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_exhausted_leaves_pool_untouched() {
        let mut fx = Fixture::new(ManagerConfig {
            max_connections: 1,
            ..Default::default()
        });

        fx.handle.open("wss://a").await.unwrap();
        let err = assert_err!(fx.handle.open("wss://b").await);

        assert_eq!(err.kind(), ErrorKind::PoolExhausted);
        assert_eq!(fx.handle.connection_count(), 1);
        assert_eq!(fx.connector.connects(), 1);
        assert!(matches!(fx.next_event().await, Event::PoolExhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_id_reports_not_found() {
        let mut fx = Fixture::new(ManagerConfig::default());
        let id = ConnectionId::from_raw(u64::MAX);

        let err = assert_err!(fx.handle.subscribe(id, json!("x")).await);
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(fx.next_event().await, Event::NotFound { id });
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let mut fx = Fixture::new(ManagerConfig::default());
        let (id, mut link) = fx.open_live("wss://x").await;

        fx.handle.close(id).await.unwrap();
        assert_eq!(
            fx.next_event().await,
            Event::Closed {
                id,
                code: Some(1000),
                reason: "closed by host".into(),
                clean: true,
            }
        );
        assert_eq!(link.next_outbound().await, Outbound::Close { clean: true });

        assert_ok!(fx.handle.close(id).await);
        assert!(fx.events.try_recv().is_none());
        assert_eq!(fx.handle.connection_count(), 0);

        // Late signals from the closed transport are ignored
        link.sink.closed(Some(1000), "bye", true);
        fx.handle.open("wss://other").await.unwrap();
        assert!(fx.events.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_remote_close_destroys_record() {
        let mut fx = Fixture::new(ManagerConfig::default());
        let (id, link) = fx.open_live("wss://x").await;

        link.sink.closed(Some(1000), "bye", true);

        assert_eq!(
            fx.next_event().await,
            Event::Closed {
                id,
                code: Some(1000),
                reason: "bye".into(),
                clean: true,
            }
        );
        assert_eq!(fx.handle.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_until_exhausted() {
        let mut fx = Fixture::new(exact_backoff(3));
        let (id, link) = fx.open_live("wss://x").await;
        let mut link = link;

        link.sink.closed(Some(1006), "gone", false);
        assert!(matches!(
            fx.next_event().await,
            Event::Closed { clean: false, .. }
        ));

        for (attempt, delay_ms) in [(1, 1_000), (2, 2_000), (3, 4_000)] {
            let started = Instant::now();
            assert_eq!(
                fx.next_event().await,
                Event::ReconnectAttempt {
                    id,
                    attempt,
                    delay_ms
                }
            );
            assert_eq!(started.elapsed(), Duration::from_millis(delay_ms));
            assert_eq!(fx.handle.connection(id).unwrap().reconnect_attempts, attempt);

            link = fx.link().await;
            link.sink.error("connection refused");

            assert!(matches!(
                fx.next_event().await,
                Event::ConnectionError {
                    kind: ErrorKind::TransportOpen,
                    ..
                }
            ));
            assert!(matches!(
                fx.next_event().await,
                Event::Closed { clean: false, .. }
            ));
        }

        assert_eq!(fx.next_event().await, Event::ReconnectExhausted { id });
        assert_eq!(fx.handle.connection_count(), 0);
        assert_eq!(fx.connector.connects(), 4);

        // Nothing further is scheduled for the exhausted record
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert!(fx.links.try_recv().is_err());
        assert!(fx.events.try_recv().is_none());

        let fresh = fx.handle.open("wss://x").await.unwrap();
        assert_ne!(fresh, id);
        assert_eq!(fx.connector.connects(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_reconnect_resets_attempts_and_resubscribes() {
        let mut fx = Fixture::new(exact_backoff(5));
        let (id, mut link) = fx.open_live("wss://x").await;

        fx.handle.subscribe(id, json!({ "topic": "a" })).await.unwrap();
        assert!(matches!(fx.next_event().await, Event::Subscribed { .. }));
        assert_eq!(link.next_text().await, r#"{"topic":"a"}"#);

        link.sink.closed(Some(1006), "abnormal", false);
        assert!(matches!(fx.next_event().await, Event::Closed { clean: false, .. }));
        assert!(matches!(
            fx.next_event().await,
            Event::ReconnectAttempt { attempt: 1, .. }
        ));

        let mut relink = fx.link().await;
        relink.sink.opened();

        assert!(matches!(fx.next_event().await, Event::Opened { .. }));
        assert_eq!(
            fx.next_event().await,
            Event::Subscribed {
                id,
                descriptor: json!({ "topic": "a" })
            }
        );
        assert_eq!(relink.next_text().await, r#"{"topic":"a"}"#);
        assert!(relink.drain().is_empty());

        let info = fx.handle.connection(id).unwrap();
        assert_eq!(info.reconnect_attempts, 0);
        assert_eq!(info.subscriptions, vec![json!({ "topic": "a" })]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_subscribe_for_remembered_descriptor_reports_once() {
        let mut fx = Fixture::new(exact_backoff(5));
        let (id, mut link) = fx.open_live("wss://x").await;

        fx.handle.subscribe(id, json!({ "topic": "b" })).await.unwrap();
        assert!(matches!(fx.next_event().await, Event::Subscribed { .. }));
        assert_eq!(link.next_text().await, r#"{"topic":"b"}"#);

        link.sink.closed(Some(1006), "abnormal", false);
        assert!(matches!(fx.next_event().await, Event::Closed { clean: false, .. }));

        fx.handle.subscribe(id, json!({ "topic": "b" })).await.unwrap();
        assert_eq!(
            fx.next_event().await,
            Event::Queued {
                id,
                descriptor: json!({ "topic": "b" }),
                action: SubscriptionAction::Subscribe,
            }
        );
        assert!(matches!(
            fx.next_event().await,
            Event::ReconnectAttempt { attempt: 1, .. }
        ));

        let mut relink = fx.link().await;
        relink.sink.opened();

        assert!(matches!(fx.next_event().await, Event::Opened { .. }));
        assert_eq!(
            fx.next_event().await,
            Event::Subscribed {
                id,
                descriptor: json!({ "topic": "b" })
            }
        );
        assert_eq!(relink.next_text().await, r#"{"topic":"b"}"#);
        assert!(relink.drain().is_empty());
        assert!(fx.events.try_recv().is_none());

        let info = fx.handle.connection(id).unwrap();
        assert_eq!(info.pending, 0);
        assert_eq!(info.subscriptions, vec![json!({ "topic": "b" })]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_open_and_queued() {
        let mut fx = Fixture::new(exact_backoff(5));
        let (id, mut link) = fx.open_live("wss://x").await;

        fx.handle.subscribe(id, json!({ "topic": "a" })).await.unwrap();
        assert!(matches!(fx.next_event().await, Event::Subscribed { .. }));
        assert_eq!(link.next_text().await, r#"{"topic":"a"}"#);

        fx.handle.unsubscribe(id, json!({ "topic": "a" })).await.unwrap();
        assert_eq!(
            fx.next_event().await,
            Event::Unsubscribed {
                id,
                descriptor: json!({ "topic": "a" })
            }
        );
        assert_eq!(
            link.next_text().await,
            r#"{"topic":"a","type":"unsubscribe"}"#
        );
        assert!(fx.handle.connection(id).unwrap().subscriptions.is_empty());

        fx.handle.subscribe(id, json!({ "topic": "b" })).await.unwrap();
        assert!(matches!(fx.next_event().await, Event::Subscribed { .. }));
        assert_eq!(link.next_text().await, r#"{"topic":"b"}"#);

        link.sink.closed(Some(1006), "abnormal", false);
        assert!(matches!(fx.next_event().await, Event::Closed { clean: false, .. }));

        // Dropped from the remembered set at once, sent after reconnect
        fx.handle.unsubscribe(id, json!({ "topic": "b" })).await.unwrap();
        assert_eq!(
            fx.next_event().await,
            Event::Queued {
                id,
                descriptor: json!({ "topic": "b" }),
                action: SubscriptionAction::Unsubscribe,
            }
        );
        let info = fx.handle.connection(id).unwrap();
        assert!(info.subscriptions.is_empty());
        assert_eq!(info.pending, 1);

        assert!(matches!(
            fx.next_event().await,
            Event::ReconnectAttempt { attempt: 1, .. }
        ));
        let mut relink = fx.link().await;
        relink.sink.opened();

        assert!(matches!(fx.next_event().await, Event::Opened { .. }));
        assert_eq!(
            fx.next_event().await,
            Event::Unsubscribed {
                id,
                descriptor: json!({ "topic": "b" })
            }
        );
        assert_eq!(
            relink.next_text().await,
            r#"{"topic":"b","type":"unsubscribe"}"#
        );
        assert!(relink.drain().is_empty());
        assert_eq!(fx.handle.connection(id).unwrap().pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_reconnect() {
        let mut fx = Fixture::new(exact_backoff(5));
        let (id, link) = fx.open_live("wss://x").await;

        link.sink.closed(Some(1006), "abnormal", false);
        assert!(matches!(fx.next_event().await, Event::Closed { clean: false, .. }));
        assert!(fx.handle.connection(id).unwrap().reconnect_pending);

        fx.handle.close(id).await.unwrap();
        assert_eq!(
            fx.next_event().await,
            Event::Closed {
                id,
                code: Some(1000),
                reason: "closed by host".into(),
                clean: true,
            }
        );

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(fx.connector.connects(), 1);
        assert!(fx.links.try_recv().is_err());
        assert!(fx.events.try_recv().is_none());
        assert_eq!(fx.handle.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_transport_is_ignored() {
        let mut fx = Fixture::new(exact_backoff(5));
        let (id, stale) = fx.open_live("wss://x").await;

        stale.sink.error("reset by peer");
        assert!(matches!(
            fx.next_event().await,
            Event::ConnectionError {
                kind: ErrorKind::Transport,
                ..
            }
        ));
        assert!(matches!(fx.next_event().await, Event::Closed { clean: false, .. }));
        assert!(matches!(fx.next_event().await, Event::ReconnectAttempt { .. }));

        let fresh = fx.link().await;
        stale.sink.message(Frame::Text(r#"{"old":true}"#.into()));
        stale.sink.closed(Some(1006), "late", false);
        fresh.sink.opened();
        fresh.sink.message(Frame::Text(r#"{"price":1}"#.into()));

        assert!(matches!(fx.next_event().await, Event::Opened { .. }));
        match fx.next_event().await {
            Event::MessageReceived {
                id: from, payload, ..
            } => {
                assert_eq!(from, id);
                assert_eq!(payload, Payload::Json(json!({ "price": 1 })));
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_connection_goes_stale() {
        let mut fx = Fixture::new(exact_backoff(5));
        let id = fx
            .handle
            .open_with(
                "wss://x",
                OpenOptions::new().with_heartbeat_interval(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        let MockLink { sink, outbound, .. } = fx.link().await;
        drop(outbound);
        sink.opened();
        assert!(matches!(fx.next_event().await, Event::Opened { .. }));
        let opened_at = Instant::now();

        match fx.next_significant().await {
            Event::Closed {
                id: closed,
                clean,
                reason,
                ..
            } => {
                assert_eq!(closed, id);
                assert!(!clean);
                assert_eq!(reason, "stale connection");
            }
            other => panic!("expected stale close, got {other:?}"),
        }
        assert!(opened_at.elapsed() > Duration::from_secs(2));

        assert!(matches!(
            fx.next_significant().await,
            Event::ReconnectAttempt { attempt: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_traffic_keeps_connection_alive() {
        let mut fx = Fixture::new(ManagerConfig {
            heartbeat_interval_ms: 1_000,
            ..Default::default()
        });
        let (id, mut link) = fx.open_live("wss://x").await;

        for _ in 0..5 {
            assert_eq!(link.next_text().await, r#"{"type":"ping"}"#);
            link.sink.message(Frame::Pong(Vec::new()));
        }

        assert_eq!(
            fx.handle.connection(id).unwrap().state,
            ConnectionState::Open
        );
        assert!(fx.events.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_all_stops_manager() {
        let mut fx = Fixture::new(ManagerConfig::default());
        let (a, _link_a) = fx.open_live("wss://a").await;
        let b = fx.handle.open("wss://b").await.unwrap();

        fx.handle.shutdown_all().await.unwrap();

        assert!(matches!(fx.next_event().await, Event::Closed { id, clean: true, .. } if id == a));
        assert!(matches!(fx.next_event().await, Event::Closed { id, clean: true, .. } if id == b));
        assert_eq!(fx.next_event().await, Event::ShutdownComplete);
        assert!(fx.events.next().await.is_none());

        assert!(!fx.handle.is_running());
        assert!(fx.handle.connections().is_empty());
        let err = fx.handle.open("wss://c").await.unwrap_err();
        assert!(matches!(err, Error::ManagerStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_correlation_is_echoed() {
        let mut fx = Fixture::new(ManagerConfig::default());
        let correlation = CorrelationId::generate();

        fx.handle
            .request_with(
                correlation,
                Command::Open {
                    address: "wss://x".into(),
                    options: OpenOptions::default(),
                },
            )
            .await
            .unwrap();
        let id = fx.link().await.sink.id();

        fx.handle
            .request_with(
                correlation,
                Command::Subscribe {
                    id,
                    descriptor: json!("t"),
                },
            )
            .await
            .unwrap();

        let envelope = fx.events.recv().await.unwrap();
        assert_eq!(envelope.correlation, Some(correlation));
        assert!(matches!(envelope.event, Event::Queued { .. }));
    }
}
