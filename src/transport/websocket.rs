//! WebSocket transport and event loop.
//!
//! Each call to [`WebSocketConnector::connect`] spawns one tokio task that
//! owns the socket for the lifetime of that handle.
//!
//! # Event Loop
//!
//! The task handles:
//!
//! - The client handshake (bounded by the connect timeout)
//! - Incoming frames, reported through the [`TransportSink`]
//! - Outgoing frames and close requests from the [`TransportHandle`]
//!
//! A remote close with code 1000 is clean. Any other code, a missing close
//! frame, or a socket error is unclean and lets the manager reconnect.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::identifiers::Address;

use super::{Connector, Frame, Outbound, TransportHandle, TransportSink};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on the client handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code for a normal closure.
const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the stream ends without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type WsWrite = SplitSink<WsStream, Message>;

// ============================================================================
// WebSocketConnector
// ============================================================================

/// [`Connector`] backed by `tokio-tungstenite`.
///
/// `wss://` endpoints need the `rustls` crate feature.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    /// Maximum time for TCP connect plus handshake.
    connect_timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketConnector {
    /// Creates a connector with the default 10s connect timeout.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Returns the connect timeout.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, address: &Address, sink: TransportSink) -> Result<TransportHandle> {
        let (handle, outbound_rx) = TransportHandle::pair(sink.id());

        tokio::spawn(run_transport(
            address.clone(),
            self.connect_timeout,
            outbound_rx,
            sink,
        ));

        Ok(handle)
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Connects, then pumps frames until either side closes.
async fn run_transport(
    address: Address,
    connect_timeout: Duration,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    sink: TransportSink,
) {
    let id = sink.id();

    // Only a close can arrive before open, so any outbound message abandons the attempt
    let connect = tokio::select! {
        result = timeout(connect_timeout, connect_async(address.as_str())) => result,
        _ = outbound_rx.recv() => {
            debug!(%id, %address, "Connect abandoned");
            return;
        }
    };

    let ws_stream = match connect {
        Ok(Ok((ws_stream, _response))) => ws_stream,
        Ok(Err(e)) => {
            warn!(%id, %address, error = %e, "WebSocket connect failed");
            sink.error(e.to_string());
            return;
        }
        Err(_) => {
            warn!(%id, %address, "WebSocket connect timed out");
            sink.error(format!(
                "connect timed out after {}ms",
                connect_timeout.as_millis()
            ));
            return;
        }
    };

    info!(%id, %address, "WebSocket connection established");
    sink.opened();

    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            // Incoming frames from the remote end
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        sink.message(Frame::Text(text.as_str().to_owned()));
                    }

                    Some(Ok(Message::Binary(bytes))) => {
                        sink.message(Frame::Binary(bytes.to_vec()));
                    }

                    // tungstenite answers pings itself; both still count as activity
                    Some(Ok(Message::Ping(bytes))) => {
                        sink.message(Frame::Ping(bytes.to_vec()));
                    }

                    Some(Ok(Message::Pong(bytes))) => {
                        sink.message(Frame::Pong(bytes.to_vec()));
                    }

                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (
                                Some(u16::from(frame.code)),
                                frame.reason.as_str().to_owned(),
                            ),
                            None => (None, String::new()),
                        };
                        let clean = code == Some(CLOSE_NORMAL);
                        debug!(%id, ?code, clean, "WebSocket closed by remote");
                        sink.closed(code, reason, clean);
                        break;
                    }

                    Some(Ok(Message::Frame(_))) => {}

                    Some(Err(e)) => {
                        warn!(%id, error = %e, "WebSocket error");
                        sink.error(e.to_string());
                        break;
                    }

                    None => {
                        debug!(%id, "WebSocket stream ended");
                        sink.closed(Some(CLOSE_ABNORMAL), "stream ended", false);
                        break;
                    }
                }
            }

            // Instructions from the manager
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = ws_write.send(into_message(frame)).await {
                            warn!(%id, error = %e, "WebSocket write failed");
                            sink.error(e.to_string());
                            break;
                        }
                        trace!(%id, "Frame written");
                    }

                    Some(Outbound::Close { clean: true }) => {
                        send_close(&mut ws_write).await;
                        debug!(%id, "WebSocket closed by manager");
                        break;
                    }

                    Some(Outbound::Close { clean: false }) => {
                        debug!(%id, "WebSocket aborted by manager");
                        break;
                    }

                    None => {
                        debug!(%id, "Handle dropped");
                        send_close(&mut ws_write).await;
                        break;
                    }
                }
            }
        }
    }

    debug!(%id, "Transport loop terminated");
}

/// Sends a normal close frame, ignoring failures.
async fn send_close(ws_write: &mut WsWrite) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    };

    if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
        trace!(error = %e, "Close frame not delivered");
    }
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
        Frame::Ping(bytes) => Message::Ping(bytes.into()),
        Frame::Pong(bytes) => Message::Pong(bytes.into()),
    }
}

// ============================================================================
// Tests
// ============================================================================
