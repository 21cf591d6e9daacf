//! Pooled connections against a local echo server.
//!
//! Demonstrates:
//! - Starting a manager over WebSocket transports
//! - Address deduplication on `open`
//! - Subscriptions queued before the connection opens
//! - Inbound messages delivered as events
//! - Graceful shutdown
//!
//! Usage:
//!   cargo run --example echo_pool
//!   cargo run --example echo_pool -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tracing_subscriber::EnvFilter;
use wsmux::{Event, Manager};

// ============================================================================
// Constants
// ============================================================================

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("=== Echo Pool ===\n");

    // ========================================================================
    // Echo Server
    // ========================================================================

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = format!("ws://{}", listener.local_addr()?);
    tokio::spawn(echo_server(listener));
    println!("[Server] Listening on {address}");

    // ========================================================================
    // Manager
    // ========================================================================

    let (handle, mut events) = Manager::builder()
        .max_connections(2)
        .heartbeat_interval(Duration::from_secs(10))
        .spawn_websocket()?;

    let id = handle.open(&address).await?;
    let again = handle.open(&address).await?;
    println!("[Open]   {id} (second open reused {again})");

    handle.subscribe(id, json!({ "topic": "trades" })).await?;
    handle.subscribe(id, json!({ "topic": "book" })).await?;

    // Two queued subscriptions, then two echoes
    let mut echoes = 0;
    while echoes < 2 {
        let Some(envelope) = timeout(EVENT_TIMEOUT, events.recv()).await? else {
            anyhow::bail!("manager stopped unexpectedly");
        };

        match envelope.event {
            Event::MessageReceived { payload, .. } => {
                echoes += 1;
                println!("[Echo]   {payload:?}");
            }
            other => println!("[Event]  {}", other.name()),
        }
    }

    for info in handle.connections() {
        println!(
            "[Pool]   {} {} {} subscriptions={}",
            info.id,
            info.address,
            info.state,
            info.subscriptions.len()
        );
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    handle.shutdown_all().await?;
    while let Some(envelope) = events.recv().await {
        println!("[Event]  {}", envelope.event.name());
    }

    println!("\n=== Done ===");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug { "wsmux=debug" } else { "wsmux=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn echo_server(listener: TcpListener) {
    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(async move {
            let Ok(mut ws) = accept_async(stream).await else {
                return;
            };
            while let Some(Ok(message)) = ws.next().await {
                if (message.is_text() || message.is_binary()) && ws.send(message).await.is_err() {
                    break;
                }
            }
        });
    }
}
