//! In-memory connector for driving the manager from tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::identifiers::Address;

use super::{Connector, Frame, Outbound, TransportHandle, TransportSink};

/// One transport the manager asked for.
pub(crate) struct MockLink {
    pub address: Address,
    pub sink: TransportSink,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl MockLink {
    /// Waits for the next outbound instruction.
    pub async fn next_outbound(&mut self) -> Outbound {
        timeout(Duration::from_secs(120), self.outbound.recv())
            .await
            .expect("outbound in time")
            .expect("handle alive")
    }

    /// Waits for the next outbound text frame.
    pub async fn next_text(&mut self) -> String {
        match self.next_outbound().await {
            Outbound::Frame(Frame::Text(text)) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    /// Drains every outbound instruction already queued.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = self.outbound.try_recv() {
            out.push(item);
        }
        out
    }
}

/// Connector handing each new transport to the test.
#[derive(Clone)]
pub(crate) struct MockConnector {
    links_tx: mpsc::UnboundedSender<MockLink>,
    connects: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockLink>) {
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        let connector = Self {
            links_tx,
            connects: Arc::new(AtomicUsize::new(0)),
            refuse: Arc::new(AtomicBool::new(false)),
        };
        (connector, links_rx)
    }

    /// Number of `connect` calls so far, refused ones included.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Makes every following `connect` fail synchronously.
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Connector for MockConnector {
    fn connect(&self, address: &Address, sink: TransportSink) -> Result<TransportHandle> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::transport_open(address.as_str(), "refused by mock"));
        }

        let (handle, outbound) = TransportHandle::pair(sink.id());
        let link = MockLink {
            address: address.clone(),
            sink,
            outbound,
        };
        let _ = self.links_tx.send(link);

        Ok(handle)
    }
}

/// Waits for the manager to request the next transport.
pub(crate) async fn next_link(links: &mut mpsc::UnboundedReceiver<MockLink>) -> MockLink {
    timeout(Duration::from_secs(120), links.recv())
        .await
        .expect("connect in time")
        .expect("connector alive")
}
