//! Duplex message channel capability.
//!
//! The connection manager never speaks a wire protocol itself; it asks a
//! [`Transport`] for a [`Duplex`] and then only moves text frames through it.

use async_trait::async_trait;
use eyre::{Result, bail};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;

/// Something that happened on an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A text frame from the peer.
    Message(String),
    /// The peer (or the network) closed the channel.
    Closed,
    /// The channel failed; it is unusable afterwards.
    Error(String),
}

/// An open channel. Dropping `outbound` closes it.
#[derive(Debug)]
pub struct Duplex {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens duplex channels to the service.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new channel.
    async fn connect(&self) -> Result<Duplex>;
}

/// In-process transport. Every accepted connect hands a [`MemoryPeer`] to the
/// receiver returned by [`MemoryTransport::new`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refusals: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
}

impl MemoryTransport {
    /// Create a transport and the receiving end for its peers.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let transport = Self {
            peers,
            refusals: Arc::new(AtomicU32::new(0)),
            attempts: Arc::new(AtomicU32::new(0)),
        };
        (transport, rx)
    }

    /// Refuse the next `count` connect attempts.
    pub fn refuse_next(&self, count: u32) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Total connect attempts so far, refused ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<Duplex> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            bail!("connection refused");
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            to_client: in_tx,
            from_client: out_rx,
        };
        if self.peers.send(peer).is_err() {
            bail!("no peer is listening");
        }

        Ok(Duplex {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// The service side of a [`MemoryTransport`] channel.
#[derive(Debug)]
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Deliver a raw text frame to the client.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.to_client.send(TransportEvent::Message(frame.into())).is_ok()
    }

    /// Deliver a JSON frame to the client.
    pub fn push_json(&self, frame: &serde_json::Value) -> bool {
        self.push(frame.to_string())
    }

    /// Close the channel from the service side.
    pub fn close(&self) -> bool {
        self.to_client.send(TransportEvent::Closed).is_ok()
    }

    /// Fail the channel.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.to_client.send(TransportEvent::Error(reason.into())).is_ok()
    }

    /// Next frame sent by the client; `None` once the client dropped its side.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame sent by the client, without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// True once the client side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.to_client.is_closed()
    }
}
