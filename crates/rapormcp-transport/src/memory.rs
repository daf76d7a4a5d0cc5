//! In-process transport.
//!
//! [`MemoryTransport::pair`] returns the session-side transport and a
//! [`MemoryPeer`] for the other end. The HTTP listener creates one pair per
//! client and bridges HTTP requests onto the peer; tests drive sessions
//! through the peer directly.
//!
//! ```text
//! peer.send()     -> inbound  -> transport.start() receiver (session reads)
//! transport.send() -> outbound -> peer.recv()               (peer reads)
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rapormcp_core::logging::{debug, targets};
use rapormcp_protocol::JsonRpcMessage;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{Transport, TransportError, TransportEvent, TransportKind};

/// Session side of an in-process channel.
#[derive(Debug)]
pub struct MemoryTransport {
    kind: TransportKind,
    inbound: Mutex<Option<UnboundedReceiver<TransportEvent>>>,
    /// Used to wake the session's reader when the transport closes itself.
    inbound_tx: UnboundedSender<TransportEvent>,
    outbound: Mutex<Option<UnboundedSender<JsonRpcMessage>>>,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// Creates a connected pair reporting [`TransportKind::Memory`].
    #[must_use]
    pub fn pair() -> (Self, MemoryPeer) {
        Self::pair_with_kind(TransportKind::Memory)
    }

    /// Creates a connected pair reporting `kind`, for bridges that carry a
    /// network transport over the in-process channel.
    #[must_use]
    pub fn pair_with_kind(kind: TransportKind) -> (Self, MemoryPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let transport = Self {
            kind,
            inbound: Mutex::new(Some(inbound_rx)),
            inbound_tx: inbound_tx.clone(),
            outbound: Mutex::new(Some(outbound_tx)),
            closed: AtomicBool::new(false),
        };
        let peer = MemoryPeer {
            sender: PeerSender { inbound: inbound_tx },
            receiver: outbound_rx,
        };
        (transport, peer)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn start(&self) -> Result<UnboundedReceiver<TransportEvent>, TransportError> {
        self.inbound
            .lock()
            .map_err(|_| TransportError::Closed)?
            .take()
            .ok_or(TransportError::AlreadyStarted)
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        let guard = self.outbound.lock().map_err(|_| TransportError::Closed)?;
        let outbound = guard.as_ref().ok_or(TransportError::Closed)?;
        outbound.send(message).map_err(|_| TransportError::Closed)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the sender ends the peer's stream.
        if let Ok(mut outbound) = self.outbound.lock() {
            outbound.take();
        }
        let _ = self.inbound_tx.send(TransportEvent::Closed);
        debug!(target: targets::TRANSPORT, "memory transport closed ({:?})", self.kind);
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }
}

/// The far end of a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryPeer {
    sender: PeerSender,
    receiver: UnboundedReceiver<JsonRpcMessage>,
}

impl MemoryPeer {
    /// Delivers a message to the session.
    pub fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        self.sender.send(message)
    }

    /// Receives the next message the session sent. `None` once the
    /// transport is closed and drained.
    pub async fn recv(&mut self) -> Option<JsonRpcMessage> {
        self.receiver.recv().await
    }

    /// A cloneable handle for the sending half.
    #[must_use]
    pub fn sender(&self) -> PeerSender {
        self.sender.clone()
    }

    /// Splits into the sending handle and the receiving stream.
    #[must_use]
    pub fn into_parts(self) -> (PeerSender, UnboundedReceiver<JsonRpcMessage>) {
        (self.sender, self.receiver)
    }

    /// Signals disconnect to the session.
    pub fn close(&self) {
        self.sender.close();
    }
}

/// Cloneable sending half of a [`MemoryPeer`].
#[derive(Debug, Clone)]
pub struct PeerSender {
    inbound: UnboundedSender<TransportEvent>,
}

impl PeerSender {
    /// Delivers a message to the session.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the session stopped reading.
    pub fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        self.inbound
            .send(TransportEvent::Message(message))
            .map_err(|_| TransportError::Closed)
    }

    /// Reports a non-fatal channel error, such as an unparsable body.
    pub fn report_error(&self, error: TransportError) {
        let _ = self.inbound.send(TransportEvent::Error(error));
    }

    /// Signals disconnect to the session.
    pub fn close(&self) {
        let _ = self.inbound.send(TransportEvent::Closed);
    }

    /// Returns true once the session stopped reading.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }
}
