//! Transport layer for rapormcp.
//!
//! A [`Transport`] is a bidirectional message channel with an explicit
//! lifecycle. The session is transport-agnostic: it calls [`Transport::start`]
//! once, consumes the returned event receiver in order, hands outbound
//! messages to [`Transport::send`], and calls [`Transport::close`] on
//! teardown.
//!
//! Concrete channels:
//! - [`StdioTransport`]: NDJSON over any `AsyncRead`/`AsyncWrite` pair
//! - [`MemoryTransport`]: in-process duplex, used behind the HTTP listener
//!   and in tests

#![forbid(unsafe_code)]

mod codec;
mod memory;
mod stdio;

use async_trait::async_trait;
use rapormcp_protocol::JsonRpcMessage;
use tokio::sync::mpsc::UnboundedReceiver;

pub use codec::{Codec, CodecError, DEFAULT_MAX_MESSAGE_SIZE};
pub use memory::{MemoryPeer, MemoryTransport, PeerSender};
pub use stdio::StdioTransport;

/// Transport error types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel is closed.
    #[error("transport closed")]
    Closed,
    /// `start` was called more than once.
    #[error("transport already started")]
    AlreadyStarted,
    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Framing or JSON failure.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Something that happened on the receiving side of a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A message from the peer, in arrival order.
    Message(JsonRpcMessage),
    /// A non-fatal channel failure, e.g. a malformed frame.
    Error(TransportError),
    /// The channel closed. No further events follow.
    Closed,
}

/// Flavor of a transport, used to pick per-transport defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Process pipes.
    Stdio,
    /// HTTP with server-sent events.
    Sse,
    /// Streamable HTTP.
    HttpStream,
    /// In-process channel.
    Memory,
}

impl TransportKind {
    /// Returns true for long-lived network transports, which benefit from
    /// liveness probes.
    #[must_use]
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Sse | Self::HttpStream)
    }
}

/// A bidirectional message channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begins receiving. Events arrive on the returned receiver in order.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadyStarted`] on a second call.
    async fn start(&self) -> Result<UnboundedReceiver<TransportEvent>, TransportError>;

    /// Hands one message to the peer. Resolves once the message is written
    /// or queued, not when the peer has processed it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after `close`, or the underlying
    /// I/O error.
    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError>;

    /// Releases the channel. Safe to call any number of times.
    async fn close(&self);

    /// Flavor of this transport.
    fn kind(&self) -> TransportKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_kinds() {
        assert!(TransportKind::Sse.is_streaming());
        assert!(TransportKind::HttpStream.is_streaming());
        assert!(!TransportKind::Stdio.is_streaming());
        assert!(!TransportKind::Memory.is_streaming());
    }

    #[test]
    fn error_display() {
        assert_eq!(TransportError::Closed.to_string(), "transport closed");
        let err = TransportError::from(CodecError::MessageTooLarge(3));
        assert!(err.to_string().contains("Message too large"));
    }
}
