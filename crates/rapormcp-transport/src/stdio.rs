//! Standard I/O transport.
//!
//! The transport for servers launched as a subprocess. Messages are framed
//! with [`Codec`] (NDJSON).
//!
//! # Example
//!
//! ```ignore
//! use rapormcp_transport::{StdioTransport, Transport};
//!
//! let transport = StdioTransport::stdio();
//! let mut events = transport.start().await?;
//! while let Some(event) = events.recv().await {
//!     // ...
//! }
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rapormcp_core::logging::{debug, targets, warn};
use rapormcp_protocol::JsonRpcMessage;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::{Codec, Transport, TransportError, TransportEvent, TransportKind};

const READ_CHUNK: usize = 8 * 1024;

/// NDJSON transport over an async reader/writer pair.
///
/// # Wire Format
///
/// - Each message is serialized as a single line of JSON
/// - Lines are terminated by `\n`; a trailing `\r` is tolerated on input
/// - Empty lines are ignored
/// - A malformed line produces an error event; reading continues
/// - EOF closes the transport
pub struct StdioTransport<R, W> {
    reader: Mutex<Option<R>>,
    writer: tokio::sync::Mutex<W>,
    codec: Codec,
    closed: AtomicBool,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport<tokio::io::Stdin, tokio::io::Stdout> {
    /// Transport over the process's stdin/stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a transport over a custom reader/writer.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            writer: tokio::sync::Mutex::new(writer),
            codec: Codec::new(),
            closed: AtomicBool::new(false),
            reader_task: Mutex::new(None),
        }
    }

    /// Sets the maximum message size in both directions.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.codec = Codec::with_max_message_size(size);
        self
    }
}

#[async_trait]
impl<R, W> Transport for StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn start(&self) -> Result<UnboundedReceiver<TransportEvent>, TransportError> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| TransportError::Closed)?
            .take()
            .ok_or(TransportError::AlreadyStarted)?;
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let limit = self.codec.max_message_size();
        let task = tokio::spawn(read_loop(reader, Codec::with_max_message_size(limit), events));
        if let Ok(mut slot) = self.reader_task.lock() {
            *slot = Some(task);
        }
        Ok(receiver)
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let bytes = self.codec.encode(&message)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.reader_task.lock().ok().and_then(|mut t| t.take()) {
            task.abort();
        }
        if let Err(err) = self.writer.lock().await.shutdown().await {
            debug!(target: targets::TRANSPORT, "stdio writer shutdown failed: {}", err);
        }
        debug!(target: targets::TRANSPORT, "stdio transport closed");
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }
}

async fn read_loop<R>(mut reader: R, mut codec: Codec, events: UnboundedSender<TransportEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                if let Some(last) = codec.finish() {
                    let _ = events.send(into_event(last));
                }
                debug!(target: targets::TRANSPORT, "stdio reached EOF");
                let _ = events.send(TransportEvent::Closed);
                return;
            }
            Ok(read) => {
                for decoded in codec.decode(&chunk[..read]) {
                    if events.send(into_event(decoded)).is_err() {
                        return;
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => {
                warn!(target: targets::TRANSPORT, "stdio read failed: {}", err);
                let _ = events.send(TransportEvent::Error(err.into()));
                let _ = events.send(TransportEvent::Closed);
                return;
            }
        }
    }
}

fn into_event(decoded: Result<JsonRpcMessage, crate::CodecError>) -> TransportEvent {
    match decoded {
        Ok(message) => TransportEvent::Message(message),
        Err(err) => TransportEvent::Error(err.into()),
    }
}
