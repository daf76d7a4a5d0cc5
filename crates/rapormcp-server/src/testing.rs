//! In-process client for exercising a server without a network.
//!
//! [`TestClient`] sits on the far end of a [`MemoryTransport`]. A reader task
//! correlates responses with pending requests, answers the server's own
//! `ping` and `roots/list` requests, and queues every notification so tests
//! can wait for them by method.
//!
//! # Example
//!
//! ```ignore
//! let server = Server::new("demo", "1.0.0").tool(echo_tool()).build();
//! let (client, _session) = TestClient::connect(&server, ClientCapabilities::default()).await?;
//! let result = client.call_tool("echo", json!({"text": "hi"})).await?;
//! assert_eq!(result.content[0].as_text(), Some("hi"));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rapormcp_core::McpError;
use rapormcp_protocol::{
    CallToolParams, CallToolResult, ClientCapabilities, ClientInfo, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    ListRootsResult, PROTOCOL_VERSION, ProgressToken, RequestId, RequestMeta, Root,
};
use rapormcp_transport::{MemoryPeer, MemoryTransport, PeerSender, TransportKind};
use serde_json::{Value, json};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;

use crate::{Server, ServerError, Session};

/// How long requests and notification waits run before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Failures seen by [`TestClient`].
#[derive(Debug, thiserror::Error)]
pub enum TestClientError {
    #[error("server returned an error: {0}")]
    Remote(JsonRpcError),
    #[error("nothing arrived within {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("connection closed")]
    Closed,
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl TestClientError {
    /// The JSON-RPC error, for [`TestClientError::Remote`].
    #[must_use]
    pub fn remote(&self) -> Option<&JsonRpcError> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
    notifications: Mutex<VecDeque<JsonRpcRequest>>,
    arrived: Notify,
    /// Every message received, in arrival order.
    received: Mutex<Vec<JsonRpcMessage>>,
    /// Answer for `roots/list`; `None` answers "method not found".
    roots: Mutex<Option<Vec<Root>>>,
}

/// Client end of an in-memory MCP connection.
pub struct TestClient {
    sender: PeerSender,
    shared: Arc<Shared>,
    next_id: AtomicI64,
    timeout: Duration,
    reader: JoinHandle<()>,
}

impl TestClient {
    /// Creates a client and the transport to hand to the server.
    #[must_use]
    pub fn pair() -> (Self, MemoryTransport) {
        Self::pair_with_kind(TransportKind::Memory)
    }

    /// Like [`TestClient::pair`] with the transport reporting `kind`, so
    /// per-transport defaults such as pinging apply.
    #[must_use]
    pub fn pair_with_kind(kind: TransportKind) -> (Self, MemoryTransport) {
        let (transport, peer) = MemoryTransport::pair_with_kind(kind);
        (Self::from_peer(peer), transport)
    }

    fn from_peer(peer: MemoryPeer) -> Self {
        let (sender, mut receiver) = peer.into_parts();
        let shared = Arc::new(Shared::default());
        let reader = {
            let shared = Arc::clone(&shared);
            let sender = sender.clone();
            tokio::spawn(async move {
                while let Some(message) = receiver.recv().await {
                    lock(&shared.received).push(message.clone());
                    match message {
                        JsonRpcMessage::Response(response) => route_response(&shared, response),
                        JsonRpcMessage::Request(request) => match request.id.clone() {
                            Some(id) => answer_server_request(&shared, &sender, id, &request.method),
                            None => {
                                lock(&shared.notifications).push_back(request);
                                shared.arrived.notify_one();
                            }
                        },
                    }
                }
                // Wake waiters so they observe the close.
                lock(&shared.pending).clear();
                shared.arrived.notify_one();
            })
        };
        Self {
            sender,
            shared,
            next_id: AtomicI64::new(1),
            timeout: DEFAULT_TIMEOUT,
            reader,
        }
    }

    /// Connects a new session of `server` and completes the handshake,
    /// advertising `capabilities`.
    ///
    /// Set roots with [`TestClient::pair`] + [`TestClient::set_roots`] and
    /// drive the handshake by hand when the server must see them during
    /// connect.
    pub async fn connect(
        server: &Server,
        capabilities: ClientCapabilities,
    ) -> Result<(Self, Arc<Session>), TestClientError> {
        let (client, transport) = Self::pair();
        let connecting = {
            let server = server.clone();
            tokio::spawn(async move { server.connect(Arc::new(transport), None).await })
        };
        client.initialize(capabilities).await?;
        let session = connecting.await.map_err(|_| TestClientError::Closed)??;
        Ok((client, session))
    }

    /// Overrides the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets what `roots/list` returns. `None` makes the client answer
    /// "method not found".
    pub fn set_roots(&self, roots: Option<Vec<Root>>) {
        *lock(&self.shared.roots) = roots;
    }

    /// Sends `initialize` followed by `notifications/initialized`.
    pub async fn initialize(
        &self,
        capabilities: ClientCapabilities,
    ) -> Result<InitializeResult, TestClientError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities,
            client_info: ClientInfo {
                name: "test-client".to_string(),
                version: "0.0.0".to_string(),
            },
        };
        let value = self.request("initialize", Some(serde_json::to_value(params)?)).await?;
        self.notify("notifications/initialized", None)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a request and waits for its result.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, TestClientError> {
        let id = RequestId::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(id.clone(), tx);
        self.sender
            .send(JsonRpcRequest::new(method, params, id.clone()).into())
            .map_err(|_| TestClientError::Closed)?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response.into_result().map_err(TestClientError::Remote),
            Ok(Err(_)) => Err(TestClientError::Closed),
            Err(_) => {
                lock(&self.shared.pending).remove(&id);
                Err(TestClientError::Timeout(self.timeout))
            }
        }
    }

    /// Sends a notification.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TestClientError> {
        self.sender
            .send(JsonRpcRequest::notification(method, params).into())
            .map_err(|_| TestClientError::Closed)
    }

    /// Sends a raw message, e.g. a malformed request.
    pub fn send_raw(&self, message: JsonRpcMessage) -> Result<(), TestClientError> {
        self.sender.send(message).map_err(|_| TestClientError::Closed)
    }

    /// Calls a tool.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, TestClientError> {
        self.call_tool_inner(name, arguments, None).await
    }

    /// Calls a tool with a progress token, so the server streams
    /// `notifications/progress` while it runs.
    pub async fn call_tool_with_progress(
        &self,
        name: &str,
        arguments: Value,
        token: impl Into<ProgressToken>,
    ) -> Result<CallToolResult, TestClientError> {
        let meta = RequestMeta {
            progress_token: Some(token.into()),
        };
        self.call_tool_inner(name, arguments, Some(meta)).await
    }

    async fn call_tool_inner(
        &self,
        name: &str,
        arguments: Value,
        meta: Option<RequestMeta>,
    ) -> Result<CallToolResult, TestClientError> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
            meta,
        };
        let value = self
            .request("tools/call", Some(serde_json::to_value(params)?))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sets the session's log threshold.
    pub async fn set_level(&self, level: &str) -> Result<(), TestClientError> {
        self.request("logging/setLevel", Some(json!({ "level": level })))
            .await
            .map(|_| ())
    }

    /// Waits for the next queued notification named `method`. Other
    /// notifications stay queued.
    pub async fn next_notification(&self, method: &str) -> Result<JsonRpcRequest, TestClientError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            {
                let mut queue = lock(&self.shared.notifications);
                if let Some(index) = queue.iter().position(|n| n.method == method) {
                    if let Some(found) = queue.remove(index) {
                        return Ok(found);
                    }
                }
            }
            if self.reader.is_finished() {
                return Err(TestClientError::Closed);
            }
            if tokio::time::timeout_at(deadline, self.shared.arrived.notified())
                .await
                .is_err()
            {
                return Err(TestClientError::Timeout(self.timeout));
            }
        }
    }

    /// Drains queued notifications named `method` without waiting.
    pub fn take_notifications(&self, method: &str) -> Vec<JsonRpcRequest> {
        let mut queue = lock(&self.shared.notifications);
        let (taken, kept): (Vec<_>, Vec<_>) = queue.drain(..).partition(|n| n.method == method);
        queue.extend(kept);
        taken
    }

    /// Everything received so far, in arrival order.
    #[must_use]
    pub fn received(&self) -> Vec<JsonRpcMessage> {
        lock(&self.shared.received).clone()
    }

    /// Disconnects from the server.
    pub fn close(&self) {
        self.sender.close();
    }

    /// Returns true once the server side stopped reading.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl Drop for TestClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn route_response(shared: &Shared, response: JsonRpcResponse) {
    let Some(id) = response.id.clone() else {
        return;
    };
    if let Some(waiter) = lock(&shared.pending).remove(&id) {
        let _ = waiter.send(response);
    }
}

fn answer_server_request(shared: &Shared, sender: &PeerSender, id: RequestId, method: &str) {
    let response = match method {
        "ping" => JsonRpcResponse::success(id, json!({})),
        "roots/list" => match lock(&shared.roots).clone() {
            Some(roots) => match serde_json::to_value(ListRootsResult { roots }) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(err) => JsonRpcResponse::error(Some(id), McpError::internal_error(err.to_string()).into()),
            },
            None => not_found(id, method),
        },
        other => not_found(id, other),
    };
    let _ = sender.send(response.into());
}

fn not_found(id: RequestId, method: &str) -> JsonRpcResponse {
    let err = McpError::method_not_found(format!("Method not found: {method}"));
    JsonRpcResponse::error(Some(id), err.into())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
