//! One connected client.
//!
//! A [`Session`] owns at most one transport. Once connected it runs three
//! kinds of tasks:
//!
//! - an inbound loop that drains the transport's event receiver and spawns
//!   one task per request, so slow tools never block the session;
//! - a single writer task draining the outbound channel, so everything a
//!   handler sends before returning is written before its response;
//! - an optional liveness task pinging the client on an interval.
//!
//! Server-to-client requests (`roots/list`, `ping`, `sampling/createMessage`)
//! go through [`Session::request`] and are correlated with the client's
//! responses through a pending map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;

use rapormcp_core::logging::{debug, error, info, targets, trace, warn};
use rapormcp_core::{
    AuthContext, ClientLogger, LoggingLevel, McpContext, McpError, McpErrorCode, McpResult,
    NotificationSender, ProgressReporter, SharedLevel,
};
use rapormcp_protocol::{
    CallToolParams, CancelledParams, ClientCapabilities, ClientInfo, CompleteParams,
    CreateMessageParams, CreateMessageResult, GetPromptParams, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, ListRootsResult,
    LogMessageParams, ProgressParams, ProgressToken, ReadResourceParams, RequestId, Root,
    ServerCapabilities, ServerInfo, SetLevelParams, negotiate_protocol_version,
};
use rapormcp_transport::{Transport, TransportError, TransportEvent};
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::router::Router;

/// How long teardown waits for queued messages to be written.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle errors and failures of server-initiated requests.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session already has a transport")]
    AlreadyConnected,
    #[error("session is not connected")]
    NotConnected,
    #[error("session is closed")]
    Closed,
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("client returned an error: {0}")]
    Remote(JsonRpcError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("unexpected response shape: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether the client answered that it does not implement the method.
    #[must_use]
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, Self::Remote(err) if err.kind() == McpErrorCode::MethodNotFound)
    }
}

/// Something that happened to a session, delivered to [`Session::on_event`]
/// observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The client's root list was refetched after it announced a change.
    RootsChanged(Vec<Root>),
    /// A non-fatal transport error.
    Error(String),
    /// The session was torn down. Emitted exactly once.
    Closed,
}

type Observer = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Link {
    transport: Arc<dyn Transport>,
    outbound: UnboundedSender<JsonRpcMessage>,
    writer: JoinHandle<()>,
}

type Pending = HashMap<RequestId, oneshot::Sender<Result<Value, JsonRpcError>>>;

/// A protocol session bound to one client.
pub struct Session {
    id: String,
    router: Arc<Router>,
    server_info: ServerInfo,
    instructions: Option<String>,
    config: SessionConfig,
    auth: Option<Arc<AuthContext>>,
    capabilities: ServerCapabilities,
    client_capabilities: OnceLock<ClientCapabilities>,
    client_info: OnceLock<ClientInfo>,
    protocol_version: OnceLock<&'static str>,
    level: SharedLevel,
    roots: Mutex<Vec<Root>>,
    link: Mutex<Option<Link>>,
    connected: AtomicBool,
    closed: AtomicBool,
    closed_signal: watch::Sender<bool>,
    pending: Mutex<Pending>,
    next_request_id: AtomicI64,
    observers: Mutex<Vec<Observer>>,
    ping_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Creates an unconnected session over a shared registry.
    ///
    /// Server capabilities are computed here, once.
    #[must_use]
    pub fn new(router: Arc<Router>, server_info: ServerInfo) -> Self {
        let capabilities = router.capabilities();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            router,
            server_info,
            instructions: None,
            config: SessionConfig::default(),
            auth: None,
            capabilities,
            client_capabilities: OnceLock::new(),
            client_info: OnceLock::new(),
            protocol_version: OnceLock::new(),
            level: SharedLevel::default(),
            roots: Mutex::new(Vec::new()),
            link: Mutex::new(None),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            closed_signal: watch::Sender::new(false),
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicI64::new(1),
            observers: Mutex::new(Vec::new()),
            ping_task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }

    /// Attaches the auth context handlers will see. Fixed for the session's
    /// lifetime.
    #[must_use]
    pub fn with_auth(mut self, auth: Option<AuthContext>) -> Self {
        self.auth = auth.map(Arc::new);
        self
    }

    /// Uses a caller-chosen id, e.g. the HTTP session id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn server_capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Capabilities from the client's `initialize`, once received.
    #[must_use]
    pub fn client_capabilities(&self) -> Option<&ClientCapabilities> {
        self.client_capabilities.get()
    }

    #[must_use]
    pub fn client_info(&self) -> Option<&ClientInfo> {
        self.client_info.get()
    }

    /// The protocol version agreed during `initialize`.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&'static str> {
        self.protocol_version.get().copied()
    }

    /// The threshold set by the client's last `logging/setLevel`.
    #[must_use]
    pub fn logging_level(&self) -> LoggingLevel {
        self.level.get()
    }

    /// The client's roots as last fetched.
    #[must_use]
    pub fn roots(&self) -> Vec<Root> {
        lock(&self.roots).clone()
    }

    #[must_use]
    pub fn auth(&self) -> Option<&AuthContext> {
        self.auth.as_deref()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the session has been torn down.
    pub async fn closed(&self) {
        let mut signal = self.closed_signal.subscribe();
        let _ = signal.wait_for(|closed| *closed).await;
    }

    /// Registers an observer. Observers run synchronously, in registration
    /// order, on the task that produced the event.
    pub fn on_event<F>(&self, observer: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        lock(&self.observers).push(Arc::new(observer));
    }

    fn emit(&self, event: &SessionEvent) {
        let observers = lock(&self.observers).clone();
        for observer in observers {
            observer(event);
        }
    }

    // ========================================================================
    // Connect
    // ========================================================================

    /// Binds and starts `transport`, then runs the capability handshake.
    ///
    /// The handshake never fails the connection: if the client does not send
    /// `initialize` within the configured attempts the session continues
    /// without client capabilities. Root fetching and liveness probing are
    /// set up last.
    pub async fn connect(self: &Arc<Self>, transport: Arc<dyn Transport>) -> Result<(), SessionError> {
        if self.connected.swap(true, Ordering::AcqRel) {
            return Err(SessionError::AlreadyConnected);
        }
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let events = transport.start().await?;
        let kind = transport.kind();

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(Arc::clone(&transport), outbound_rx));
        *lock(&self.link) = Some(Link {
            transport,
            outbound,
            writer,
        });
        tokio::spawn(Arc::clone(self).inbound_loop(events));
        debug!(target: targets::SESSION, "Session {} connected over {:?}", self.id, kind);

        self.await_client_capabilities().await;

        let wants_roots = self
            .client_capabilities()
            .is_some_and(|caps| caps.roots.is_some());
        if wants_roots && self.config.roots.enabled {
            self.refresh_roots().await;
        }

        if self.config.ping.enabled.unwrap_or(kind.is_streaming()) {
            self.start_ping();
        }
        Ok(())
    }

    async fn await_client_capabilities(&self) {
        let handshake = &self.config.handshake;
        for attempt in 0..handshake.max_attempts {
            if self.client_capabilities.get().is_some() || self.is_closed() {
                return;
            }
            trace!(target: targets::SESSION, "Waiting for initialize (attempt {})", attempt + 1);
            tokio::time::sleep(handshake.backoff).await;
        }
        if self.client_capabilities.get().is_none() && !self.is_closed() {
            warn!(
                target: targets::SESSION,
                "Session {}: no client capabilities after {} attempts, continuing without them",
                self.id,
                handshake.max_attempts
            );
        }
    }

    /// Fetches the root list and replaces the stored one. Returns the new
    /// list on success.
    async fn refresh_roots(&self) -> Option<Vec<Root>> {
        match self.list_roots().await {
            Ok(roots) => {
                debug!(target: targets::SESSION, "Session {}: {} roots", self.id, roots.len());
                *lock(&self.roots) = roots.clone();
                Some(roots)
            }
            Err(err) if err.is_method_not_found() => {
                debug!(target: targets::SESSION, "Client does not implement roots/list");
                None
            }
            Err(err) => {
                error!(target: targets::SESSION, "Failed to fetch roots: {}", err);
                None
            }
        }
    }

    fn start_ping(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = self.config.ping.interval;
        let level = self.config.ping.log_level;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(session) = weak.upgrade() else {
                    return;
                };
                if session.is_closed() {
                    return;
                }
                if let Err(err) = session.ping().await {
                    log::log!(target: targets::SESSION, level, "Ping to session {} failed: {}", session.id, err);
                }
            }
        });
        *lock(&self.ping_task) = Some(task);
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    async fn inbound_loop(self: Arc<Self>, mut events: UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Message(JsonRpcMessage::Request(request)) => {
                    let session = Arc::clone(&self);
                    tokio::spawn(session.handle_request(request));
                }
                TransportEvent::Message(JsonRpcMessage::Response(response)) => {
                    self.route_response(response);
                }
                TransportEvent::Error(err) => {
                    warn!(target: targets::SESSION, "Session {} transport error: {}", self.id, err);
                    if let TransportError::Codec(ref codec) = err {
                        let parse = McpError::parse_error(codec.to_string());
                        self.send(JsonRpcResponse::error(None, parse.into()).into());
                    }
                    self.emit(&SessionEvent::Error(err.to_string()));
                }
                TransportEvent::Closed => break,
            }
        }
        self.teardown().await;
    }

    fn route_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.clone() else {
            warn!(target: targets::SESSION, "Client sent an error without id: {:?}", response.error);
            return;
        };
        match lock(&self.pending).remove(&id) {
            Some(waiter) => {
                let _ = waiter.send(response.into_result());
            }
            None => debug!(target: targets::SESSION, "No pending request for response {}", id),
        }
    }

    async fn handle_request(self: Arc<Self>, request: JsonRpcRequest) {
        let id = request.id.clone();
        let method = request.method.clone();
        trace!(target: targets::SESSION, "<- {} ({:?})", method, id);

        // Run dispatch in its own task so a panicking handler only fails
        // this request.
        let session = Arc::clone(&self);
        let result = match tokio::spawn(session.dispatch(request)).await {
            Ok(result) => result,
            Err(err) => Err(McpError::internal_error(format!("Request handler failed: {err}"))),
        };

        match id {
            Some(id) => {
                let response = match result {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(err) => {
                        debug!(target: targets::SESSION, "{} failed: {}", method, err);
                        JsonRpcResponse::error(Some(id), err.into())
                    }
                };
                self.send(response.into());
            }
            None => {
                if let Err(err) = result {
                    debug!(target: targets::SESSION, "Notification {} ignored: {}", method, err);
                }
            }
        }
    }

    async fn dispatch(self: Arc<Self>, request: JsonRpcRequest) -> McpResult<Value> {
        let JsonRpcRequest {
            method, params, id, ..
        } = request;

        match method.as_str() {
            "initialize" => to_value(self.handle_initialize(parse_params(params)?)),
            "ping" => Ok(json!({})),
            "tools/list" => to_value(self.router.handle_tools_list()),
            "tools/call" => {
                let params: CallToolParams = parse_params(params)?;
                let token = params.meta.as_ref().and_then(|meta| meta.progress_token.clone());
                let ctx = self.request_context(id.as_ref(), token);
                to_value(self.router.handle_tools_call(ctx, params).await?)
            }
            "resources/list" => to_value(self.router.handle_resources_list()),
            "resources/templates/list" => to_value(self.router.handle_resource_templates_list()),
            "resources/read" => {
                let params: ReadResourceParams = parse_params(params)?;
                let ctx = self.request_context(id.as_ref(), None);
                to_value(self.router.handle_resources_read(&ctx, params).await?)
            }
            "prompts/list" => to_value(self.router.handle_prompts_list()),
            "prompts/get" => {
                let params: GetPromptParams = parse_params(params)?;
                let ctx = self.request_context(id.as_ref(), None);
                to_value(self.router.handle_prompts_get(&ctx, params).await?)
            }
            "completion/complete" => {
                let params: CompleteParams = parse_params(params)?;
                to_value(self.router.handle_complete(params).await?)
            }
            "logging/setLevel" => {
                let params: SetLevelParams = parse_params(params)?;
                self.level.set(params.level);
                debug!(target: targets::SESSION, "Session {} log level set to {}", self.id, params.level);
                Ok(json!({}))
            }
            "notifications/initialized" => {
                info!(target: targets::SESSION, "Session {} initialized", self.id);
                Ok(Value::Null)
            }
            "notifications/cancelled" => {
                let params: CancelledParams = parse_params(params)?;
                info!(
                    target: targets::SESSION,
                    "Client cancelled request {} ({})",
                    params.request_id,
                    params.reason.as_deref().unwrap_or("no reason")
                );
                Ok(Value::Null)
            }
            "notifications/roots/list_changed" => {
                if let Some(roots) = self.refresh_roots().await {
                    self.emit(&SessionEvent::RootsChanged(roots));
                }
                Ok(Value::Null)
            }
            other => Err(McpError::method_not_found(format!("Method not found: {other}"))),
        }
    }

    fn handle_initialize(&self, params: InitializeParams) -> InitializeResult {
        let version = negotiate_protocol_version(&params.protocol_version);
        info!(
            target: targets::SESSION,
            "Session {}: initialize from {} {} (protocol {})",
            self.id,
            params.client_info.name,
            params.client_info.version,
            version
        );
        if self.client_capabilities.set(params.capabilities).is_err() {
            warn!(target: targets::SESSION, "Session {}: repeated initialize ignored", self.id);
        }
        let _ = self.client_info.set(params.client_info);
        let _ = self.protocol_version.set(version);

        InitializeResult {
            protocol_version: version.to_string(),
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: self.instructions.clone(),
        }
    }

    fn request_context(self: &Arc<Self>, id: Option<&RequestId>, token: Option<ProgressToken>) -> McpContext {
        let request_id = match id {
            Some(RequestId::Number(n)) => u64::try_from(*n).unwrap_or(0),
            _ => 0,
        };
        let has_token = token.is_some();
        let notifier: Arc<dyn NotificationSender> = Arc::new(SessionNotifier {
            session: Arc::downgrade(self),
            progress_token: token,
        });

        let mut ctx = McpContext::new(request_id)
            .with_session_id(self.id.clone())
            .with_logger(ClientLogger::new(Arc::clone(&notifier), self.level.clone()));
        if has_token {
            ctx = ctx.with_progress(ProgressReporter::new(notifier));
        }
        if let Some(auth) = &self.auth {
            ctx = ctx.with_auth(Arc::clone(auth));
        }
        ctx
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Queues a message for the writer. Dropped after close.
    fn send(&self, message: JsonRpcMessage) {
        let outbound = lock(&self.link).as_ref().map(|link| link.outbound.clone());
        match outbound {
            Some(outbound) if outbound.send(message).is_ok() => {}
            _ => debug!(target: targets::SESSION, "Session {}: dropping write after close", self.id),
        }
    }

    /// Sends a notification to the client.
    pub fn notify(&self, method: &str, params: Value) {
        self.send(JsonRpcRequest::notification(method, Some(params)).into());
    }

    /// Sends a request to the client and waits for its response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let outbound = lock(&self.link)
            .as_ref()
            .map(|link| link.outbound.clone())
            .ok_or(SessionError::NotConnected)?;

        let id = RequestId::Number(self.next_request_id.fetch_add(1, Ordering::Relaxed));
        let (waiter, response) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), waiter);

        trace!(target: targets::SESSION, "-> {} ({})", method, id);
        if outbound
            .send(JsonRpcRequest::new(method, params, id.clone()).into())
            .is_err()
        {
            lock(&self.pending).remove(&id);
            return Err(SessionError::Closed);
        }
        drop(outbound);

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(SessionError::Remote(err)),
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(SessionError::Timeout(timeout))
            }
        }
    }

    /// Sends a liveness probe.
    pub async fn ping(&self) -> Result<(), SessionError> {
        self.request("ping", None, self.config.request_timeout).await.map(|_| ())
    }

    /// Asks the client for its current roots.
    pub async fn list_roots(&self) -> Result<Vec<Root>, SessionError> {
        let value = self.request("roots/list", None, self.config.request_timeout).await?;
        let result: ListRootsResult = serde_json::from_value(value)?;
        Ok(result.roots)
    }

    /// Asks the client to sample its language model.
    pub async fn request_sampling(
        &self,
        params: CreateMessageParams,
    ) -> Result<CreateMessageResult, SessionError> {
        let value = self
            .request(
                "sampling/createMessage",
                Some(serde_json::to_value(params)?),
                self.config.request_timeout,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Closes the session. Idempotent.
    pub async fn close(&self) {
        self.teardown().await;
    }

    async fn teardown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = lock(&self.ping_task).take() {
            task.abort();
        }

        let link = lock(&self.link).take();
        if let Some(Link {
            transport,
            outbound,
            mut writer,
        }) = link
        {
            // Let queued responses reach the transport before closing it.
            drop(outbound);
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut writer).await.is_err() {
                debug!(target: targets::SESSION, "Session {}: writer did not drain in time", self.id);
                writer.abort();
            }
            transport.close().await;
        }

        // Waiting requests see their sender dropped and fail with `Closed`.
        lock(&self.pending).clear();

        info!(target: targets::SESSION, "Session {} closed", self.id);
        self.emit(&SessionEvent::Closed);
        self.closed_signal.send_replace(true);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("level", &self.level.get())
            .finish_non_exhaustive()
    }
}

async fn write_loop(transport: Arc<dyn Transport>, mut outbound: UnboundedReceiver<JsonRpcMessage>) {
    while let Some(message) = outbound.recv().await {
        if let Err(err) = transport.send(message).await {
            debug!(target: targets::TRANSPORT, "Dropping outbound message: {}", err);
        }
    }
}

/// Routes handler notifications back through the owning session.
struct SessionNotifier {
    session: Weak<Session>,
    progress_token: Option<ProgressToken>,
}

impl NotificationSender for SessionNotifier {
    fn send_progress(&self, progress: f64, total: Option<f64>, message: Option<&str>) {
        let (Some(session), Some(token)) = (self.session.upgrade(), self.progress_token.clone()) else {
            return;
        };
        let mut params = ProgressParams::new(token, progress);
        if let Some(total) = total {
            params = params.with_total(total);
        }
        if let Some(message) = message {
            params = params.with_message(message);
        }
        if let Ok(params) = serde_json::to_value(params) {
            session.notify("notifications/progress", params);
        }
    }

    fn send_log(&self, level: LoggingLevel, logger: Option<&str>, data: Value) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        let params = LogMessageParams {
            level,
            logger: logger.map(str::to_string),
            data,
        };
        if let Ok(params) = serde_json::to_value(params) {
            session.notify("notifications/message", params);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let value = params.ok_or_else(|| McpError::invalid_params("Missing required parameters"))?;
    serde_json::from_value(value).map_err(|e| McpError::invalid_params(e.to_string()))
}

fn to_value<T: serde::Serialize>(result: T) -> McpResult<Value> {
    serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_found_detection() {
        let remote = SessionError::Remote(McpError::method_not_found("roots/list").into());
        assert!(remote.is_method_not_found());
        let other = SessionError::Remote(McpError::internal_error("x").into());
        assert!(!other.is_method_not_found());
        assert!(!SessionError::Closed.is_method_not_found());
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            SessionError::Timeout(Duration::from_millis(1500)).to_string(),
            "request timed out after 1500ms"
        );
        assert_eq!(SessionError::AlreadyConnected.to_string(), "session already has a transport");
    }

    #[test]
    fn parse_params_requires_params() {
        let err = parse_params::<SetLevelParams>(None).unwrap_err();
        assert_eq!(err.code, McpErrorCode::InvalidParams);
        let err = parse_params::<SetLevelParams>(Some(json!({"level": "loud"}))).unwrap_err();
        assert_eq!(err.code, McpErrorCode::InvalidParams);
        let ok: SetLevelParams = parse_params(Some(json!({"level": "warning"}))).unwrap();
        assert_eq!(ok.level, LoggingLevel::Warning);
    }

    #[test]
    fn new_session_defaults() {
        let session = Session::new(Arc::new(Router::new()), ServerInfo {
            name: "t".into(),
            version: "0".into(),
        });
        assert!(!session.is_closed());
        assert_eq!(session.logging_level(), LoggingLevel::Info);
        assert!(session.roots().is_empty());
        assert!(session.client_capabilities().is_none());
        assert!(session.auth().is_none());
        assert_eq!(session.id().len(), 36);
    }
}
