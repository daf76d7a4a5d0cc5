//! HTTP listeners.
//!
//! Both flavors bridge HTTP onto one [`MemoryTransport`] per client, so the
//! session code is identical to stdio:
//!
//! - **SSE**: `GET {endpoint}` opens an event stream whose first event names
//!   the POST URL (`{message_endpoint}?sessionId=..`); client messages are
//!   POSTed there and answered on the stream.
//! - **Streamable HTTP**: everything goes through `{endpoint}`. A POSTed
//!   request is answered on its own short-lived event stream, `GET` opens a
//!   standalone stream for server-initiated traffic and `DELETE` ends the
//!   session. Sessions are identified by the `mcp-session-id` header.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::stream::{self, Stream, StreamExt};
use rapormcp_core::logging::{debug, info, targets, warn};
use rapormcp_core::{AuthContext, McpError};
use rapormcp_protocol::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, ProgressToken, RequestId};
use rapormcp_transport::{CodecError, MemoryTransport, PeerSender, TransportError, TransportKind};
use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::auth::AuthRequest;
use crate::{Server, ServerError, TransportConfig};

/// Session header of the streamable HTTP flavor.
pub(crate) const SESSION_HEADER: &str = "mcp-session-id";

/// Binds the listener described by `config` and serves it in the
/// background until the returned sender fires.
pub(crate) async fn serve(
    server: Server,
    config: &TransportConfig,
) -> Result<(SocketAddr, oneshot::Sender<()>, JoinHandle<()>), ServerError> {
    let app = match config {
        TransportConfig::Sse {
            endpoint,
            message_endpoint,
            ..
        } => sse_router(server, endpoint, message_endpoint),
        TransportConfig::HttpStream { endpoint, .. } => stream_router(server, endpoint),
        TransportConfig::Stdio => {
            return Err(ServerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "stdio has no HTTP listener",
            )));
        }
    };
    let app = app
        .route("/ping", get(|| async { "pong" }))
        .layer(middleware::from_fn(cors));

    let address = config.bind_address().unwrap_or_default();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind { address, source })?;
    let local = listener.local_addr()?;

    let (shutdown, signal) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = signal.await;
            })
            .await;
        if let Err(err) = result {
            warn!(target: targets::HTTP, "HTTP listener failed: {}", err);
        }
    });
    Ok((local, shutdown, task))
}

async fn authenticate(
    server: &Server,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Option<AuthContext>, Response> {
    let Some(provider) = server.auth_provider() else {
        return Ok(None);
    };
    let request = AuthRequest {
        method,
        uri,
        headers,
    };
    match provider.authenticate(&request).await {
        Ok(auth) => Ok(Some(auth)),
        Err(rejection) => {
            info!(target: targets::HTTP, "Rejected {} {}: {}", request.method, request.uri, rejection);
            Err(rejection.into_response())
        }
    }
}

/// Creates a session on a fresh in-memory pair and connects it in the
/// background.
fn open_session(
    server: &Server,
    kind: TransportKind,
    auth: Option<AuthContext>,
) -> (String, PeerSender, UnboundedReceiver<JsonRpcMessage>) {
    let (transport, peer) = MemoryTransport::pair_with_kind(kind);
    let session = Arc::new(server.new_session(auth));
    let id = session.id().to_string();
    let server = server.clone();
    tokio::spawn(async move {
        if let Err(err) = server.attach(session, Arc::new(transport)).await {
            warn!(target: targets::HTTP, "Failed to connect session: {}", err);
        }
    });
    let (sender, receiver) = peer.into_parts();
    (id, sender, receiver)
}

fn message_event(message: &JsonRpcMessage) -> Result<Event, axum::Error> {
    Event::default().event("message").json_data(message)
}

fn parse_error(err: &serde_json::Error) -> Response {
    let body = JsonRpcResponse::error(None, McpError::parse_error(err.to_string()).into());
    (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
}

// ============================================================================
// SSE
// ============================================================================

struct SseState {
    server: Server,
    message_endpoint: String,
    sessions: Mutex<HashMap<String, PeerSender>>,
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

fn sse_router(server: Server, endpoint: &str, message_endpoint: &str) -> axum::Router {
    let state = Arc::new(SseState {
        server,
        message_endpoint: message_endpoint.to_string(),
        sessions: Mutex::new(HashMap::new()),
    });
    axum::Router::new()
        .route(endpoint, get(sse_connect))
        .route(message_endpoint, axum::routing::post(sse_message))
        .with_state(state)
}

/// Disconnects the session when its event stream is dropped.
struct SseGuard {
    state: Arc<SseState>,
    session_id: String,
    sender: PeerSender,
}

impl Drop for SseGuard {
    fn drop(&mut self) {
        lock(&self.state.sessions).remove(&self.session_id);
        self.sender.close();
        debug!(target: targets::HTTP, "SSE stream for {} ended", self.session_id);
    }
}

async fn sse_connect(
    State(state): State<Arc<SseState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let auth = match authenticate(&state.server, method, uri, headers).await {
        Ok(auth) => auth,
        Err(rejection) => return rejection,
    };

    let (session_id, sender, receiver) = open_session(&state.server, TransportKind::Sse, auth);
    lock(&state.sessions).insert(session_id.clone(), sender.clone());
    info!(target: targets::HTTP, "SSE session {} opened", session_id);

    let endpoint = format!("{}?sessionId={}", state.message_endpoint, session_id);
    let guard = SseGuard {
        state: Arc::clone(&state),
        session_id,
        sender,
    };
    let first = stream::once(async move {
        Ok::<_, axum::Error>(Event::default().event("endpoint").data(endpoint))
    });
    let messages = UnboundedReceiverStream::new(receiver).map(move |message| {
        let _ = &guard;
        message_event(&message)
    });
    Sse::new(first.chain(messages))
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn sse_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    let Some(session_id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, "Missing sessionId").into_response();
    };
    let Some(sender) = lock(&state.sessions).get(&session_id).cloned() else {
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    };
    match serde_json::from_slice::<JsonRpcMessage>(&body) {
        Ok(message) => match sender.send(message) {
            Ok(()) => (StatusCode::ACCEPTED, "Accepted").into_response(),
            Err(_) => (StatusCode::NOT_FOUND, "Session not found").into_response(),
        },
        Err(err) => {
            debug!(target: targets::HTTP, "Bad message for {}: {}", session_id, err);
            let response = parse_error(&err);
            sender.report_error(TransportError::Codec(CodecError::Json(err)));
            response
        }
    }
}

// ============================================================================
// Streamable HTTP
// ============================================================================

struct StreamState {
    server: Server,
    sessions: Mutex<HashMap<String, Arc<StreamSession>>>,
}

/// Notifications kept for a standalone stream that is not open yet. Older
/// entries are dropped first.
const BACKLOG_LIMIT: usize = 32;

/// An open POST stream waiting for the response to `id`.
struct Waiter {
    id: RequestId,
    /// `_meta.progressToken` of the request, if it asked for progress.
    progress_token: Option<ProgressToken>,
    sender: UnboundedSender<JsonRpcMessage>,
}

/// Routes one session's outbound messages to the HTTP responses waiting
/// for them.
struct StreamSession {
    sender: PeerSender,
    /// Open POST streams, oldest first.
    waiters: Mutex<Vec<Waiter>>,
    standalone: Mutex<Option<UnboundedSender<JsonRpcMessage>>>,
    /// Notifications sent while no stream was open.
    backlog: Mutex<VecDeque<JsonRpcMessage>>,
}

impl StreamSession {
    fn new(sender: PeerSender) -> Self {
        Self {
            sender,
            waiters: Mutex::new(Vec::new()),
            standalone: Mutex::new(None),
            backlog: Mutex::new(VecDeque::new()),
        }
    }

    fn wait_for(&self, request: &JsonRpcRequest) -> Option<UnboundedReceiver<JsonRpcMessage>> {
        let id = request.id.clone()?;
        let progress_token = request
            .params
            .as_ref()
            .and_then(|params| params.get("_meta"))
            .and_then(|meta| meta.get("progressToken"))
            .and_then(|token| ProgressToken::deserialize(token).ok());
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.waiters).push(Waiter {
            id,
            progress_token,
            sender,
        });
        Some(receiver)
    }

    fn route(&self, message: JsonRpcMessage) {
        let message = match self.route_to_waiter(message) {
            Ok(()) => return,
            Err(message) => message,
        };
        let message = match lock(&self.standalone).as_ref() {
            Some(standalone) => match standalone.send(message) {
                Ok(()) => return,
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let JsonRpcMessage::Request(request) = &message else {
            debug!(target: targets::HTTP, "Dropping response with no open stream");
            return;
        };
        if request.id.is_some() {
            // The session times the request out on its own.
            debug!(target: targets::HTTP, "Dropping {} request: no open stream", request.method);
            return;
        }
        let mut backlog = lock(&self.backlog);
        if backlog.len() == BACKLOG_LIMIT {
            backlog.pop_front();
        }
        backlog.push_back(message);
    }

    /// Responses end the stream of their request and progress follows its
    /// token. Other traffic rides on the oldest open POST stream.
    fn route_to_waiter(&self, message: JsonRpcMessage) -> Result<(), JsonRpcMessage> {
        let mut waiters = lock(&self.waiters);
        let answered = match &message {
            JsonRpcMessage::Response(JsonRpcResponse { id: Some(id), .. }) => {
                waiters.iter().position(|waiter| waiter.id == *id)
            }
            _ => None,
        };
        if let Some(index) = answered {
            // Dropping the sender ends that POST's stream.
            let waiter = waiters.remove(index);
            return waiter.sender.send(message).map_err(|err| err.0);
        }

        let owner = progress_token(&message).and_then(|token| {
            waiters
                .iter()
                .position(|waiter| waiter.progress_token.as_ref() == Some(&token))
        });
        let target = owner
            .filter(|&index| !waiters[index].sender.is_closed())
            .or_else(|| waiters.iter().position(|waiter| !waiter.sender.is_closed()));
        match target {
            Some(index) => waiters[index].sender.send(message).map_err(|err| err.0),
            None => Err(message),
        }
    }

    fn open_standalone(&self) -> UnboundedReceiver<JsonRpcMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        for message in lock(&self.backlog).drain(..) {
            let _ = tx.send(message);
        }
        *lock(&self.standalone) = Some(tx);
        rx
    }

    fn close_streams(&self) {
        lock(&self.waiters).clear();
        lock(&self.standalone).take();
    }
}

/// The token of a `notifications/progress` message.
fn progress_token(message: &JsonRpcMessage) -> Option<ProgressToken> {
    match message {
        JsonRpcMessage::Request(request) if request.method == "notifications/progress" => request
            .params
            .as_ref()
            .and_then(|params| params.get("progressToken"))
            .and_then(|token| ProgressToken::deserialize(token).ok()),
        _ => None,
    }
}

fn stream_router(server: Server, endpoint: &str) -> axum::Router {
    let state = Arc::new(StreamState {
        server,
        sessions: Mutex::new(HashMap::new()),
    });
    axum::Router::new()
        .route(
            endpoint,
            axum::routing::post(stream_post)
                .get(stream_get)
                .delete(stream_delete),
        )
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn lookup(state: &StreamState, headers: &HeaderMap) -> Result<(String, Arc<StreamSession>), Response> {
    let Some(id) = session_header(headers) else {
        return Err((StatusCode::BAD_REQUEST, "Missing mcp-session-id header").into_response());
    };
    match lock(&state.sessions).get(&id) {
        Some(session) => Ok((id, Arc::clone(session))),
        None => Err((StatusCode::NOT_FOUND, "Session not found").into_response()),
    }
}

fn event_stream(
    receiver: UnboundedReceiver<JsonRpcMessage>,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    UnboundedReceiverStream::new(receiver).map(|message| message_event(&message))
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    response
}

async fn stream_post(
    State(state): State<Arc<StreamState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let message = match serde_json::from_slice::<JsonRpcMessage>(&body) {
        Ok(message) => message,
        Err(err) => return parse_error(&err),
    };

    let (session_id, session) = if session_header(&headers).is_some() {
        match lookup(&state, &headers) {
            Ok(found) => found,
            Err(response) => return response,
        }
    } else {
        let is_initialize =
            matches!(&message, JsonRpcMessage::Request(request) if request.method == "initialize");
        if !is_initialize {
            return (StatusCode::BAD_REQUEST, "Missing mcp-session-id header").into_response();
        }
        let auth = match authenticate(&state.server, method, uri, headers).await {
            Ok(auth) => auth,
            Err(rejection) => return rejection,
        };
        let (id, sender, outbound) = open_session(&state.server, TransportKind::HttpStream, auth);
        let session = Arc::new(StreamSession::new(sender));
        lock(&state.sessions).insert(id.clone(), Arc::clone(&session));
        tokio::spawn(route_outbound(
            Arc::clone(&state),
            id.clone(),
            Arc::clone(&session),
            outbound,
        ));
        info!(target: targets::HTTP, "HTTP stream session {} opened", id);
        (id, session)
    };

    let response = match message {
        JsonRpcMessage::Request(request) if request.id.is_some() => {
            let Some(rx) = session.wait_for(&request) else {
                return (StatusCode::BAD_REQUEST, "Request without id").into_response();
            };
            if session.sender.send(request.into()).is_err() {
                return (StatusCode::NOT_FOUND, "Session not found").into_response();
            }
            Sse::new(event_stream(rx)).into_response()
        }
        other => {
            if session.sender.send(other).is_err() {
                return (StatusCode::NOT_FOUND, "Session not found").into_response();
            }
            (StatusCode::ACCEPTED, "Accepted").into_response()
        }
    };
    with_session_header(response, &session_id)
}

async fn stream_get(State(state): State<Arc<StreamState>>, headers: HeaderMap) -> Response {
    let (session_id, session) = match lookup(&state, &headers) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let receiver = session.open_standalone();
    let response = Sse::new(event_stream(receiver))
        .keep_alive(KeepAlive::default())
        .into_response();
    with_session_header(response, &session_id)
}

async fn stream_delete(State(state): State<Arc<StreamState>>, headers: HeaderMap) -> Response {
    let (session_id, session) = match lookup(&state, &headers) {
        Ok(found) => found,
        Err(response) => return response,
    };
    lock(&state.sessions).remove(&session_id);
    session.sender.close();
    session.close_streams();
    info!(target: targets::HTTP, "HTTP stream session {} deleted", session_id);
    StatusCode::OK.into_response()
}

async fn route_outbound(
    state: Arc<StreamState>,
    session_id: String,
    session: Arc<StreamSession>,
    mut outbound: UnboundedReceiver<JsonRpcMessage>,
) {
    while let Some(message) = outbound.recv().await {
        session.route(message);
    }
    lock(&state.sessions).remove(&session_id);
    session.close_streams();
    debug!(target: targets::HTTP, "HTTP stream session {} closed", session_id);
}

// ============================================================================
// CORS
// ============================================================================

const ALLOW_METHODS: &str = "GET, POST, DELETE, OPTIONS";
const DEFAULT_ALLOW_HEADERS: &str = "content-type, authorization, mcp-session-id, last-event-id";

async fn cors(request: Request, next: Next) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    if request.method() == Method::OPTIONS {
        let requested = request
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned();
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        apply_cors(headers, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            requested.unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOW_HEADERS)),
        );
        return response;
    }
    let mut response = next.run(request).await;
    apply_cors(response.headers_mut(), origin);
    response
}

fn apply_cors(headers: &mut HeaderMap, origin: Option<HeaderValue>) {
    match origin {
        Some(origin) => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
            headers.insert(header::VARY, HeaderValue::from_static("origin"));
        }
        None => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
    }
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(SESSION_HEADER),
    );
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapormcp_protocol::ProgressParams;
    use serde_json::json;

    fn stream_session() -> StreamSession {
        let (_transport, peer) = MemoryTransport::pair();
        let (sender, _receiver) = peer.into_parts();
        StreamSession::new(sender)
    }

    fn log_line(n: usize) -> JsonRpcMessage {
        JsonRpcRequest::notification(
            "notifications/message",
            Some(json!({"level": "info", "data": n})),
        )
        .into()
    }

    #[test]
    fn backlog_keeps_only_recent_notifications() {
        let session = stream_session();
        // Liveness pings pile up while the client never opens a GET stream.
        for id in 0..100i64 {
            session.route(JsonRpcRequest::new("ping", None, id).into());
        }
        for n in 0..BACKLOG_LIMIT + 8 {
            session.route(log_line(n));
        }

        let mut standalone = session.open_standalone();
        let mut delivered = Vec::new();
        while let Ok(message) = standalone.try_recv() {
            let JsonRpcMessage::Request(request) = message else {
                panic!("unexpected response on standalone stream");
            };
            assert!(request.is_notification(), "stale {} flushed", request.method);
            delivered.push(request.params.unwrap()["data"].as_u64().unwrap());
        }
        let expected: Vec<u64> = (8..BACKLOG_LIMIT as u64 + 8).collect();
        assert_eq!(delivered, expected);
    }

    #[test]
    fn server_requests_reach_an_open_standalone_stream() {
        let session = stream_session();
        let mut standalone = session.open_standalone();
        session.route(JsonRpcRequest::new("ping", None, 7i64).into());
        assert!(matches!(
            standalone.try_recv(),
            Ok(JsonRpcMessage::Request(request)) if request.method == "ping"
        ));
    }

    #[test]
    fn progress_follows_the_request_that_asked_for_it() {
        let session = stream_session();
        let first = JsonRpcRequest::new(
            "tools/call",
            Some(json!({"name": "a", "_meta": {"progressToken": "tok-a"}})),
            1i64,
        );
        let second = JsonRpcRequest::new(
            "tools/call",
            Some(json!({"name": "b", "_meta": {"progressToken": "tok-b"}})),
            2i64,
        );
        let mut first_stream = session.wait_for(&first).unwrap();
        let mut second_stream = session.wait_for(&second).unwrap();

        let progress = ProgressParams::new("tok-b", 1.0).with_total(2.0);
        session.route(
            JsonRpcRequest::notification(
                "notifications/progress",
                Some(serde_json::to_value(progress).unwrap()),
            )
            .into(),
        );
        session.route(JsonRpcResponse::success(RequestId::from(2i64), json!({})).into());

        assert!(matches!(
            second_stream.try_recv(),
            Ok(JsonRpcMessage::Request(request)) if request.method == "notifications/progress"
        ));
        assert!(matches!(second_stream.try_recv(), Ok(JsonRpcMessage::Response(_))));
        assert!(first_stream.try_recv().is_err());

        // Log lines carry no request reference and use the oldest stream.
        session.route(log_line(0));
        assert!(matches!(first_stream.try_recv(), Ok(JsonRpcMessage::Request(_))));
    }
}
