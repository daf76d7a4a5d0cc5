//! MCP server implementation for rapormcp.
//!
//! This crate provides the server-side implementation:
//! - Server builder pattern
//! - Tool, resource, resource template and prompt registration
//! - Request routing and dispatching
//! - Per-client protocol sessions
//! - stdio, SSE and streamable HTTP listeners
//!
//! # Example
//!
//! ```ignore
//! use rapormcp_server::{FunctionTool, Server, ToolOutput, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("demo", "1.0.0")
//!         .tool(FunctionTool::new("greet", |_ctx, args| async move {
//!             Ok(ToolOutput::text(format!("Hello, {}!", args["name"])))
//!         }))
//!         .build();
//!     server.start(TransportConfig::http_stream("127.0.0.1", 8080)).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod auth;
mod builder;
pub mod completion;
mod config;
mod handler;
mod http;
mod router;
mod session;
pub mod testing;

#[cfg(test)]
mod tests;

pub use auth::{AllowAllAuthProvider, AuthProvider, AuthRejection, AuthRequest, BearerTokenAuthProvider};
pub use builder::ServerBuilder;
pub use config::{
    DEFAULT_HOST, DEFAULT_PORT, HandshakeConfig, LOG_ENV, LoggingConfig, PingConfig, RootsConfig,
    SessionConfig, TransportConfig,
};
pub use handler::{
    BoxFuture, Completer, FunctionPrompt, FunctionResource, FunctionResourceTemplate, FunctionTool,
    PromptArgumentSpec, PromptHandler, ResourceData, ResourceHandler, ResourceOutput,
    ResourceTemplateHandler, ToolError, ToolHandler, ToolOutput, UriParams, completer,
};
pub use router::Router;
pub use session::{Session, SessionError, SessionEvent};

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rapormcp_core::AuthContext;
use rapormcp_core::logging::{debug, info, targets, warn};
use rapormcp_protocol::{ServerCapabilities, ServerInfo};
use rapormcp_transport::{StdioTransport, Transport};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long [`Server::stop`] lets listeners finish before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Errors from starting or connecting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Something that happened to the server's session set.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A session finished connecting and was registered.
    Connect(Arc<Session>),
    /// A registered session closed and was removed.
    Disconnect(Arc<Session>),
}

type Observer = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

struct Listener {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct ServerInner {
    info: ServerInfo,
    router: Arc<Router>,
    instructions: Option<String>,
    session_config: SessionConfig,
    auth_provider: Option<Arc<dyn AuthProvider>>,
    sessions: Mutex<Vec<Arc<Session>>>,
    observers: Mutex<Vec<Observer>>,
    listeners: Mutex<Vec<Listener>>,
}

impl ServerInner {
    fn emit(&self, event: &ServerEvent) {
        let observers = lock(&self.observers).clone();
        for observer in observers {
            observer(event);
        }
    }

    fn remove_session(&self, session: &Arc<Session>) {
        let removed = {
            let mut sessions = lock(&self.sessions);
            let before = sessions.len();
            sessions.retain(|s| !Arc::ptr_eq(s, session));
            sessions.len() != before
        };
        if removed {
            info!(target: targets::SERVER, "Session {} disconnected", session.id());
            self.emit(&ServerEvent::Disconnect(Arc::clone(session)));
        }
    }
}

/// An MCP server: a frozen registry plus the set of live sessions.
///
/// Cloning is cheap and every clone refers to the same server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Starts building a server.
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> ServerBuilder {
        ServerBuilder::new(name, version)
    }

    fn from_parts(
        info: ServerInfo,
        router: Arc<Router>,
        instructions: Option<String>,
        session_config: SessionConfig,
        auth_provider: Option<Arc<dyn AuthProvider>>,
    ) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                info,
                router,
                instructions,
                session_config,
                auth_provider,
                sessions: Mutex::new(Vec::new()),
                observers: Mutex::new(Vec::new()),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn info(&self) -> &ServerInfo {
        &self.inner.info
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Capability flags every session advertises.
    #[must_use]
    pub fn capabilities(&self) -> ServerCapabilities {
        self.inner.router.capabilities()
    }

    pub(crate) fn auth_provider(&self) -> Option<&Arc<dyn AuthProvider>> {
        self.inner.auth_provider.as_ref()
    }

    /// Currently connected sessions.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        lock(&self.inner.sessions).clone()
    }

    /// Registers an observer for connects and disconnects. Observers run
    /// synchronously in registration order.
    pub fn on_event<F>(&self, observer: F)
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        lock(&self.inner.observers).push(Arc::new(observer));
    }

    /// An unconnected session configured like every other session of this
    /// server.
    pub(crate) fn new_session(&self, auth: Option<AuthContext>) -> Session {
        Session::new(Arc::clone(&self.inner.router), self.inner.info.clone())
            .with_config(self.inner.session_config.clone())
            .with_instructions(self.inner.instructions.clone())
            .with_auth(auth)
    }

    /// Creates a session on `transport` and connects it.
    ///
    /// `Connect` is emitted once the handshake finishes; `Disconnect` when
    /// the session later closes. A session that closes while still
    /// connecting emits neither.
    pub async fn connect(
        &self,
        transport: Arc<dyn Transport>,
        auth: Option<AuthContext>,
    ) -> Result<Arc<Session>, ServerError> {
        self.attach(Arc::new(self.new_session(auth)), transport).await
    }

    pub(crate) async fn attach(
        &self,
        session: Arc<Session>,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Session>, ServerError> {
        let weak_inner = Arc::downgrade(&self.inner);
        let weak_session = Arc::downgrade(&session);
        session.on_event(move |event| {
            if !matches!(event, SessionEvent::Closed) {
                return;
            }
            if let (Some(inner), Some(session)) = (weak_inner.upgrade(), weak_session.upgrade()) {
                inner.remove_session(&session);
            }
        });

        session.connect(transport).await?;

        {
            let mut sessions = lock(&self.inner.sessions);
            if session.is_closed() {
                debug!(target: targets::SERVER, "Session {} closed during connect", session.id());
                return Ok(session);
            }
            sessions.push(Arc::clone(&session));
        }
        info!(target: targets::SERVER, "Session {} connected", session.id());
        self.inner.emit(&ServerEvent::Connect(Arc::clone(&session)));
        Ok(session)
    }

    /// Starts serving.
    ///
    /// For stdio this connects one session over the process's stdin/stdout
    /// and returns `None`. The HTTP flavors bind a listener and return its
    /// address.
    pub async fn start(&self, config: TransportConfig) -> Result<Option<SocketAddr>, ServerError> {
        match config {
            TransportConfig::Stdio => {
                info!(target: targets::SERVER, "{} serving on stdio", self.inner.info.name);
                self.connect(Arc::new(StdioTransport::stdio()), None).await?;
                Ok(None)
            }
            other => {
                let (address, shutdown, task) = http::serve(self.clone(), &other).await?;
                info!(target: targets::SERVER, "{} listening on http://{}", self.inner.info.name, address);
                lock(&self.inner.listeners).push(Listener { shutdown, task });
                Ok(Some(address))
            }
        }
    }

    /// Stops accepting connections. Established sessions stay open.
    pub async fn stop(&self) {
        let listeners: Vec<Listener> = lock(&self.inner.listeners).drain(..).collect();
        for Listener { shutdown, mut task } in listeners {
            let _ = shutdown.send(());
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(target: targets::SERVER, "Listener did not stop in time, aborting");
                task.abort();
            }
        }
        info!(target: targets::SERVER, "{} stopped", self.inner.info.name);
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("info", &self.inner.info)
            .field("sessions", &lock(&self.inner.sessions).len())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
